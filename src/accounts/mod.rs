//! Sender account lifecycle
//!
//! Accounts move through a small state machine while a session runs:
//! available -> pending/logged-in -> one of the terminal-ish outcomes. The
//! ledger and the database both store the encoded string form; everything
//! else in the crate works with [`SenderStatus`].

pub mod registry;

pub use registry::{AccountRegistry, SenderAccount, SenderCredentials};

/// Raw status tokens as they appear in the ledger and database.
pub mod token {
	pub const PENDING: &str = "PENDING";
	pub const PENDING_PREFIX: &str = "PENDING:";
	pub const LOGGED_IN: &str = "LOGGED_IN";
	pub const USED: &str = "USED";
	pub const USED_REUSE: &str = "USED-R";
	pub const USED_LIMIT: &str = "USED-L";
	pub const BLOCKED: &str = "BLOCKED";
	pub const NOT_LOGGED_IN: &str = "NOT_LOGINED";
	pub const NEED_PREMIUM: &str = "NEED_PREMIUM";
	pub const FAILED: &str = "FAILED";
}

/// Lifecycle status of a sender account.
///
/// `Pending { rounds: Some(n) }` is the crash checkpoint: a resuming worker
/// continues from round `n + 1`. `Used`/`UsedReuse` carry the number of
/// batches sent when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderStatus {
	/// No status recorded; the account has not been touched this period
	Available,
	/// Queued for processing or checkpointed mid-send
	Pending { rounds: Option<u32> },
	/// Authentication succeeded; transient until the send outcome lands
	LoggedIn,
	/// Fully processed
	Used { count: Option<u32> },
	/// Partially processed before the session was interrupted
	UsedReuse { count: Option<u32> },
	/// Provider-imposed sending limit reached
	UsedLimit,
	/// Rejected by the remote service
	Blocked,
	/// Authentication failed for a non-blocking reason
	NotLoggedIn,
	/// Account requires a paid tier
	NeedPremium,
	/// Processing error
	Failed,
	/// Unrecognized ledger text, preserved verbatim and never eligible
	Other(String),
}

impl SenderStatus {
	/// Encode to the persistent string form. `None` means the status cell is
	/// left empty (available).
	pub fn encode(&self) -> Option<String> {
		match self {
			Self::Available => None,
			Self::Pending { rounds: None } => Some(token::PENDING.into()),
			Self::Pending { rounds: Some(n) } => Some(format!("{}{}", token::PENDING_PREFIX, n)),
			Self::LoggedIn => Some(token::LOGGED_IN.into()),
			Self::Used { count: None } => Some(token::USED.into()),
			Self::Used { count: Some(n) } => Some(format!("{} ({})", token::USED, n)),
			Self::UsedReuse { count: None } => Some(token::USED_REUSE.into()),
			Self::UsedReuse { count: Some(n) } => Some(format!("{} ({})", token::USED_REUSE, n)),
			Self::UsedLimit => Some(token::USED_LIMIT.into()),
			Self::Blocked => Some(token::BLOCKED.into()),
			Self::NotLoggedIn => Some(token::NOT_LOGGED_IN.into()),
			Self::NeedPremium => Some(token::NEED_PREMIUM.into()),
			Self::Failed => Some(token::FAILED.into()),
			Self::Other(raw) => Some(raw.clone()),
		}
	}

	/// Decode the persistent string form. Empty or missing text decodes to
	/// [`SenderStatus::Available`]; unrecognized text is preserved as
	/// [`SenderStatus::Other`].
	pub fn decode(raw: Option<&str>) -> Self {
		let raw = match raw {
			Some(s) => s.trim(),
			None => return Self::Available,
		};
		if raw.is_empty() {
			return Self::Available;
		}
		match raw {
			token::PENDING => return Self::Pending { rounds: None },
			token::LOGGED_IN => return Self::LoggedIn,
			token::USED => return Self::Used { count: None },
			token::USED_REUSE => return Self::UsedReuse { count: None },
			token::USED_LIMIT => return Self::UsedLimit,
			token::BLOCKED => return Self::Blocked,
			token::NOT_LOGGED_IN => return Self::NotLoggedIn,
			token::NEED_PREMIUM => return Self::NeedPremium,
			token::FAILED => return Self::Failed,
			_ => {}
		}
		if let Some(suffix) = raw.strip_prefix(token::PENDING_PREFIX) {
			if let Ok(n) = suffix.trim().parse::<u32>() {
				return Self::Pending { rounds: Some(n) };
			}
		}
		if let Some(count) = parse_annotated(raw, token::USED_REUSE) {
			return Self::UsedReuse { count: Some(count) };
		}
		if let Some(count) = parse_annotated(raw, token::USED) {
			return Self::Used { count: Some(count) };
		}
		Self::Other(raw.to_string())
	}

	/// Whether the account was consumed this period (any `USED` variant).
	pub fn is_consumed(&self) -> bool {
		matches!(
			self,
			Self::Used { .. } | Self::UsedReuse { .. } | Self::UsedLimit
		)
	}

	/// Whether the account is excluded from all future retry passes.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Blocked | Self::UsedLimit)
	}

	/// Resume checkpoint carried by `PENDING:<n>`, if any.
	pub fn checkpoint(&self) -> Option<u32> {
		match self {
			Self::Pending { rounds } => *rounds,
			_ => None,
		}
	}
}

/// Parse `"<token> (<n>)"` annotations such as `USED (12)`.
fn parse_annotated(raw: &str, tok: &str) -> Option<u32> {
	let rest = raw.strip_prefix(tok)?.trim();
	rest.strip_prefix('(')?.strip_suffix(')')?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn decode_plain_tokens() {
		assert_eq!(SenderStatus::decode(None), SenderStatus::Available);
		assert_eq!(SenderStatus::decode(Some("")), SenderStatus::Available);
		assert_eq!(SenderStatus::decode(Some("  ")), SenderStatus::Available);
		assert_eq!(
			SenderStatus::decode(Some("PENDING")),
			SenderStatus::Pending { rounds: None }
		);
		assert_eq!(SenderStatus::decode(Some("USED-L")), SenderStatus::UsedLimit);
		assert_eq!(SenderStatus::decode(Some("BLOCKED")), SenderStatus::Blocked);
		assert_eq!(
			SenderStatus::decode(Some("NOT_LOGINED")),
			SenderStatus::NotLoggedIn
		);
	}

	#[test]
	fn decode_parametrized_variants() {
		assert_eq!(
			SenderStatus::decode(Some("PENDING:7")),
			SenderStatus::Pending { rounds: Some(7) }
		);
		assert_eq!(
			SenderStatus::decode(Some("USED (12)")),
			SenderStatus::Used { count: Some(12) }
		);
		assert_eq!(
			SenderStatus::decode(Some("USED-R (3)")),
			SenderStatus::UsedReuse { count: Some(3) }
		);
	}

	#[test]
	fn unknown_text_round_trips() {
		let status = SenderStatus::decode(Some("QUARANTINED"));
		assert_eq!(status, SenderStatus::Other("QUARANTINED".into()));
		assert_eq!(status.encode().as_deref(), Some("QUARANTINED"));
	}

	#[test]
	fn encode_decode_round_trip() {
		let all = [
			SenderStatus::Available,
			SenderStatus::Pending { rounds: None },
			SenderStatus::Pending { rounds: Some(4) },
			SenderStatus::LoggedIn,
			SenderStatus::Used { count: None },
			SenderStatus::Used { count: Some(19) },
			SenderStatus::UsedReuse { count: Some(2) },
			SenderStatus::UsedLimit,
			SenderStatus::Blocked,
			SenderStatus::NotLoggedIn,
			SenderStatus::NeedPremium,
			SenderStatus::Failed,
		];
		for status in all {
			let encoded = status.encode();
			assert_eq!(SenderStatus::decode(encoded.as_deref()), status);
		}
	}

	#[test]
	fn checkpoint_only_on_pending() {
		assert_eq!(
			SenderStatus::Pending { rounds: Some(7) }.checkpoint(),
			Some(7)
		);
		assert_eq!(SenderStatus::Pending { rounds: None }.checkpoint(), None);
		assert_eq!(SenderStatus::Used { count: Some(7) }.checkpoint(), None);
	}
}
