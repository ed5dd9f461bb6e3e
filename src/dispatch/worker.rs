//! Drives one sender account end-to-end
//!
//! Login, then a multi-round send loop: each round allocates a recipient
//! batch, sends, and records the outcome. Every failure path releases the
//! batch's `PROCESSING` locks before returning, and every completed round
//! writes a `PENDING:<n>` checkpoint so a crash resumes mid-send instead of
//! restarting.

use crate::accounts::AccountRegistry;
use crate::config::DispatchConfig;
use crate::dispatch::{ContentSource, DispatchError, LoginOutcome, MailClient, SendOutcome};
use crate::recipients::{RecipientAllocator, RecipientStatus};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

/// How processing one account ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
	/// Every round sent; account marked `USED`
	Completed { sent: u32 },
	/// Provider limit or send alert; account marked `USED-L`
	LimitReached { sent: u32 },
	/// Send failed after at least one successful round; marked `USED-R`
	PartialSend { sent: u32 },
	/// Send failed before anything went out; marked `PENDING`
	SendFailed,
	/// Recipient pool ran dry mid-send
	PoolExhausted { sent: u32 },
	/// Account rejected by the service; marked `BLOCKED`
	LoginBlocked,
	/// Authentication failed; marked `NOT_LOGINED`
	LoginFailed,
	/// The client session died; account left retryable
	ClientError,
	/// No such row in the store
	Missing,
}

impl AccountOutcome {
	/// Whether the account needs no further attention from retry passes.
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Completed { .. } | Self::LimitReached { .. })
	}
}

pub struct AccountWorker {
	registry: Arc<AccountRegistry>,
	allocator: Arc<RecipientAllocator>,
	content: Arc<dyn ContentSource>,
	config: DispatchConfig,
}

impl AccountWorker {
	pub fn new(
		registry: Arc<AccountRegistry>,
		allocator: Arc<RecipientAllocator>,
		content: Arc<dyn ContentSource>,
		config: DispatchConfig,
	) -> Self {
		Self {
			registry,
			allocator,
			content,
			config,
		}
	}

	/// Process the account at `row` with a fresh client session.
	pub async fn process_account(
		&self,
		client: &mut dyn MailClient,
		row: i32,
	) -> Result<AccountOutcome, DispatchError> {
		let Some(account) = self.registry.get_sender_by_row(row).await? else {
			warn!(row, "account row not found, skipping");
			return Ok(AccountOutcome::Missing);
		};

		// Resume from the checkpoint when a previous run was interrupted
		// mid-send.
		let start_round = account.status.checkpoint().map(|n| n + 1).unwrap_or(1);
		if start_round > 1 {
			info!(row, email = %account.email, start_round, "resuming interrupted send");
		}

		let password = account.password.as_deref().unwrap_or("");
		match client.attempt_login(&account.email, password).await {
			Ok(LoginOutcome::Success) => {
				self.registry.mark_logged_in(row).await?;
			}
			Ok(LoginOutcome::Blocked) => {
				warn!(row, email = %account.email, "account blocked by service");
				self.registry.mark_blocked(row).await?;
				return Ok(AccountOutcome::LoginBlocked);
			}
			Ok(LoginOutcome::Failed) => {
				warn!(row, email = %account.email, "login failed");
				self.registry.mark_not_logged_in(row).await?;
				return Ok(AccountOutcome::LoginFailed);
			}
			Err(e) => {
				warn!(row, email = %account.email, error = %e, "client died during login");
				self.registry.mark_pending(row).await?;
				return Ok(AccountOutcome::ClientError);
			}
		}

		self.send_rounds(client, row, start_round).await
	}

	async fn send_rounds(
		&self,
		client: &mut dyn MailClient,
		row: i32,
		start_round: u32,
	) -> Result<AccountOutcome, DispatchError> {
		let (rounds_min, rounds_max) = self.config.rounds;
		let total_rounds = {
			let mut rng = rand::thread_rng();
			rng.gen_range(rounds_min..=rounds_max)
		};
		let mut sent = 0u32;

		for round in start_round..=total_rounds {
			let batch_size = {
				let (min, max) = self.config.batch_size;
				let mut rng = rand::thread_rng();
				rng.gen_range(min..=max)
			};
			let batch = self
				.allocator
				.get_batch_recipients(batch_size, row as i64)
				.await?;
			if batch.is_empty() {
				warn!(row, round, "no recipients left to allocate");
				if sent == 0 {
					self.registry.mark_pending(row).await?;
				}
				return Ok(AccountOutcome::PoolExhausted { sent });
			}

			let subject = self.content.subject();
			let body = self.content.body();
			let outcome = client
				.send_batch(&self.config.to_address, &batch.addresses, &subject, &body)
				.await;

			match outcome {
				Ok(SendOutcome::Sent) => {
					self.allocator
						.update_batch_status(&batch.rows, Some(RecipientStatus::Used))
						.await?;
					sent += 1;
					self.registry.mark_rounds(row, round).await?;
				}
				Ok(SendOutcome::LimitReached) | Ok(SendOutcome::AlertFailed) => {
					info!(row, sent, "sending limit reached");
					self.registry.mark_limit_reached(row).await?;
					self.allocator.update_batch_status(&batch.rows, None).await?;
					return Ok(AccountOutcome::LimitReached { sent });
				}
				Ok(SendOutcome::Failed) => {
					self.allocator.update_batch_status(&batch.rows, None).await?;
					return if sent > 0 {
						warn!(row, sent, "send failed after partial progress");
						self.registry.mark_used_reuse(row, Some(sent)).await?;
						Ok(AccountOutcome::PartialSend { sent })
					} else {
						warn!(row, "send failed before any progress");
						self.registry.mark_pending(row).await?;
						Ok(AccountOutcome::SendFailed)
					};
				}
				Err(e) => {
					warn!(row, error = %e, "client died mid-send");
					self.allocator.update_batch_status(&batch.rows, None).await?;
					if sent > 0 {
						self.registry.mark_used_reuse(row, Some(sent)).await?;
					} else {
						self.registry.mark_pending(row).await?;
					}
					return Ok(AccountOutcome::ClientError);
				}
			}
		}

		let count = (sent > 0).then_some(sent);
		self.registry.mark_used(row, count).await?;
		info!(row, sent, "account fully processed");
		Ok(AccountOutcome::Completed { sent })
	}
}
