//! Worker orchestration over the allocation engine
//!
//! The engine never drives a mail UI itself. Whatever does (a browser
//! automation layer in production, a scripted stub in tests) plugs in behind
//! [`MailClient`], and message content behind [`ContentSource`]. The dispatch
//! pool owns the fan-out: disjoint sender queues, one task per queue, bounded
//! retry passes afterwards.

pub mod pool;
pub mod worker;

pub use pool::{DispatchPool, DispatchSummary};
pub use worker::{AccountOutcome, AccountWorker};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error("mail client error: {0}")]
	Client(#[from] anyhow::Error),
}

/// Result of an authentication attempt against the remote mail service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
	Success,
	/// The service rejected the account itself, not just the attempt
	Blocked,
	Failed,
}

/// Result of sending one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	Sent,
	/// Provider's daily sending limit reached
	LimitReached,
	/// The compose UI raised a send-failure alert; treated like a limit
	AlertFailed,
	Failed,
}

/// One session against the remote mail service for a single account.
///
/// Implementations are stateful (a logged-in browser session) and are used
/// from exactly one worker at a time.
#[async_trait]
pub trait MailClient: Send {
	async fn attempt_login(&mut self, email: &str, password: &str)
		-> anyhow::Result<LoginOutcome>;

	async fn send_batch(
		&mut self,
		to: &str,
		bcc: &[String],
		subject: &str,
		body: &str,
	) -> anyhow::Result<SendOutcome>;
}

/// Produces one fresh [`MailClient`] per account, so no session state bleeds
/// between accounts.
#[async_trait]
pub trait MailClientFactory: Send + Sync {
	async fn connect(&self, worker_id: usize) -> anyhow::Result<Box<dyn MailClient>>;
}

/// Supplies message content; the engine treats it as opaque.
pub trait ContentSource: Send + Sync {
	fn subject(&self) -> String;
	fn body(&self) -> String;
}
