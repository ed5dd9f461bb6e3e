//! External ledger synchronization
//!
//! The durable record of senders and recipients lives in CSV ledger files
//! with a header row: an email column, a password column (senders only) and
//! a rolling status column whose header carries the current period marker.
//! [`SyncCoordinator`] reconciles those files with the database at session
//! boundaries and implements the daily rollover.

pub mod sheet;
pub mod sync;

pub use sheet::Sheet;
pub use sync::{ImportReport, SyncCoordinator, SyncOptions};

use std::path::PathBuf;
use thiserror::Error;

/// First ledger row holding data; row 1 is the header. `original_row` values
/// use this addressing so they remain stable between both stores.
pub const FIRST_DATA_ROW: i32 = 2;

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("ledger file not found: {0}")]
	NotFound(PathBuf),

	#[error("required column '{0}' not found in {1}")]
	MissingColumn(&'static str, PathBuf),

	#[error("ledger parse error: {0}")]
	Csv(#[from] csv::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),
}

impl LedgerError {
	/// Write-permission failures are retried with jittered backoff before
	/// being surfaced; everything else is a hard failure.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
			Self::Csv(e) => matches!(
				e.kind(),
				csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied
			),
			_ => false,
		}
	}
}
