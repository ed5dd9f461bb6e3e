//! Session-boundary reconciliation between the ledger files and the database
//!
//! Import runs once at process start: it applies the daily rollover to the
//! ledger files (saving them immediately, so a crash mid-import still leaves
//! them reset), then truncates and reloads both database tables. Export runs
//! once at process end and writes every status back into the rolling status
//! column.

use crate::accounts::{token, SenderStatus};
use crate::infrastructure::database::entities::{recipient, sender};
use crate::infrastructure::database::Database;
use crate::ledger::{LedgerError, Sheet, FIRST_DATA_ROW};
use crate::recipients::{current_period, RecipientStatus};
use chrono::Local;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Where the ledger files live and which statuses survive rollover.
#[derive(Debug, Clone)]
pub struct SyncOptions {
	pub sender_ledger: PathBuf,
	pub recipient_ledger: PathBuf,
	/// Statuses preserved across a period rollover. Everything else that
	/// marks an account consumed is reset to available on a new day.
	pub rollover_keep: Vec<String>,
}

impl SyncOptions {
	pub fn new(sender_ledger: PathBuf, recipient_ledger: PathBuf) -> Self {
		Self {
			sender_ledger,
			recipient_ledger,
			rollover_keep: default_rollover_keep(),
		}
	}
}

/// Default rollover allow-list: accounts the remote service has durably
/// rejected or gated stay marked; everything else gets another chance.
pub fn default_rollover_keep() -> Vec<String> {
	vec![token::BLOCKED.to_string(), token::NEED_PREMIUM.to_string()]
}

/// What an import pass did, mostly for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
	pub senders: usize,
	pub recipients: usize,
	pub sender_rollover: bool,
	pub recipient_rollover: bool,
}

pub struct SyncCoordinator {
	db: Arc<Database>,
	options: SyncOptions,
}

/// Today's sender period marker (`dd-mm-YYYY`).
fn sender_period() -> String {
	Local::now().format("%d-%m-%Y").to_string()
}

/// Sender status headers are either a `d-m-yyyy` date or the literal
/// `status` left over from hand-built ledgers.
fn is_sender_status_header(header: &str) -> bool {
	if header.eq_ignore_ascii_case("status") {
		return true;
	}
	let parts: Vec<&str> = header.split('-').collect();
	matches!(parts.as_slice(), [d, m, y]
		if (1..=2).contains(&d.len()) && d.chars().all(|c| c.is_ascii_digit())
		&& (1..=2).contains(&m.len()) && m.chars().all(|c| c.is_ascii_digit())
		&& y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
}

/// Recipient status headers are looser: `status`, today's marker, or any
/// dash-carrying header from a previous day.
fn is_recipient_status_header(header: &str, today: &str) -> bool {
	header.eq_ignore_ascii_case("status") || header == today || header.contains('-')
}

impl SyncCoordinator {
	pub fn new(db: Arc<Database>, options: SyncOptions) -> Self {
		Self { db, options }
	}

	// -----------------------------------------------------------------
	// Import: ledger -> database
	// -----------------------------------------------------------------

	pub async fn import(&self) -> Result<ImportReport, LedgerError> {
		info!("importing ledgers into the session store");
		let mut report = ImportReport::default();
		self.import_senders(&mut report).await?;
		self.import_recipients(&mut report).await?;
		info!(
			senders = report.senders,
			recipients = report.recipients,
			"ledger import complete"
		);
		Ok(report)
	}

	async fn import_senders(&self, report: &mut ImportReport) -> Result<(), LedgerError> {
		let mut sheet = Sheet::load(&self.options.sender_ledger)?;
		let today = sender_period();

		let email_col = sheet
			.find_column(|h| h.to_lowercase().contains("email"))
			.ok_or(LedgerError::MissingColumn(
				"email",
				self.options.sender_ledger.clone(),
			))?;
		let password_col = sheet.find_column(|h| h.to_lowercase().contains("password"));
		let status_col = sheet.find_column(is_sender_status_header);

		let mut rollover = false;
		if let Some(col) = status_col {
			let header = sheet.header(col).trim().to_string();
			if header != today {
				info!(previous = %header, current = %today, "sender period rollover, resetting consumed statuses");
				rollover = true;
				sheet.set_header(col, &today);
				// Clean the file first and save before any further work, so
				// a crash mid-import cannot trap yesterday's statuses.
				for row in 0..sheet.row_count() {
					let value = sheet.cell(row, col).trim().to_string();
					if value.is_empty() || self.options.rollover_keep.contains(&value) {
						continue;
					}
					if value.to_uppercase().contains(token::USED) {
						sheet.set_cell(row, col, "");
					}
				}
				sheet.save_with_retry().await?;
			}
		} else {
			warn!(path = %self.options.sender_ledger.display(), "sender ledger has no status column");
		}

		let mut models = Vec::new();
		for row in 0..sheet.row_count() {
			let email = sheet.cell(row, email_col).trim().to_string();
			if email.is_empty() {
				continue;
			}
			let password = password_col
				.map(|c| sheet.cell(row, c).trim().to_string())
				.filter(|p| !p.is_empty());

			let raw_status = status_col
				.map(|c| sheet.cell(row, c).trim().to_string())
				.filter(|s| !s.is_empty());
			let status = self.reset_for_import(raw_status, rollover);
			let rounds = SenderStatus::decode(status.as_deref())
				.checkpoint()
				.unwrap_or(0);

			models.push(sender::ActiveModel {
				email: Set(email),
				password: Set(password),
				status: Set(status),
				rounds_completed: Set(rounds as i32),
				original_row: Set(row as i32 + FIRST_DATA_ROW),
				updated_at: Set(chrono::Utc::now()),
				..Default::default()
			});
		}

		report.senders = models.len();
		report.sender_rollover = rollover;

		let txn = self.db.conn().begin().await?;
		sender::Entity::delete_many().exec(&txn).await?;
		if !models.is_empty() {
			sender::Entity::insert_many(models)
				.on_conflict(
					OnConflict::column(sender::Column::Email)
						.do_nothing()
						.to_owned(),
				)
				.exec_without_returning(&txn)
				.await?;
		}
		txn.commit().await?;
		Ok(())
	}

	/// Status carried into the store at import time. Rollover clears consumed
	/// statuses outside the allow-list; a processing error from a previous
	/// run is always retried.
	fn reset_for_import(&self, status: Option<String>, rollover: bool) -> Option<String> {
		let status = status?;
		if self.options.rollover_keep.contains(&status) {
			return Some(status);
		}
		if rollover && status.to_uppercase().contains(token::USED) {
			return None;
		}
		if status == token::FAILED {
			return None;
		}
		Some(status)
	}

	async fn import_recipients(&self, report: &mut ImportReport) -> Result<(), LedgerError> {
		let mut sheet = Sheet::load(&self.options.recipient_ledger)?;
		let today = current_period();

		let email_col = sheet
			.find_column(|h| h.to_lowercase().contains("email"))
			.ok_or(LedgerError::MissingColumn(
				"email",
				self.options.recipient_ledger.clone(),
			))?;
		let status_col = sheet.find_column(|h| is_recipient_status_header(h, &today));

		if let Some(col) = status_col {
			let header = sheet.header(col).trim().to_string();
			if header != today {
				info!(previous = %header, current = %today, "recipient period rollover, clearing status column");
				report.recipient_rollover = true;
				sheet.set_header(col, &today);
				for row in 0..sheet.row_count() {
					sheet.set_cell(row, col, "");
				}
				sheet.save_with_retry().await?;
			}
		}

		let mut models = Vec::new();
		let mut swept = 0usize;
		for row in 0..sheet.row_count() {
			let email = sheet.cell(row, email_col).trim().to_string();
			if email.is_empty() {
				continue;
			}
			let raw = status_col.map(|c| sheet.cell(row, c).trim().to_string());
			let mut status = raw.as_deref().and_then(|s| decode_period_status(s, &today));

			// Crash recovery: a PROCESSING lock surviving to the next import
			// belongs to a dead worker, reclaim it even within the period.
			if status == Some(RecipientStatus::Processing) {
				status = None;
				swept += 1;
			}

			models.push(recipient::ActiveModel {
				email: Set(email),
				status: Set(status.map(|s| s.as_str().to_string())),
				status_period: Set(status.map(|_| today.clone())),
				original_row: Set(row as i32 + FIRST_DATA_ROW),
				updated_at: Set(chrono::Utc::now()),
				..Default::default()
			});
		}
		if swept > 0 {
			info!(count = swept, "released stuck PROCESSING recipients");
		}

		report.recipients = models.len();

		let txn = self.db.conn().begin().await?;
		recipient::Entity::delete_many().exec(&txn).await?;
		if !models.is_empty() {
			recipient::Entity::insert_many(models)
				.on_conflict(
					OnConflict::column(recipient::Column::Email)
						.do_nothing()
						.to_owned(),
				)
				.exec_without_returning(&txn)
				.await?;
		}
		txn.commit().await?;
		Ok(())
	}

	// -----------------------------------------------------------------
	// Export: database -> ledger
	// -----------------------------------------------------------------

	pub async fn export(&self) -> Result<(), LedgerError> {
		info!("exporting session store back to the ledgers");
		self.export_senders().await?;
		self.export_recipients().await?;
		info!("ledger export complete");
		Ok(())
	}

	async fn export_senders(&self) -> Result<(), LedgerError> {
		let rows = sender::Entity::find()
			.order_by_asc(sender::Column::OriginalRow)
			.all(self.db.conn())
			.await?;

		let mut sheet = Sheet::load(&self.options.sender_ledger)?;
		let today = sender_period();
		let status_col = sheet
			.find_column(|h| h == today || h.to_lowercase().contains("status"))
			.unwrap_or_else(|| sheet.push_column(&today));

		for model in rows {
			let status = SenderStatus::decode(model.status.as_deref());
			// A bare PENDING with recorded progress serializes with its
			// checkpoint so the next session can resume mid-send.
			let value = match status {
				SenderStatus::Pending { rounds: None } if model.rounds_completed > 0 => {
					SenderStatus::Pending {
						rounds: Some(model.rounds_completed as u32),
					}
					.encode()
				}
				other => other.encode(),
			};
			let sheet_row = (model.original_row - FIRST_DATA_ROW).max(0) as usize;
			sheet.set_cell(sheet_row, status_col, value.as_deref().unwrap_or(""));
		}

		sheet.save_with_retry().await
	}

	async fn export_recipients(&self) -> Result<(), LedgerError> {
		// Only touched rows are written back, the pool is large and mostly
		// untouched.
		let rows = recipient::Entity::find()
			.filter(recipient::Column::Status.is_not_null())
			.order_by_asc(recipient::Column::OriginalRow)
			.all(self.db.conn())
			.await?;

		let mut sheet = Sheet::load(&self.options.recipient_ledger)?;
		let today = current_period();
		let status_col = sheet
			.find_column(|h| h == today)
			.unwrap_or_else(|| sheet.push_column(&today));

		for model in rows {
			let Some(status) = model.status.as_deref() else {
				continue;
			};
			let sheet_row = (model.original_row - FIRST_DATA_ROW).max(0) as usize;
			sheet.set_cell(sheet_row, status_col, &format!("{}|{}", status, today));
		}

		sheet.save_with_retry().await
	}
}

/// Decode a `STATUS|PERIOD` ledger cell. Only a status tagged with today's
/// period is honored; stale or untagged text is reclaimed.
fn decode_period_status(raw: &str, today: &str) -> Option<RecipientStatus> {
	let raw = raw.trim();
	if raw.is_empty() {
		return None;
	}
	let (status_part, period) = raw.rsplit_once('|')?;
	if period.trim() != today {
		return None;
	}
	RecipientStatus::parse(status_part)
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn sender_status_header_detection() {
		assert!(is_sender_status_header("Status"));
		assert!(is_sender_status_header("status"));
		assert!(is_sender_status_header("16-01-2026"));
		assert!(is_sender_status_header("7-3-2026"));
		assert!(!is_sender_status_header("Email"));
		assert!(!is_sender_status_header("16-01"));
		assert!(!is_sender_status_header("16-01-26"));
	}

	#[test]
	fn recipient_status_header_detection() {
		assert!(is_recipient_status_header("status", "16-01"));
		assert!(is_recipient_status_header("16-01", "16-01"));
		assert!(is_recipient_status_header("15-01", "16-01"));
		assert!(!is_recipient_status_header("Email", "16-01"));
	}

	#[test]
	fn period_status_decode() {
		assert_eq!(
			decode_period_status("USED|16-01", "16-01"),
			Some(RecipientStatus::Used)
		);
		assert_eq!(decode_period_status("USED|15-01", "16-01"), None);
		assert_eq!(decode_period_status("USED", "16-01"), None);
		assert_eq!(decode_period_status("", "16-01"), None);
		assert_eq!(
			decode_period_status("FAILED|16-01", "16-01"),
			Some(RecipientStatus::Failed)
		);
	}
}
