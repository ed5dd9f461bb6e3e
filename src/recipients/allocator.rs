//! Batch allocation over the recipient pool
//!
//! Each caller gets a batch of unused addresses via stratified gap sampling:
//! candidate index `(k * gap + seed + shift) % total`. Different seeds land
//! on different phases of the progression, so concurrent workers rarely
//! collide even before the lock is taken. A linear scan tops up the batch
//! when the gap search under-fills.
//!
//! The whole read-then-lock sequence runs under one mutex and one database
//! transaction; that is the only concurrency control the pool needs, because
//! senders are pre-partitioned and recipients are touched through this
//! allocator alone.

use crate::infrastructure::database::{entities::recipient, Database};
use crate::recipients::{current_period, is_available, RecipientStatus};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
	ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One allocation result: addresses to send to and the ledger rows backing
/// them. May hold fewer than the requested batch size when the pool runs dry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
	pub addresses: Vec<String>,
	pub rows: Vec<i32>,
}

impl Batch {
	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}
}

pub struct RecipientAllocator {
	db: Arc<Database>,
	/// Serializes the read-candidates-then-lock sequence across callers
	guard: Mutex<()>,
}

impl RecipientAllocator {
	pub fn new(db: Arc<Database>) -> Self {
		Self {
			db,
			guard: Mutex::new(()),
		}
	}

	/// Hand out up to `batch_size` available recipients for the caller
	/// identified by `sender_seed`, locking every selected row as
	/// `PROCESSING` for the current period before returning.
	pub async fn get_batch_recipients(
		&self,
		batch_size: usize,
		sender_seed: i64,
	) -> Result<Batch, DbErr> {
		if batch_size == 0 {
			return Ok(Batch::default());
		}

		let _guard = self.guard.lock().await;
		let today = current_period();

		let txn = self.db.conn().begin().await?;

		let snapshot = recipient::Entity::find()
			.order_by_asc(recipient::Column::OriginalRow)
			.all(&txn)
			.await?;

		if snapshot.is_empty() {
			txn.commit().await?;
			return Ok(Batch::default());
		}

		let available: Vec<bool> = snapshot
			.iter()
			.map(|m| is_available(m.status.as_deref(), m.status_period.as_deref(), &today))
			.collect();

		let (picked, attempts, budget) = select_indices(&available, batch_size, sender_seed);
		if attempts >= budget {
			warn!(
				attempts,
				budget,
				found = picked.len(),
				requested = batch_size,
				"high collision rate during gap search"
			);
		}
		if picked.len() < batch_size {
			debug!(
				found = picked.len(),
				requested = batch_size,
				"recipient pool exhausted; returning partial batch"
			);
		}

		let mut batch = Batch::default();
		let mut ids = Vec::with_capacity(picked.len());
		for idx in picked {
			let model = &snapshot[idx];
			batch.addresses.push(model.email.trim().to_string());
			batch.rows.push(model.original_row);
			ids.push(model.id);
		}

		if !ids.is_empty() {
			recipient::Entity::update_many()
				.col_expr(
					recipient::Column::Status,
					Expr::value(RecipientStatus::Processing.as_str()),
				)
				.col_expr(recipient::Column::StatusPeriod, Expr::value(today.clone()))
				.col_expr(recipient::Column::UpdatedAt, Expr::value(Utc::now()))
				.filter(recipient::Column::Id.is_in(ids))
				.exec(&txn)
				.await?;
		}

		txn.commit().await?;
		Ok(batch)
	}

	/// Overwrite the given rows with `status` tagged to the current period,
	/// or release them back to available when `status` is `None`.
	pub async fn update_batch_status(
		&self,
		rows: &[i32],
		status: Option<RecipientStatus>,
	) -> Result<(), DbErr> {
		if rows.is_empty() {
			return Ok(());
		}
		let (status_value, period_value) = match status {
			Some(s) => (Some(s.as_str().to_string()), Some(current_period())),
			None => (None, None),
		};
		recipient::Entity::update_many()
			.col_expr(recipient::Column::Status, Expr::value(status_value))
			.col_expr(recipient::Column::StatusPeriod, Expr::value(period_value))
			.col_expr(recipient::Column::UpdatedAt, Expr::value(Utc::now()))
			.filter(recipient::Column::OriginalRow.is_in(rows.to_vec()))
			.exec(self.db.conn())
			.await?;
		Ok(())
	}

	/// Number of recipients consumed, regardless of period.
	pub async fn used_count(&self) -> Result<u64, DbErr> {
		recipient::Entity::find()
			.filter(recipient::Column::Status.eq(RecipientStatus::Used.as_str()))
			.count(self.db.conn())
			.await
	}
}

/// Pick up to `batch_size` available indices: gap sampling first, linear-scan
/// fallback second. Returns the picks in selection order together with the
/// attempt count and budget for diagnostics.
fn select_indices(available: &[bool], batch_size: usize, seed: i64) -> (Vec<usize>, usize, usize) {
	let total = available.len();
	let gap = (total / batch_size).max(1);
	let budget = (batch_size * 100).max(2000);

	let mut picked = Vec::with_capacity(batch_size);
	let mut taken = vec![false; total];
	let mut shift: i64 = 0;
	let mut attempts = 0usize;

	while picked.len() < batch_size && attempts < budget {
		let k = picked.len() as i64;
		let idx = (k * gap as i64 + seed + shift).rem_euclid(total as i64) as usize;
		if !taken[idx] && available[idx] {
			taken[idx] = true;
			picked.push(idx);
		} else {
			shift += 1;
		}
		attempts += 1;
	}

	// Fallback: sweep the whole table, skipping rows already selected above.
	if picked.len() < batch_size {
		for idx in 0..total {
			if picked.len() == batch_size {
				break;
			}
			if !taken[idx] && available[idx] {
				taken[idx] = true;
				picked.push(idx);
			}
		}
	}

	(picked, attempts, budget)
}
