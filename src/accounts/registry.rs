//! Sender account registry
//!
//! Owns every sender status transition and the queue partitioning that keeps
//! parallel workers off each other's accounts. All writes are last-writer-wins
//! overwrites except [`AccountRegistry::mark_failed`], which refuses to
//! regress a consumed or blocked account.

use crate::accounts::{token, SenderStatus};
use crate::infrastructure::database::{entities::sender, Database};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, DbErr, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{debug, info};

/// Credentials for the next account to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderCredentials {
	pub email: String,
	pub password: Option<String>,
	pub row: i32,
}

/// Full account snapshot for a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderAccount {
	pub email: String,
	pub password: Option<String>,
	pub status: SenderStatus,
	pub rounds_completed: u32,
	pub row: i32,
}

pub struct AccountRegistry {
	db: Arc<Database>,
}

impl AccountRegistry {
	pub fn new(db: Arc<Database>) -> Self {
		Self { db }
	}

	/// Rows eligible for queue partitioning: no status yet, queued, or
	/// checkpointed mid-send.
	fn eligible() -> Condition {
		Condition::any()
			.add(sender::Column::Status.is_null())
			.add(sender::Column::Status.eq(""))
			.add(sender::Column::Status.eq(token::PENDING))
			.add(sender::Column::Status.like(format!("{}%", token::PENDING_PREFIX)))
	}

	/// Next available or pending account, in storage order. Checkpointed
	/// accounts are not handed out here; they re-enter through the queues.
	pub async fn get_next_sender(&self) -> Result<Option<SenderCredentials>, DbErr> {
		let found = sender::Entity::find()
			.filter(
				Condition::any()
					.add(sender::Column::Status.is_null())
					.add(sender::Column::Status.eq(""))
					.add(sender::Column::Status.eq(token::PENDING)),
			)
			.one(self.db.conn())
			.await?;
		Ok(found.map(|m| SenderCredentials {
			email: m.email,
			password: m.password,
			row: m.original_row,
		}))
	}

	/// Partition all eligible rows into `n` disjoint queues, round-robin over
	/// `original_row` order. Computed once from a single snapshot before any
	/// worker starts; this is the sole mechanism keeping two workers off the
	/// same account.
	pub async fn create_queues(&self, n: usize) -> Result<Vec<Vec<i32>>, DbErr> {
		if n == 0 {
			return Ok(Vec::new());
		}
		let rows = sender::Entity::find()
			.filter(Self::eligible())
			.order_by_asc(sender::Column::OriginalRow)
			.all(self.db.conn())
			.await?;

		let mut queues = vec![Vec::new(); n];
		for (i, model) in rows.iter().enumerate() {
			queues[i % n].push(model.original_row);
		}
		info!(
			accounts = rows.len(),
			queues = n,
			"distributed sender rows across worker queues"
		);
		Ok(queues)
	}

	/// Point lookup by ledger row; `None` if the row is absent.
	pub async fn get_sender_by_row(&self, row: i32) -> Result<Option<SenderAccount>, DbErr> {
		let found = sender::Entity::find()
			.filter(sender::Column::OriginalRow.eq(row))
			.one(self.db.conn())
			.await?;
		Ok(found.map(|m| SenderAccount {
			email: m.email,
			password: m.password,
			status: SenderStatus::decode(m.status.as_deref()),
			rounds_completed: m.rounds_completed.max(0) as u32,
			row,
		}))
	}

	async fn set_status(&self, row: i32, status: &SenderStatus) -> Result<(), DbErr> {
		sender::Entity::update_many()
			.col_expr(sender::Column::Status, Expr::value(status.encode()))
			.col_expr(sender::Column::UpdatedAt, Expr::value(Utc::now()))
			.filter(sender::Column::OriginalRow.eq(row))
			.exec(self.db.conn())
			.await?;
		Ok(())
	}

	pub async fn mark_pending(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::Pending { rounds: None }).await
	}

	pub async fn mark_logged_in(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::LoggedIn).await
	}

	pub async fn mark_used(&self, row: i32, count: Option<u32>) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::Used { count }).await
	}

	pub async fn mark_used_reuse(&self, row: i32, count: Option<u32>) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::UsedReuse { count }).await
	}

	pub async fn mark_limit_reached(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::UsedLimit).await
	}

	pub async fn mark_blocked(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::Blocked).await
	}

	pub async fn mark_not_logged_in(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::NotLoggedIn).await
	}

	pub async fn mark_need_premium(&self, row: i32) -> Result<(), DbErr> {
		self.set_status(row, &SenderStatus::NeedPremium).await
	}

	/// Guarded transition: a consumed or blocked account never regresses to
	/// `FAILED`, otherwise retry passes would loop over it forever.
	pub async fn mark_failed(&self, row: i32) -> Result<(), DbErr> {
		if let Some(account) = self.get_sender_by_row(row).await? {
			if account.status.is_consumed() || account.status == SenderStatus::Blocked {
				debug!(row, status = ?account.status, "skipping mark_failed");
				return Ok(());
			}
		}
		self.set_status(row, &SenderStatus::Failed).await
	}

	/// Persist the multi-round checkpoint: status `PENDING:<n>` plus the
	/// `rounds_completed` column. A resuming worker continues from `n + 1`.
	pub async fn mark_rounds(&self, row: i32, rounds: u32) -> Result<(), DbErr> {
		sender::Entity::update_many()
			.col_expr(
				sender::Column::Status,
				Expr::value(SenderStatus::Pending { rounds: Some(rounds) }.encode()),
			)
			.col_expr(sender::Column::RoundsCompleted, Expr::value(rounds as i32))
			.col_expr(sender::Column::UpdatedAt, Expr::value(Utc::now()))
			.filter(sender::Column::OriginalRow.eq(row))
			.exec(self.db.conn())
			.await?;
		Ok(())
	}

	/// Rows eligible for a retry pass. Includes login and processing failures
	/// on top of the fresh-pass set; consumed and blocked accounts never
	/// reappear here.
	pub async fn get_pending_rows(&self) -> Result<Vec<i32>, DbErr> {
		let cond = Condition::any()
			.add(sender::Column::Status.is_null())
			.add(sender::Column::Status.eq(""))
			.add(sender::Column::Status.eq(token::PENDING))
			.add(sender::Column::Status.eq(token::NOT_LOGGED_IN))
			.add(sender::Column::Status.eq(token::FAILED))
			.add(sender::Column::Status.like(format!("{}%", token::PENDING_PREFIX)));
		let rows = sender::Entity::find()
			.filter(cond)
			.order_by_asc(sender::Column::OriginalRow)
			.all(self.db.conn())
			.await?;
		if !rows.is_empty() {
			info!(count = rows.len(), "accounts still eligible for retry");
		}
		Ok(rows.into_iter().map(|m| m.original_row).collect())
	}

	async fn emails_matching(&self, cond: Condition) -> Result<Vec<String>, DbErr> {
		let rows = sender::Entity::find()
			.filter(cond)
			.order_by_asc(sender::Column::OriginalRow)
			.all(self.db.conn())
			.await?;
		Ok(rows.into_iter().map(|m| m.email).collect())
	}

	/// Accounts consumed this session (any `USED` variant).
	pub async fn get_used_accounts(&self) -> Result<Vec<String>, DbErr> {
		self.emails_matching(
			Condition::all().add(sender::Column::Status.like(format!("{}%", token::USED))),
		)
		.await
	}

	pub async fn get_limit_reached_accounts(&self) -> Result<Vec<String>, DbErr> {
		self.emails_matching(Condition::all().add(sender::Column::Status.eq(token::USED_LIMIT)))
			.await
	}

	pub async fn get_failed_accounts(&self) -> Result<Vec<String>, DbErr> {
		self.emails_matching(Condition::all().add(sender::Column::Status.eq(token::FAILED)))
			.await
	}

	pub async fn get_not_logged_in_accounts(&self) -> Result<Vec<String>, DbErr> {
		self.emails_matching(Condition::all().add(sender::Column::Status.eq(token::NOT_LOGGED_IN)))
			.await
	}

	pub async fn get_blocked_accounts(&self) -> Result<Vec<String>, DbErr> {
		self.emails_matching(Condition::all().add(sender::Column::Status.eq(token::BLOCKED)))
			.await
	}
}
