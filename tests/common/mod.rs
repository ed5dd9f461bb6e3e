//! Shared helpers for integration tests

#![allow(dead_code)]

use chrono::Utc;
use mailrun_core::infrastructure::database::entities::{recipient, sender};
use mailrun_core::infrastructure::database::Database;
use sea_orm::{ActiveValue::Set, EntityTrait};
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh file-backed database in a temp dir. The dir must outlive the db.
pub async fn temp_db() -> (TempDir, Arc<Database>) {
	let dir = tempfile::tempdir().unwrap();
	let db = Database::create(&dir.path().join("session.db")).await.unwrap();
	(dir, Arc::new(db))
}

pub async fn seed_sender(db: &Database, row: i32, email: &str, status: Option<&str>) {
	seed_sender_with_rounds(db, row, email, status, 0).await;
}

pub async fn seed_sender_with_rounds(
	db: &Database,
	row: i32,
	email: &str,
	status: Option<&str>,
	rounds: i32,
) {
	let model = sender::ActiveModel {
		email: Set(email.to_string()),
		password: Set(Some("hunter2".to_string())),
		status: Set(status.map(str::to_string)),
		rounds_completed: Set(rounds),
		original_row: Set(row),
		updated_at: Set(Utc::now()),
		..Default::default()
	};
	sender::Entity::insert(model).exec(db.conn()).await.unwrap();
}

pub async fn seed_recipient(
	db: &Database,
	row: i32,
	email: &str,
	status: Option<&str>,
	period: Option<&str>,
) {
	let model = recipient::ActiveModel {
		email: Set(email.to_string()),
		status: Set(status.map(str::to_string)),
		status_period: Set(period.map(str::to_string)),
		original_row: Set(row),
		updated_at: Set(Utc::now()),
		..Default::default()
	};
	recipient::Entity::insert(model)
		.exec(db.conn())
		.await
		.unwrap();
}

/// Seed `count` available recipients at rows 2..2+count.
pub async fn seed_recipient_pool(db: &Database, count: usize) {
	let models: Vec<recipient::ActiveModel> = (0..count)
		.map(|i| recipient::ActiveModel {
			email: Set(format!("r{}@pool.test", i)),
			status: Set(None),
			status_period: Set(None),
			original_row: Set(i as i32 + 2),
			updated_at: Set(Utc::now()),
			..Default::default()
		})
		.collect();
	recipient::Entity::insert_many(models)
		.exec(db.conn())
		.await
		.unwrap();
}

pub async fn sender_status(db: &Database, row: i32) -> Option<String> {
	use sea_orm::{ColumnTrait, QueryFilter};
	sender::Entity::find()
		.filter(sender::Column::OriginalRow.eq(row))
		.one(db.conn())
		.await
		.unwrap()
		.expect("sender row missing")
		.status
}

pub async fn recipient_status(db: &Database, row: i32) -> (Option<String>, Option<String>) {
	use sea_orm::{ColumnTrait, QueryFilter};
	let model = recipient::Entity::find()
		.filter(recipient::Column::OriginalRow.eq(row))
		.one(db.conn())
		.await
		.unwrap()
		.expect("recipient row missing");
	(model.status, model.status_period)
}
