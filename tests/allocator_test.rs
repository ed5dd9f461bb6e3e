//! Recipient allocator integration tests

mod common;

use common::{recipient_status, seed_recipient, seed_recipient_pool, temp_db};
use mailrun_core::recipients::{current_period, RecipientAllocator, RecipientStatus};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn sequential_allocations_are_disjoint() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 200).await;
	let allocator = RecipientAllocator::new(db.clone());

	let first = allocator.get_batch_recipients(30, 0).await.unwrap();
	let second = allocator.get_batch_recipients(30, 1).await.unwrap();

	assert_eq!(first.len(), 30);
	assert_eq!(second.len(), 30);

	let rows_a: HashSet<i32> = first.rows.iter().copied().collect();
	let rows_b: HashSet<i32> = second.rows.iter().copied().collect();
	assert!(rows_a.is_disjoint(&rows_b));
}

#[tokio::test]
async fn concurrent_allocations_never_share_rows() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 100).await;
	let allocator = Arc::new(RecipientAllocator::new(db.clone()));

	let mut handles = Vec::new();
	for seed in 0..8i64 {
		let allocator = allocator.clone();
		handles.push(tokio::spawn(async move {
			allocator.get_batch_recipients(10, seed).await.unwrap()
		}));
	}

	let mut all_rows = Vec::new();
	for handle in handles {
		let batch = handle.await.unwrap();
		assert_eq!(batch.len(), 10);
		all_rows.extend(batch.rows);
	}

	let distinct: HashSet<i32> = all_rows.iter().copied().collect();
	assert_eq!(distinct.len(), all_rows.len(), "two callers shared a row");
}

#[tokio::test]
async fn fills_full_batch_despite_heavy_consumption() {
	let (_dir, db) = temp_db().await;
	let today = current_period();
	// 1000 rows, every other one already consumed this period
	for i in 0..1000 {
		let (status, period) = if i % 2 == 0 {
			(Some("USED"), Some(today.as_str()))
		} else {
			(None, None)
		};
		seed_recipient(&db, i + 2, &format!("r{}@pool.test", i), status, period).await;
	}

	let allocator = RecipientAllocator::new(db.clone());
	let batch = allocator.get_batch_recipients(30, 5).await.unwrap();
	assert_eq!(batch.len(), 30);

	// Everything handed out was genuinely available
	for row in &batch.rows {
		let (status, period) = recipient_status(&db, *row).await;
		assert_eq!(status.as_deref(), Some("PROCESSING"));
		assert_eq!(period.as_deref(), Some(today.as_str()));
	}
}

#[tokio::test]
async fn allocated_rows_are_locked_processing() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 10).await;
	let allocator = RecipientAllocator::new(db.clone());

	let batch = allocator.get_batch_recipients(4, 0).await.unwrap();
	for row in &batch.rows {
		let (status, period) = recipient_status(&db, *row).await;
		assert_eq!(status.as_deref(), Some("PROCESSING"));
		assert_eq!(period.as_deref(), Some(current_period().as_str()));
	}
}

#[tokio::test]
async fn release_makes_rows_allocatable_again() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 5).await;
	let allocator = RecipientAllocator::new(db.clone());

	let first = allocator.get_batch_recipients(5, 0).await.unwrap();
	assert_eq!(first.len(), 5);

	// Pool is now fully locked
	let starved = allocator.get_batch_recipients(5, 1).await.unwrap();
	assert!(starved.is_empty());

	allocator.update_batch_status(&first.rows, None).await.unwrap();
	for row in &first.rows {
		assert_eq!(recipient_status(&db, *row).await, (None, None));
	}

	let second = allocator.get_batch_recipients(5, 1).await.unwrap();
	assert_eq!(second.len(), 5);
}

#[tokio::test]
async fn terminal_status_tags_current_period() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 6).await;
	let allocator = RecipientAllocator::new(db.clone());

	let batch = allocator.get_batch_recipients(3, 2).await.unwrap();
	allocator
		.update_batch_status(&batch.rows, Some(RecipientStatus::Used))
		.await
		.unwrap();

	for row in &batch.rows {
		let (status, period) = recipient_status(&db, *row).await;
		assert_eq!(status.as_deref(), Some("USED"));
		assert_eq!(period.as_deref(), Some(current_period().as_str()));
	}
	assert_eq!(allocator.used_count().await.unwrap(), 3);
}

#[tokio::test]
async fn stale_period_rows_are_reclaimed() {
	let (_dir, db) = temp_db().await;
	// Consumed, but in a past period
	for i in 0..4 {
		seed_recipient(
			&db,
			i + 2,
			&format!("old{}@pool.test", i),
			Some("USED"),
			Some("01-01"),
		)
		.await;
	}

	let allocator = RecipientAllocator::new(db.clone());
	let batch = allocator.get_batch_recipients(4, 0).await.unwrap();
	assert_eq!(batch.len(), 4);
}

#[tokio::test]
async fn empty_pool_returns_empty_batch() {
	let (_dir, db) = temp_db().await;
	let allocator = RecipientAllocator::new(db.clone());
	let batch = allocator.get_batch_recipients(30, 0).await.unwrap();
	assert!(batch.is_empty());
}

#[tokio::test]
async fn oversized_request_returns_partial_batch() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 7).await;
	let allocator = RecipientAllocator::new(db.clone());

	let batch = allocator.get_batch_recipients(30, 3).await.unwrap();
	assert_eq!(batch.len(), 7);

	let distinct: HashSet<i32> = batch.rows.iter().copied().collect();
	assert_eq!(distinct.len(), 7);
}

#[tokio::test]
async fn addresses_match_locked_rows() {
	let (_dir, db) = temp_db().await;
	seed_recipient_pool(&db, 20).await;
	let allocator = RecipientAllocator::new(db.clone());

	let batch = allocator.get_batch_recipients(5, 0).await.unwrap();
	assert_eq!(batch.addresses.len(), batch.rows.len());
	for (address, row) in batch.addresses.iter().zip(&batch.rows) {
		// Pool seeding maps row N to address r{N-2}@pool.test
		assert_eq!(address, &format!("r{}@pool.test", row - 2));
	}
}
