//! Parallel dispatch over disjoint sender queues
//!
//! Queue partitioning happens once, from a single snapshot, before any worker
//! starts; after that workers only meet each other inside the recipient
//! allocator's critical section. Retry passes re-split whatever is still
//! eligible after the first wave.

use crate::accounts::AccountRegistry;
use crate::config::DispatchConfig;
use crate::dispatch::{AccountWorker, ContentSource, DispatchError, MailClientFactory};
use crate::recipients::RecipientAllocator;
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// End-of-session accounting, straight from the status projections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
	pub used: Vec<String>,
	pub limit_reached: Vec<String>,
	pub failed: Vec<String>,
	pub not_logged_in: Vec<String>,
	pub blocked: Vec<String>,
	pub used_recipients: u64,
}

pub struct DispatchPool {
	registry: Arc<AccountRegistry>,
	allocator: Arc<RecipientAllocator>,
	factory: Arc<dyn MailClientFactory>,
	content: Arc<dyn ContentSource>,
	config: DispatchConfig,
}

impl DispatchPool {
	pub fn new(
		registry: Arc<AccountRegistry>,
		allocator: Arc<RecipientAllocator>,
		factory: Arc<dyn MailClientFactory>,
		content: Arc<dyn ContentSource>,
		config: DispatchConfig,
	) -> Self {
		Self {
			registry,
			allocator,
			factory,
			content,
			config,
		}
	}

	/// Run the full session: first wave over all eligible accounts, then
	/// bounded retry passes over whatever is still pending.
	pub async fn run(&self) -> Result<DispatchSummary, DispatchError> {
		let queues = self.registry.create_queues(self.config.workers).await?;
		self.run_wave(queues, false).await?;

		for pass in 0..self.config.retry_passes {
			let pending = self.registry.get_pending_rows().await?;
			if pending.is_empty() {
				info!("no pending accounts left, retry loop clean");
				break;
			}
			info!(
				pass = pass + 1,
				of = self.config.retry_passes,
				accounts = pending.len(),
				"starting retry pass"
			);

			let mut queues = vec![Vec::new(); self.config.workers.max(1)];
			let queue_count = queues.len();
			for (i, row) in pending.into_iter().enumerate() {
				queues[i % queue_count].push(row);
			}
			self.run_wave(queues, true).await?;
		}

		self.summary().await
	}

	/// Launch one task per non-empty queue, staggered so the client sessions
	/// do not all come up at once, and wait for all of them.
	async fn run_wave(&self, queues: Vec<Vec<i32>>, is_retry: bool) -> Result<(), DispatchError> {
		let mut tasks = Vec::new();

		for (worker_id, queue) in queues.into_iter().enumerate() {
			if queue.is_empty() {
				continue;
			}
			if !tasks.is_empty() {
				let (min, max) = self.config.stagger_secs;
				let delay = {
					let mut rng = rand::thread_rng();
					rng.gen_range(min..=max)
				};
				tokio::time::sleep(Duration::from_secs(delay)).await;
			}

			let worker = AccountWorker::new(
				self.registry.clone(),
				self.allocator.clone(),
				self.content.clone(),
				self.config.clone(),
			);
			let registry = self.registry.clone();
			let factory = self.factory.clone();

			tasks.push(tokio::spawn(async move {
				info!(worker_id, accounts = queue.len(), "worker starting");
				for row in queue {
					// Fresh client per account so no session state bleeds over
					let mut client = match factory.connect(worker_id).await {
						Ok(client) => client,
						Err(e) => {
							error!(worker_id, row, error = %e, "failed to start client, skipping account");
							continue;
						}
					};

					let outcome = worker.process_account(client.as_mut(), row).await?;
					if is_retry && !outcome.is_success() {
						warn!(worker_id, row, ?outcome, "retry failed, marking account FAILED");
						registry.mark_failed(row).await?;
					}
				}
				info!(worker_id, "worker finished queue");
				Ok::<(), DispatchError>(())
			}));
		}

		for joined in join_all(tasks).await {
			match joined {
				Ok(Ok(())) => {}
				Ok(Err(e)) => return Err(e),
				Err(e) => error!(error = %e, "worker task panicked"),
			}
		}
		Ok(())
	}

	/// Status projections for the end-of-session report.
	pub async fn summary(&self) -> Result<DispatchSummary, DispatchError> {
		Ok(DispatchSummary {
			used: self.registry.get_used_accounts().await?,
			limit_reached: self.registry.get_limit_reached_accounts().await?,
			failed: self.registry.get_failed_accounts().await?,
			not_logged_in: self.registry.get_not_logged_in_accounts().await?,
			blocked: self.registry.get_blocked_accounts().await?,
			used_recipients: self.allocator.used_count().await?,
		})
	}
}
