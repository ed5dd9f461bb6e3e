//! Mailrun Core
//!
//! Allocation and state-synchronization engine for bulk outbound mail: a
//! sender account registry with worker-queue partitioning, a collision-
//! avoiding recipient batch allocator, and a sync coordinator reconciling the
//! session database with the durable ledger files across daily rollovers.
//!
//! The UI-automation layer that actually drives a mail client is not part of
//! this crate; it plugs in behind [`dispatch::MailClient`].

pub mod accounts;
pub mod config;
pub mod dispatch;
pub mod infrastructure;
pub mod ledger;
pub mod recipients;

use crate::accounts::AccountRegistry;
use crate::config::AppConfig;
use crate::dispatch::{ContentSource, DispatchPool, DispatchSummary, MailClientFactory};
use crate::infrastructure::database::Database;
use crate::ledger::{SyncCoordinator, SyncOptions};
use crate::recipients::RecipientAllocator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The assembled engine: one database handle injected into every component.
pub struct Core {
	config: AppConfig,
	db: Arc<Database>,
	accounts: Arc<AccountRegistry>,
	recipients: Arc<RecipientAllocator>,
	sync: SyncCoordinator,
}

impl Core {
	/// Initialize from the config in `data_dir` (or the default location).
	pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
		let config = match data_dir {
			Some(dir) => AppConfig::load_from(&dir)?,
			None => AppConfig::load()?,
		};
		Self::with_config(config).await
	}

	/// Assemble the engine around an explicit configuration.
	pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
		info!("Initializing mailrun core");

		let db = Arc::new(Database::create(&config.database_path()).await?);

		let accounts = Arc::new(AccountRegistry::new(db.clone()));
		let recipients = Arc::new(RecipientAllocator::new(db.clone()));

		let mut sync_options =
			SyncOptions::new(config.sender_ledger.clone(), config.recipient_ledger.clone());
		sync_options.rollover_keep = config.rollover_keep.clone();
		let sync = SyncCoordinator::new(db.clone(), sync_options);

		Ok(Self {
			config,
			db,
			accounts,
			recipients,
			sync,
		})
	}

	pub fn config(&self) -> &AppConfig {
		&self.config
	}

	pub fn db(&self) -> &Arc<Database> {
		&self.db
	}

	pub fn accounts(&self) -> &Arc<AccountRegistry> {
		&self.accounts
	}

	pub fn recipients(&self) -> &Arc<RecipientAllocator> {
		&self.recipients
	}

	pub fn sync(&self) -> &SyncCoordinator {
		&self.sync
	}

	/// Build a dispatch pool over this engine with the given client factory
	/// and content source.
	pub fn dispatch_pool(
		&self,
		factory: Arc<dyn MailClientFactory>,
		content: Arc<dyn ContentSource>,
	) -> DispatchPool {
		DispatchPool::new(
			self.accounts.clone(),
			self.recipients.clone(),
			factory,
			content,
			self.config.dispatch.clone(),
		)
	}

	/// Full session: import the ledgers, run the dispatch pool, export the
	/// results back.
	pub async fn run_session(
		&self,
		factory: Arc<dyn MailClientFactory>,
		content: Arc<dyn ContentSource>,
	) -> anyhow::Result<DispatchSummary> {
		self.sync.import().await?;
		let summary = self.dispatch_pool(factory, content).run().await?;
		self.sync.export().await?;
		Ok(summary)
	}
}
