//! Application configuration

mod app_config;
mod migration;

pub use app_config::AppConfig;
pub use migration::Migrate;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables for the dispatch pool and the send loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
	/// Parallel worker tasks (one client session each)
	pub workers: usize,

	/// Random delay range between worker launches, in seconds
	pub stagger_secs: (u64, u64),

	/// Recipients per batch, drawn per round
	pub batch_size: (usize, usize),

	/// Send rounds per account, drawn per account
	pub rounds: (u32, u32),

	/// Retry passes over still-pending accounts after the first wave
	pub retry_passes: u32,

	/// Fixed To address; actual recipients ride in BCC
	pub to_address: String,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			workers: 4,
			stagger_secs: (2, 5),
			batch_size: (40, 45),
			rounds: (18, 20),
			retry_passes: 3,
			to_address: String::new(),
		}
	}
}

/// Default data directory under the platform's data dir.
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
	let base = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("no platform data directory"))?;
	Ok(base.join("mailrun"))
}
