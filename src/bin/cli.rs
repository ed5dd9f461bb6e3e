//! mailrun command line interface

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use mailrun_core::config::AppConfig;
use mailrun_core::Core;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailrun", version, about = "Bulk mail dispatch allocation engine")]
struct Cli {
	/// Data directory holding the config, ledgers and session database
	#[arg(long, global = true, env = "MAILRUN_DATA_DIR")]
	data_dir: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Reconcile the ledger files with the session store
	Sync {
		#[command(subcommand)]
		direction: SyncCommands,
	},
	/// Show the account and recipient status summary
	Report,
	/// Preview how eligible accounts would split across workers
	Plan {
		/// Number of parallel workers
		#[arg(short, long)]
		workers: Option<usize>,
	},
}

#[derive(Subcommand)]
enum SyncCommands {
	/// Ledger -> store, applying the daily rollover
	Import,
	/// Store -> ledger
	Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let config = match &cli.data_dir {
		Some(dir) => AppConfig::load_from(dir)?,
		None => AppConfig::load()?,
	};

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let core = Core::with_config(config).await?;

	match cli.command {
		Commands::Sync { direction } => match direction {
			SyncCommands::Import => {
				let report = core.sync().import().await?;
				println!(
					"Imported {} senders, {} recipients{}",
					report.senders,
					report.recipients,
					if report.sender_rollover || report.recipient_rollover {
						" (period rollover applied)"
					} else {
						""
					}
				);
			}
			SyncCommands::Export => {
				core.sync().export().await?;
				println!("Export complete");
			}
		},
		Commands::Report => {
			print_report(&core).await?;
		}
		Commands::Plan { workers } => {
			let n = workers.unwrap_or(core.config().dispatch.workers);
			let queues = core.accounts().create_queues(n).await?;
			for (i, queue) in queues.iter().enumerate() {
				println!(
					"worker {}: {} accounts {:?}",
					(i + 1).bold(),
					queue.len(),
					queue
				);
			}
			let total: usize = queues.iter().map(Vec::len).sum();
			println!("{} eligible accounts across {} workers", total, n);
		}
	}

	Ok(())
}

async fn print_report(core: &Core) -> anyhow::Result<()> {
	let accounts = core.accounts();

	let used = accounts.get_used_accounts().await?;
	let limit = accounts.get_limit_reached_accounts().await?;
	let failed = accounts.get_failed_accounts().await?;
	let not_logged_in = accounts.get_not_logged_in_accounts().await?;
	let blocked = accounts.get_blocked_accounts().await?;
	let used_recipients = core.recipients().used_count().await?;

	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_header(vec!["Status", "Accounts"]);
	table.add_row(vec![Cell::new("Used"), Cell::new(used.len())]);
	table.add_row(vec![Cell::new("Limit reached"), Cell::new(limit.len())]);
	table.add_row(vec![Cell::new("Failed"), Cell::new(failed.len())]);
	table.add_row(vec![Cell::new("Not logged in"), Cell::new(not_logged_in.len())]);
	table.add_row(vec![Cell::new("Blocked"), Cell::new(blocked.len())]);
	println!("{table}");

	for (label, emails) in [
		("Used", &used),
		("Failed", &failed),
		("Blocked", &blocked),
		("Not logged in", &not_logged_in),
	] {
		if emails.is_empty() {
			continue;
		}
		println!("{}:", label.bold());
		for email in emails {
			println!("  - {email}");
		}
	}

	println!("Total used recipients: {}", used_recipients.green());
	Ok(())
}
