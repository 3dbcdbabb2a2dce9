//! Taskwheel scheduler daemon.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskwheel::config::Config;
use taskwheel::db::Database;
use taskwheel::scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskwheel", version, about = "Recurring-task scheduler daemon")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic recurrence scheduler.
    Serve,
    /// Run a single generation pass and exit.
    Tick,
    /// Archive or delete old completed instances for every template.
    Cleanup {
        /// How many completed instances to keep per template.
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(Config::resolve_path(cli.config))?;
    let db = Database::open(&config.database_path)?;

    match cli.command {
        Command::Serve => {
            let scheduler = Scheduler::new(db, config.scheduler);
            scheduler.run().await;
        }
        Command::Tick => {
            let scheduler = Scheduler::new(db, config.scheduler);
            let created = scheduler.tick().await;
            info!(created = created.len(), "tick complete");
        }
        Command::Cleanup { keep } => {
            let keep = keep.unwrap_or(config.keep_last_instances);
            let templates = db.list_recurring_templates()?;
            let mut archived = 0;
            let mut deleted = 0;
            for template in templates {
                let summary = db.cleanup_completed_instances(&template.id, keep)?;
                archived += summary.archived;
                deleted += summary.deleted;
            }
            info!(archived, deleted, "cleanup complete");
        }
    }

    Ok(())
}
