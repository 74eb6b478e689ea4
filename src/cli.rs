use anyhow::Result;
use chrono::Utc;
use clap::{ArgAction, Parser};
use tracing::info;

use crate::backfill::{run_backfill, BackfillOptions};
use crate::config::BackfillConfig;
use crate::contract::Materialiser;
use crate::ledger::NpmRegistry;
use crate::materialise::GitMaterialiser;
use crate::publish::NpmPublisher;

/// CLI for inventory-backfill: reconstruct and publish one content-inventory
/// snapshot per day since the start date.
#[derive(Parser, Debug)]
#[clap(
    name = "inventory-backfill",
    version,
    about = "Reconstruct daily content snapshots and publish each as a versioned inventory package"
)]
pub struct Cli {
    /// Rehearse every step but skip the registry write (pass --dry-run=false
    /// to actually publish)
    #[clap(
        long,
        short = 'n',
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub dry_run: bool,

    /// Skip days whose snapshot is already published instead of aborting
    #[clap(long = "continue")]
    pub continue_on_duplicate: bool,

    /// Raise log detail (-v: debug, -vv: trace)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    info!("trace_initialised");

    let config = BackfillConfig::from_env()?;
    config.trace_loaded();

    let options = BackfillOptions {
        package_name: config.package_name.clone(),
        start_date: config.start_date,
        dry_run: cli.dry_run,
        continue_on_duplicate: cli.continue_on_duplicate,
    };

    let materialiser = GitMaterialiser::new(config.clone());
    let registry = NpmRegistry;
    let publisher = NpmPublisher::new(config.workdir.clone());

    println!("Backfill starting...");
    let report = run_backfill(&options, &materialiser, &registry, &publisher, Utc::now()).await?;
    println!("Backfill complete.\nReport:");
    println!("{:#?}", report);

    materialiser.clean_up().await?;
    Ok(())
}
