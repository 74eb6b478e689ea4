use anyhow::Result;
use clap::Parser;

use inventory_backfill::cli::{init_tracing, run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("[ERROR] Backfill failed: {e:#}");
            std::process::exit(1);
        }
    }
}
