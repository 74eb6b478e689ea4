pub mod backfill;
pub mod cli;
pub mod config;
pub mod contract;
pub mod git;
pub mod ledger;
pub mod materialise;
pub mod publish;
pub mod redirects;
pub mod resolve;

pub use cli::{run, Cli};
