use std::env;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info};

pub const DEFAULT_REFERENCE: &str = "origin/main";
pub const DEFAULT_WORKDIR: &str = "./tmp/content-checkout";
pub const DEFAULT_START_DATE: &str = "2022-01-01";
pub const DEFAULT_REDIRECTS_FILE: &str = "files/_redirects.txt";

/// Runtime configuration, merged from environment variables.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Clone URL of the content repository.
    pub repo_url: String,
    /// Reference the daily snapshots are resolved against.
    pub reference: String,
    /// Reusable working-copy destination.
    pub workdir: PathBuf,
    /// Registry package the snapshots are published under.
    pub package_name: String,
    /// First calendar day to reconstruct.
    pub start_date: NaiveDate,
    /// Redirect source file, relative to the working copy root.
    pub redirects_file: PathBuf,
}

impl BackfillConfig {
    /// Reads configuration from the environment (the binary loads a `.env`
    /// file first, if present). `CONTENT_REPO_URL` and `CONTENT_PACKAGE` are
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let repo_url = match env::var("CONTENT_REPO_URL") {
            Ok(url) => url,
            Err(e) => {
                error!(error = ?e, "CONTENT_REPO_URL environment variable not set");
                return Err(anyhow::anyhow!(
                    "CONTENT_REPO_URL environment variable not set: {e}"
                ));
            }
        };

        let package_name = match env::var("CONTENT_PACKAGE") {
            Ok(name) => name,
            Err(e) => {
                error!(error = ?e, "CONTENT_PACKAGE environment variable not set");
                return Err(anyhow::anyhow!(
                    "CONTENT_PACKAGE environment variable not set: {e}"
                ));
            }
        };

        let reference = env::var("CONTENT_REF").unwrap_or_else(|_| DEFAULT_REFERENCE.to_string());
        let workdir = PathBuf::from(
            env::var("BACKFILL_WORKDIR").unwrap_or_else(|_| DEFAULT_WORKDIR.to_string()),
        );
        let redirects_file = PathBuf::from(
            env::var("REDIRECTS_FILE").unwrap_or_else(|_| DEFAULT_REDIRECTS_FILE.to_string()),
        );

        let raw_start =
            env::var("BACKFILL_START_DATE").unwrap_or_else(|_| DEFAULT_START_DATE.to_string());
        let start_date = match NaiveDate::parse_from_str(&raw_start, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                error!(error = ?e, raw = %raw_start, "BACKFILL_START_DATE must be YYYY-MM-DD");
                return Err(anyhow::anyhow!("BACKFILL_START_DATE must be YYYY-MM-DD: {e}"));
            }
        };

        Ok(Self {
            repo_url,
            reference,
            workdir,
            package_name,
            start_date,
            redirects_file,
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            repo_url = %self.repo_url,
            reference = %self.reference,
            workdir = %self.workdir.display(),
            package = %self.package_name,
            start_date = %self.start_date,
            redirects_file = %self.redirects_file.display(),
            "Loaded config"
        );
    }
}
