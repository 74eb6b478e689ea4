//! Release ledger: what has already been published, per the registry.

use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::contract::{LedgerError, PublishedReleaseSet, Registry};

/// npm `time` table keys that are bookkeeping, not version identifiers.
const NON_VERSION_KEYS: [&str; 2] = ["created", "modified"];

/// Registry client backed by the npm command-line tool.
pub struct NpmRegistry;

#[async_trait]
impl Registry for NpmRegistry {
    async fn release_times(&self, package: &str) -> Result<PublishedReleaseSet, LedgerError> {
        let out = Command::new("npm")
            .args(["view", package, "time", "--json"])
            .output()?;
        if !out.status.success() {
            return Err(LedgerError::CommandFailed {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let mut table: PublishedReleaseSet = serde_json::from_slice(&out.stdout)?;
        for key in NON_VERSION_KEYS {
            table.remove(key);
        }
        debug!(package, releases = table.len(), "Fetched published release times");
        Ok(table)
    }
}

/// Queries the ledger, degrading any failure to "nothing published yet".
///
/// Fail-open by policy: a first-ever publish must not be blocked by a
/// missing ledger, and a missed true duplicate is still rejected
/// registry-side at publish time.
pub async fn published_releases<R>(registry: &R, package: &str) -> PublishedReleaseSet
where
    R: Registry,
{
    match registry.release_times(package).await {
        Ok(releases) => releases,
        Err(e) => {
            warn!(package, error = %e, "[LEDGER] query failed, assuming nothing published");
            PublishedReleaseSet::new()
        }
    }
}
