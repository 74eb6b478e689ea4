//! # contract: interfaces between the backfill driver and its collaborators
//!
//! This module defines the artifact data types, the error taxonomy shared
//! across the pipeline, and the three traits the driver is generic over:
//!
//! - [`Materialiser`] builds one day's snapshot artifact from the content
//!   repository (working-copy lifecycle included).
//! - [`Registry`] is the read-only fetch capability for the release ledger.
//! - [`Publisher`] performs the final, registry-visible publish step.
//!
//! All three are annotated for `mockall` (under `test` or the
//! `test-export-mocks` feature) so integration tests can drive the whole
//! historic loop with deterministic mocks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::redirects::{self, RedirectTable};
pub use crate::resolve::{ResolveError, ResolvedCommit};

/// Everything extracted from one day's checked-out snapshot.
///
/// Built fresh per day and discarded after that day's publish decision; the
/// working copy it came from is reusable, the artifact is not.
#[derive(Debug, Clone)]
pub struct InventoryArtifact {
    /// Semantic version string from the build-output package descriptor.
    pub version: String,
    /// Short commit hash stamped into the build-output metadata file.
    pub short_commit: String,
    /// Commit the snapshot was built from, per the resolver's git queries.
    pub commit: ResolvedCommit,
    /// Inventory document emitted by the extraction subprocess.
    pub inventory: serde_json::Value,
    /// Raw redirect source text, parsed on demand by [`redirects()`].
    ///
    /// [`redirects()`]: InventoryArtifact::redirects
    pub redirects_source: String,
}

impl InventoryArtifact {
    /// Parses the redirect table from the captured raw text. Not all callers
    /// need the table, so the raw text is kept and parsed lazily.
    pub fn redirects(&self) -> RedirectTable {
        redirects::parse(&self.redirects_source)
    }
}

/// Published version identifier -> publish timestamp, as reported by the
/// registry at query time.
pub type PublishedReleaseSet = BTreeMap<String, String>;

/// Failure of one stage of the materialisation pipeline. All variants are
/// fatal to the current day's attempt; no partial artifact is ever returned.
#[derive(Debug, Error)]
pub enum MaterialiseError {
    #[error("failed to clone {repo_url} into {dest}: {detail}")]
    Clone {
        repo_url: String,
        dest: String,
        detail: String,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to check out {commit}: {detail}")]
    Checkout { commit: String, detail: String },
    #[error("failed to read redirect source {path}: {source}")]
    RedirectSource {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dependency install failed: {stderr}")]
    DependencyInstall { stderr: String },
    #[error("extraction failed ({detail}): {stderr}")]
    Extraction { detail: String, stderr: String },
    #[error("extraction output is not a valid inventory document: {source}")]
    InventoryParse {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read build output {path}: {detail}")]
    BuildOutput { path: String, detail: String },
    #[error("failed to clean working copy: {detail}")]
    CleanUp { detail: String },
}

/// Failure querying the release ledger. Never reaches the driver: the
/// fail-open wrapper in [`crate::ledger`] degrades it to an empty set.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to launch registry query: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("registry query exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("registry response is not a valid release table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of the final publish step.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to launch publish step: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("publish step exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
}

/// Builds one day's snapshot artifact from the content repository.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Materialiser: Send + Sync {
    /// Clone-or-reuse the working copy, check out the day's commit, install
    /// its declared dependencies and run the extraction build. Any stage
    /// failure is fatal for the day.
    async fn materialise(&self, date: NaiveDate) -> Result<InventoryArtifact, MaterialiseError>;

    /// Discards the day's build state from the working copy. Invoked once
    /// per iteration regardless of the publish decision.
    async fn tear_down(&self) -> Result<(), MaterialiseError>;

    /// Forcibly and recursively removes the working copy. Never invoked
    /// implicitly; callers decide when the resource is done.
    async fn clean_up(&self) -> Result<(), MaterialiseError>;
}

/// Read-only fetch capability for the registry's published releases.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetches the per-version publish-time table for `package`.
    async fn release_times(&self, package: &str) -> Result<PublishedReleaseSet, LedgerError>;
}

/// Performs the final publish step for a built artifact.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes the artifact. With `dry_run`, the full packaging rehearsal
    /// still runs; only the registry write is omitted.
    async fn publish(&self, artifact: &InventoryArtifact, dry_run: bool) -> Result<(), PublishError>;
}
