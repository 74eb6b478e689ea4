//! Historic publish driver: one day at a time from the start date to now.
//!
//! This module provides the top-level orchestration loop for reconstructing
//! and publishing one snapshot per calendar day. Per iteration it:
//!   - Builds the day's artifact via the [`Materialiser`]
//!   - Derives the candidate's identity (date-stamp, short hash, version)
//!   - Re-fetches the release ledger and checks for duplicates
//!   - Skips, aborts or publishes, then tears the working copy down
//!   - Advances by exactly one day
//!
//! # Responsibilities
//! - Strictly sequential, fail-fast orchestration: build failures abort the
//!   whole run; only duplicate detection can be downgraded to a skip
//! - Dry-run parity: a dry run executes build, identify and dedupe exactly
//!   like a real run, differing only in the final registry write
//! - Aggregates and returns a [`BackfillReport`] for downstream audit
//!
//! # Callable From
//! - The CLI crate and the integration tests (with mocked collaborators)
//!
//! # Error Handling
//! Every fatal error carries the in-progress day's identifying information
//! so an operator can decide whether to re-run with `--continue`.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::contract::{
    InventoryArtifact, MaterialiseError, Materialiser, PublishError, Publisher,
    PublishedReleaseSet, Registry,
};
use crate::ledger::published_releases;

/// Per-run knobs, fixed before the loop starts.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub package_name: String,
    pub start_date: NaiveDate,
    /// Rehearse everything, omit only the registry write.
    pub dry_run: bool,
    /// Skip already-published days instead of aborting on them.
    pub continue_on_duplicate: bool,
}

/// Identity of one day's candidate artifact, as compared against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactIdentity {
    /// The calendar day with separators removed, e.g. `20231005`.
    pub date_stamp: String,
    pub short_commit: String,
    pub version: String,
}

impl ArtifactIdentity {
    pub fn derive(artifact: &InventoryArtifact, date: NaiveDate) -> Self {
        Self {
            date_stamp: date.format("%Y%m%d").to_string(),
            short_commit: artifact.short_commit.clone(),
            version: artifact.version.clone(),
        }
    }
}

/// What happened to one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { dry_run: bool },
    SkippedDuplicate { existing: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub date: NaiveDate,
    pub version: String,
    pub short_commit: String,
    pub outcome: PublishOutcome,
}

/// Aggregated outcome of a completed run.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub days: Vec<DayReport>,
}

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error(transparent)]
    Materialise(#[from] MaterialiseError),
    #[error(
        "snapshot for {date} already published as {existing} (version {version}, commit {short_commit}); re-run with --continue to skip past it"
    )]
    DuplicateDetected {
        date: NaiveDate,
        version: String,
        short_commit: String,
        existing: String,
    },
    #[error("publish failed for {date} (version {version}): {source}")]
    Publish {
        date: NaiveDate,
        version: String,
        #[source]
        source: PublishError,
    },
}

/// Returns the first published version key containing the candidate's
/// date-stamp or short hash as a substring.
///
/// Raw containment can false-positive when a hash fragment coincidentally
/// appears in an unrelated version string; the default abort-on-match keeps
/// that failure mode loud.
pub fn duplicate_for<'a>(
    published: &'a PublishedReleaseSet,
    identity: &ArtifactIdentity,
) -> Option<&'a str> {
    published
        .keys()
        .find(|key| key.contains(&identity.date_stamp) || key.contains(&identity.short_commit))
        .map(String::as_str)
}

/// Drives the whole historic loop: one fully-torn-down iteration per
/// calendar day, `start_date` through `now`'s day inclusive.
///
/// The ledger is re-fetched every day; registry state may change between
/// iterations (e.g. manual publishes). `now` is injected so tests can pin
/// the loop's end.
pub async fn run_backfill<M, R, P>(
    options: &BackfillOptions,
    materialiser: &M,
    registry: &R,
    publisher: &P,
    now: DateTime<Utc>,
) -> Result<BackfillReport, BackfillError>
where
    M: Materialiser,
    R: Registry,
    P: Publisher,
{
    let last_day = now.date_naive();
    let mut report = BackfillReport::default();
    let mut day = options.start_date;

    info!(
        start = %options.start_date,
        until = %last_day,
        dry_run = options.dry_run,
        continue_on_duplicate = options.continue_on_duplicate,
        "[BACKFILL] Starting historic publish loop"
    );

    while day <= last_day {
        info!(date = %day, "[BACKFILL] Building snapshot");
        let artifact = match materialiser.materialise(day).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(date = %day, error = %e, "[BACKFILL][ERROR] Materialisation failed, aborting run");
                return Err(e.into());
            }
        };

        let identity = ArtifactIdentity::derive(&artifact, day);
        info!(
            date = %day,
            version = %identity.version,
            commit = %identity.short_commit,
            date_stamp = %identity.date_stamp,
            "[BACKFILL] Candidate identity"
        );

        let published = published_releases(registry, &options.package_name).await;

        if let Some(existing) = duplicate_for(&published, &identity) {
            if options.continue_on_duplicate {
                info!(date = %day, existing, "[BACKFILL] Already published, skipping day");
                report.days.push(DayReport {
                    date: day,
                    version: identity.version,
                    short_commit: identity.short_commit,
                    outcome: PublishOutcome::SkippedDuplicate {
                        existing: existing.to_string(),
                    },
                });
            } else {
                error!(date = %day, existing, "[BACKFILL][ERROR] Duplicate detected, aborting run");
                let duplicate = BackfillError::DuplicateDetected {
                    date: day,
                    version: identity.version,
                    short_commit: identity.short_commit,
                    existing: existing.to_string(),
                };
                if let Err(e) = materialiser.tear_down().await {
                    error!(error = %e, "[BACKFILL][ERROR] Teardown after abort failed");
                }
                return Err(duplicate);
            }
        } else {
            if let Err(source) = publisher.publish(&artifact, options.dry_run).await {
                error!(date = %day, error = %source, "[BACKFILL][ERROR] Publish failed, aborting run");
                return Err(BackfillError::Publish {
                    date: day,
                    version: identity.version,
                    source,
                });
            }
            info!(
                date = %day,
                version = %identity.version,
                dry_run = options.dry_run,
                "[BACKFILL] Published snapshot"
            );
            report.days.push(DayReport {
                date: day,
                version: identity.version,
                short_commit: identity.short_commit,
                outcome: PublishOutcome::Published {
                    dry_run: options.dry_run,
                },
            });
        }

        materialiser.tear_down().await?;

        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    info!(days = report.days.len(), "[BACKFILL] Historic publish loop complete");
    Ok(report)
}
