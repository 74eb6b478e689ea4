//! Date-to-commit resolution against the working copy's history.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use thiserror::Error;
use tracing::info;

use crate::git::{self, GitError};

/// A commit selected as "the repository state as of a calendar day".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub full_hash: String,
    pub short_hash: String,
    pub author_instant: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no commit found on {reference} at or before {cutoff} (target day {date})")]
    NoCommitFound {
        reference: String,
        date: NaiveDate,
        cutoff: DateTime<Utc>,
    },
    #[error("git query failed during commit resolution: {0}")]
    Git(#[from] GitError),
    #[error("unparseable author date {raw:?} on commit {commit}: {source}")]
    AuthorInstant {
        commit: String,
        raw: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Cutoff instant for a target day: start of day UTC plus one second, so a
/// commit made at exactly midnight still counts as that day's state.
pub fn cutoff_instant(date: NaiveDate) -> DateTime<Utc> {
    let cutoff = date.and_hms_opt(0, 0, 1).expect("00:00:01 exists on every day");
    Utc.from_utc_datetime(&cutoff)
}

/// Finds the last commit on `reference` at or before the cutoff for `date`.
///
/// The working copy's remote-tracking data must be refreshed before calling
/// this; the materialiser fetches first.
pub fn resolve(repo: &Path, reference: &str, date: NaiveDate) -> Result<ResolvedCommit, ResolveError> {
    let cutoff = cutoff_instant(date);
    let before_arg = format!("--before={}", cutoff.to_rfc3339());
    let listing = git::run(repo, &["rev-list", "--max-count=1", &before_arg, reference])?;
    if listing.is_empty() {
        return Err(ResolveError::NoCommitFound {
            reference: reference.to_string(),
            date,
            cutoff,
        });
    }
    let full_hash = listing.lines().next().unwrap_or(&listing).to_string();

    let short_hash = git::run(repo, &["rev-parse", "--short", &full_hash])?;
    let raw_instant = git::run(repo, &["show", "-s", "--format=%aI", &full_hash])?;
    let author_instant = DateTime::parse_from_rfc3339(&raw_instant)
        .map_err(|source| ResolveError::AuthorInstant {
            commit: full_hash.clone(),
            raw: raw_instant.clone(),
            source,
        })?
        .with_timezone(&Utc);

    info!(
        reference,
        date = %date,
        commit = %short_hash,
        author_instant = %author_instant,
        "Resolved commit for day"
    );

    Ok(ResolvedCommit {
        full_hash,
        short_hash,
        author_instant,
    })
}
