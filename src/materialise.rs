//! Snapshot materialisation: working-copy lifecycle plus the extraction
//! pipeline that turns a checked-out commit into an [`InventoryArtifact`].
//!
//! The working copy is an explicit, reusable resource owned by
//! [`GitMaterialiser`]: cloned once, then fetched and force-checked-out
//! fresh for every day. Each stage is a scoped external-process invocation
//! with no retries; a failing stage propagates immediately and no partial
//! artifact is ever returned.

use std::fs;
use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::BackfillConfig;
use crate::contract::{InventoryArtifact, MaterialiseError, Materialiser};
use crate::git;
use crate::resolve::{self, ResolvedCommit};

/// Directory inside the working copy the build script writes its package to.
const BUILD_OUTPUT_DIR: &str = "package";
/// npm script that builds the inventory for a given day.
const BUILD_SCRIPT: &str = "build";

/// Build-output package descriptor; only the version is consumed.
#[derive(Debug, Deserialize)]
struct PackageDescriptor {
    version: String,
}

/// Build-output metadata file; only the stamped commit is consumed.
#[derive(Debug, Deserialize)]
struct BuildMetadata {
    commit: CommitStamp,
}

#[derive(Debug, Deserialize)]
struct CommitStamp {
    short: String,
}

/// Materialiser backed by a real git working copy and the npm toolchain.
///
/// Not safe for two concurrent instances sharing the same working-copy path;
/// the driver guarantees strict sequencing.
pub struct GitMaterialiser {
    config: BackfillConfig,
}

impl GitMaterialiser {
    pub fn new(config: BackfillConfig) -> Self {
        Self { config }
    }

    fn workdir(&self) -> &Path {
        &self.config.workdir
    }

    /// Clones the content repository unless the destination already holds a
    /// valid repository (idempotent setup). A destination that exists but is
    /// not a repository is removed and re-cloned.
    fn ensure_working_copy(&self) -> Result<(), MaterialiseError> {
        let dest = self.workdir();
        if git::run(dest, &["rev-parse", "--git-dir"]).is_ok() {
            debug!(path = %dest.display(), "Reusing existing working copy");
            return Ok(());
        }

        let clone_error = |detail: String| MaterialiseError::Clone {
            repo_url: self.config.repo_url.clone(),
            dest: dest.display().to_string(),
            detail,
        };

        if dest.exists() {
            fs::remove_dir_all(dest)
                .map_err(|e| clone_error(format!("failed to remove invalid working copy: {e}")))?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| clone_error(format!("failed to create {}: {e}", parent.display())))?;
        }

        let dest_str = dest.display().to_string();
        git::run(Path::new("."), &["clone", &self.config.repo_url, &dest_str])
            .map_err(|e| clone_error(e.to_string()))?;
        info!(repo_url = %self.config.repo_url, path = %dest.display(), "Cloned content repository");
        Ok(())
    }

    /// Refreshes remote-tracking data, resolves the day's commit and forces
    /// a detached checkout of it, discarding local modifications.
    fn check_out_day(&self, date: NaiveDate) -> Result<ResolvedCommit, MaterialiseError> {
        let dest = self.workdir();
        git::run(dest, &["fetch", "--tags", "origin"]).map_err(|e| MaterialiseError::Checkout {
            commit: self.config.reference.clone(),
            detail: format!("fetch failed: {e}"),
        })?;

        let commit = resolve::resolve(dest, &self.config.reference, date)?;

        git::run(dest, &["switch", "--force", "--detach", &commit.full_hash]).map_err(|e| {
            MaterialiseError::Checkout {
                commit: commit.short_hash.clone(),
                detail: e.to_string(),
            }
        })?;
        info!(date = %date, commit = %commit.short_hash, "Checked out snapshot commit");
        Ok(commit)
    }

    /// Installs the commit's declared dependencies in CI mode, ignoring any
    /// developer-only setup.
    fn install_dependencies(&self) -> Result<(), MaterialiseError> {
        let out = Command::new("npm")
            .arg("ci")
            .current_dir(self.workdir())
            .output()
            .map_err(|e| MaterialiseError::DependencyInstall {
                stderr: format!("failed to launch npm ci: {e}"),
            })?;
        if !out.status.success() {
            return Err(MaterialiseError::DependencyInstall {
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        debug!("Installed snapshot dependencies");
        Ok(())
    }

    /// Runs the extraction build, capturing stdout and stderr as whole
    /// buffers; the inventory JSON may span many lines.
    async fn run_extraction(&self, date: NaiveDate) -> Result<String, MaterialiseError> {
        let date_arg = format!("--date={}", date.format("%Y-%m-%d"));
        let out = tokio::process::Command::new("npm")
            .args(["run", "--silent", BUILD_SCRIPT, "--", &date_arg])
            .current_dir(self.workdir())
            .output()
            .await
            .map_err(|e| MaterialiseError::Extraction {
                detail: "failed to launch extraction build".to_string(),
                stderr: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(MaterialiseError::Extraction {
                detail: format!("extraction build exited with {}", out.status),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// Reads the build-output package descriptor (version) and metadata file
    /// (short commit hash, nested under `commit`).
    fn read_build_output(&self) -> Result<(String, String), MaterialiseError> {
        let dir = self.workdir().join(BUILD_OUTPUT_DIR);
        let descriptor: PackageDescriptor = read_json(&dir.join("package.json"))?;
        let metadata: BuildMetadata = read_json(&dir.join("metadata.json"))?;
        Ok((descriptor.version, metadata.commit.short))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MaterialiseError> {
    let raw = fs::read_to_string(path).map_err(|e| MaterialiseError::BuildOutput {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| MaterialiseError::BuildOutput {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

#[async_trait]
impl Materialiser for GitMaterialiser {
    async fn materialise(&self, date: NaiveDate) -> Result<InventoryArtifact, MaterialiseError> {
        self.ensure_working_copy()?;
        let commit = self.check_out_day(date)?;

        let redirects_path = self.workdir().join(&self.config.redirects_file);
        let redirects_source =
            fs::read_to_string(&redirects_path).map_err(|source| MaterialiseError::RedirectSource {
                path: redirects_path.display().to_string(),
                source,
            })?;

        self.install_dependencies()?;
        let stdout = self.run_extraction(date).await?;
        let inventory: serde_json::Value =
            serde_json::from_str(&stdout).map_err(|source| MaterialiseError::InventoryParse { source })?;
        let (version, short_commit) = self.read_build_output()?;

        info!(
            date = %date,
            version = %version,
            commit = %short_commit,
            "Materialised snapshot artifact"
        );
        Ok(InventoryArtifact {
            version,
            short_commit,
            commit,
            inventory,
            redirects_source,
        })
    }

    async fn tear_down(&self) -> Result<(), MaterialiseError> {
        let dest = self.workdir();
        git::run(dest, &["reset", "--hard"])
            .map_err(|e| MaterialiseError::CleanUp { detail: e.to_string() })?;
        git::run(dest, &["clean", "-fdx"])
            .map_err(|e| MaterialiseError::CleanUp { detail: e.to_string() })?;
        debug!(path = %dest.display(), "Cleaned working copy after iteration");
        Ok(())
    }

    async fn clean_up(&self) -> Result<(), MaterialiseError> {
        let dest = self.workdir();
        if !dest.exists() {
            return Ok(());
        }
        fs::remove_dir_all(dest).map_err(|e| MaterialiseError::CleanUp {
            detail: format!("failed to remove {}: {e}", dest.display()),
        })?;
        info!(path = %dest.display(), "Removed working copy");
        Ok(())
    }
}
