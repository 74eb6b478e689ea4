//! Final publish step: hands the built package to the registry via npm.

use std::path::PathBuf;
use std::process::Command;

use async_trait::async_trait;
use tracing::info;

use crate::contract::{InventoryArtifact, PublishError, Publisher};

/// npm script performing the registry write.
const PUBLISH_SCRIPT: &str = "release";
/// npm script rehearsing the publish without the registry write.
const DRY_RUN_PUBLISH_SCRIPT: &str = "release:dry";

/// Publisher that runs the content repository's publish scripts in the
/// working copy.
pub struct NpmPublisher {
    workdir: PathBuf,
}

impl NpmPublisher {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Publisher for NpmPublisher {
    async fn publish(&self, artifact: &InventoryArtifact, dry_run: bool) -> Result<(), PublishError> {
        let script = if dry_run { DRY_RUN_PUBLISH_SCRIPT } else { PUBLISH_SCRIPT };
        let out = Command::new("npm")
            .args(["run", "--silent", script])
            .current_dir(&self.workdir)
            .output()?;
        if !out.status.success() {
            return Err(PublishError::CommandFailed {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        info!(
            version = %artifact.version,
            commit = %artifact.short_commit,
            dry_run,
            "Publish step succeeded"
        );
        Ok(())
    }
}
