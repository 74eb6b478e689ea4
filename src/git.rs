use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Failure invoking the `git` command-line tool.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to launch `git {args}`: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`git {args}` exited with {status}: {stderr}")]
    Failed {
        args: String,
        status: String,
        stderr: String,
    },
}

/// Runs `git` with the given arguments in `repo` and returns trimmed stdout.
///
/// stderr is captured onto the error so callers can surface diagnostics
/// without re-running the command.
pub fn run(repo: &Path, args: &[&str]) -> Result<String, GitError> {
    let rendered = args.join(" ");
    debug!(repo = %repo.display(), args = %rendered, "Running git");
    let out = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| GitError::Spawn {
            args: rendered.clone(),
            source: e,
        })?;
    if !out.status.success() {
        return Err(GitError::Failed {
            args: rendered,
            status: out.status.to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}
