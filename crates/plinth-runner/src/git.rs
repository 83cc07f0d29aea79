//! Git repository cloning for the build runner.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

/// Convert SSH-style git URLs to HTTPS URLs.
///
/// Examples:
/// - `git@github.com:user/repo.git` -> `https://github.com/user/repo.git`
/// - `ssh://git@github.com/user/repo.git` -> `https://github.com/user/repo.git`
/// - `https://github.com/user/repo.git` -> unchanged
fn ssh_to_https(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("git@") {
        if let Some(colon_pos) = rest.find(':') {
            let host = &rest[..colon_pos];
            let path = &rest[colon_pos + 1..];
            return format!("https://{host}/{path}");
        }
    }

    if let Some(rest) = url.strip_prefix("ssh://git@") {
        return format!("https://{rest}");
    }

    url.to_owned()
}

/// Error type for git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git clone failed: {0}")]
    CloneFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Clone a git repository to the target directory.
///
/// A shallow single-branch clone of the repository's default branch; a
/// runner builds exactly one revision and never fetches again.
pub async fn clone_repository(repo_url: &str, target_dir: &Path) -> Result<(), GitError> {
    let https_url = ssh_to_https(repo_url);

    info!(repo = %https_url, target = %target_dir.display(), "Cloning repository");

    tokio::fs::create_dir_all(target_dir).await?;

    let mut cmd = Command::new("git");
    cmd.arg("-c")
        .arg(format!("safe.directory={}", target_dir.display()))
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg("--single-branch")
        .arg(&https_url)
        .arg(target_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = ?cmd, "Running git clone");

    let output = cmd.output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CloneFailed(stderr.to_string()));
    }

    info!("Repository cloned successfully");
    Ok(())
}
