//! Error types for the build runner.

use crate::git::GitError;

/// Result type alias using [`RunnerError`].
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running a build pipeline.
///
/// Every variant reaching the top of the pipeline is converted into a
/// single failure-sentinel log line; none of them crash the process
/// silently.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration could not be loaded from the environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cloning the project repository failed.
    #[error("source checkout failed: {0}")]
    Git(#[from] GitError),

    /// A build step exited with a nonzero status.
    #[error("{step} step exited with code {code}")]
    StepFailed {
        /// Step label ("install" or "build").
        step: &'static str,
        /// Exit code reported by the subprocess.
        code: i32,
    },

    /// A build step could not be spawned or waited on.
    #[error("{step} step could not run: {source}")]
    StepIo {
        /// Step label ("install" or "build").
        step: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The build output directory is missing or unreadable.
    #[error("build output missing at {path}: {reason}")]
    OutputMissing {
        /// Expected output directory.
        path: String,
        /// Why it could not be used.
        reason: String,
    },

    /// Uploading an artifact file failed.
    #[error("upload failed for '{key}': {reason}")]
    Upload {
        /// Object key that failed.
        key: String,
        /// Underlying error.
        reason: String,
    },

    /// Other I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
