//! Sentinel log lines that drive deployment status transitions.
//!
//! The build runner and the log pipeline consumer are deployed
//! independently, so the control signals between them are defined in one
//! place. A sentinel is an ordinary log line whose text the consumer
//! recognises; every other line is persisted and otherwise ignored.
//!
//! Matching is case-insensitive. The start and success sentinels match on
//! the whole line; a failure sentinel is any line that starts with
//! `ERROR:` and mentions `pipeline failed`.

use crate::status::DeploymentStatus;

/// Emitted once when the runner begins its pipeline.
pub const START_LINE: &str = "INFO: Starting build pipeline...";

/// Emitted once after every artifact upload has completed.
pub const SUCCESS_LINE: &str = "INFO: Pipeline completed successfully.";

/// Prefix of a failure sentinel line (compared case-insensitively).
pub const FAILURE_PREFIX: &str = "error:";

/// Substring a failure sentinel line must contain (case-insensitive).
pub const FAILURE_MARKER: &str = "pipeline failed";

/// Build the single failure line the runner emits for a failed pipeline.
#[must_use]
pub fn failure_line(reason: &str) -> String {
    format!("ERROR: build pipeline failed: {reason}")
}

/// A control signal recognised in the build-log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// The build pipeline has started.
    Start,
    /// The pipeline completed and all artifacts are uploaded.
    Success,
    /// The pipeline failed.
    Failure,
}

impl Sentinel {
    /// Detect whether a log line is a sentinel.
    ///
    /// Returns `None` for every ordinary log line.
    #[must_use]
    pub fn detect(line: &str) -> Option<Self> {
        let lower = line.to_lowercase();

        if lower == START_LINE.to_lowercase() {
            return Some(Self::Start);
        }
        if lower == SUCCESS_LINE.to_lowercase() {
            return Some(Self::Success);
        }
        if lower.starts_with(FAILURE_PREFIX) && lower.contains(FAILURE_MARKER) {
            return Some(Self::Failure);
        }

        None
    }

    /// The deployment status this sentinel moves a deployment towards.
    #[must_use]
    pub const fn target_status(&self) -> DeploymentStatus {
        match self {
            Self::Start => DeploymentStatus::InProgress,
            Self::Success => DeploymentStatus::Ready,
            Self::Failure => DeploymentStatus::Fail,
        }
    }
}
