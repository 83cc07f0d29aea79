//! Deployment lifecycle status and transition rules.
//!
//! Status moves monotonically through
//! `QUEUED -> IN_PROGRESS -> { READY | FAIL }`. `READY` and `FAIL` are
//! terminal: once reached, no further transition is permitted. Replaying
//! an already-applied transition is a no-op, which is what makes
//! at-least-once delivery of the build log safe.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Deployment row created, build task not yet started.
    Queued,
    /// The build runner has started its pipeline.
    InProgress,
    /// The build completed and all artifacts are uploaded.
    Ready,
    /// The build pipeline failed.
    Fail,
}

impl DeploymentStatus {
    /// Get the status as its stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Ready => "READY",
            Self::Fail => "FAIL",
        }
    }

    /// Whether this status permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Fail)
    }

    /// The statuses a deployment may be in immediately before entering
    /// `target`.
    ///
    /// An empty slice means `target` is never entered via a transition
    /// (`QUEUED` is only ever an initial state).
    #[must_use]
    pub const fn allowed_predecessors(target: Self) -> &'static [Self] {
        match target {
            Self::Queued => &[],
            Self::InProgress => &[Self::Queued],
            Self::Ready | Self::Fail => &[Self::Queued, Self::InProgress],
        }
    }

    /// Whether a transition from `self` to `next` is permitted.
    ///
    /// Transitions out of a terminal state are never permitted, and a
    /// transition to the current status is not a transition at all.
    #[must_use]
    pub fn can_advance_to(&self, next: Self) -> bool {
        Self::allowed_predecessors(next).contains(self)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "READY" => Ok(Self::Ready),
            "FAIL" => Ok(Self::Fail),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognised status string.
#[derive(Debug, thiserror::Error)]
#[error("unknown deployment status: {0}")]
pub struct UnknownStatus(pub String);
