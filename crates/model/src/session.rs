//! Observable state of a render attempt.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stillmotion_common::error::FailureKind;

/// Highest percentage reported while the engine is still running.
///
/// 100 is reserved for the Completed transition, after the output file has
/// been moved to its final location.
pub const RUNNING_PROGRESS_CAP: f64 = 99.0;

/// Lifecycle state of an encode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    /// No attempt started yet.
    #[default]
    Idle,
    /// Creating the workspace and staging images.
    Preparing,
    /// The encoding engine is running.
    Running,
    /// Output persisted.
    Completed,
    /// Stopped at the caller's request.
    Cancelled,
    /// An error terminated the attempt.
    Failed,
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Preparing or Running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparing | Self::Running)
    }

    /// Short status line for front ends.
    pub fn message(self) -> &'static str {
        match self {
            Self::Idle => "Starting...",
            Self::Preparing => "Preparing images...",
            Self::Running => "Creating your video...",
            Self::Completed => "Video created successfully!",
            Self::Cancelled => "Rendering cancelled",
            Self::Failed => "An error occurred",
        }
    }
}

/// Mutable run-time record of the current (or last) render attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Monotonic attempt counter, 0 before the first start.
    pub attempt: u64,

    pub status: RenderStatus,

    /// Percentage in `[0, 100]`.
    pub progress: f64,

    /// Persisted video, set only once Completed.
    pub output_path: Option<PathBuf>,

    /// Short diagnostic, set only once Failed.
    pub error: Option<String>,

    pub failure_kind: Option<FailureKind>,

    /// Cancellation was requested for this attempt.
    pub cancel_requested: bool,
}

impl SessionSnapshot {
    /// Fresh record for a new attempt, already in Preparing.
    pub fn preparing(attempt: u64) -> Self {
        Self {
            attempt,
            status: RenderStatus::Preparing,
            ..Self::default()
        }
    }
}

/// Percentage reported for `elapsed_secs` of encoded output.
///
/// Clamped to `[0, 99]`; a non-positive expected duration reports 0.
pub fn progress_percent(elapsed_secs: f64, expected_duration_secs: f64) -> f64 {
    if expected_duration_secs <= 0.0 || !elapsed_secs.is_finite() {
        return 0.0;
    }
    let percent = elapsed_secs / expected_duration_secs * 100.0;
    percent.clamp(0.0, RUNNING_PROGRESS_CAP)
}
