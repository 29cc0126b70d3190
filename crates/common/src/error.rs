//! Error types shared across Stillmotion crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for Stillmotion operations.
#[derive(Debug, thiserror::Error)]
pub enum StillmotionError {
    #[error("Preparation failed: {message}")]
    Preparation { message: String },

    #[error("Encoding failed: {message}")]
    Invocation { message: String },

    #[error("{message}")]
    Unexpected { message: String },

    #[error("Workspace error: {message}")]
    Workspace { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using StillmotionError.
pub type StillmotionResult<T> = Result<T, StillmotionError>;

/// Failure categories reported to callers through the error channel.
///
/// Cancellation is not a failure and has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Staging or converting a source image failed.
    Preparation,
    /// The encoding engine reported a failure exit.
    Invocation,
    /// Anything else that went wrong during the pipeline.
    Unexpected,
}

impl StillmotionError {
    pub fn preparation(msg: impl Into<String>) -> Self {
        Self::Preparation {
            message: msg.into(),
        }
    }

    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation {
            message: msg.into(),
        }
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected {
            message: msg.into(),
        }
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Category used when the error terminates a render attempt.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Preparation { .. } | Self::FileNotFound { .. } => FailureKind::Preparation,
            Self::Invocation { .. } => FailureKind::Invocation,
            _ => FailureKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StillmotionError::preparation("copy failed").kind(),
            FailureKind::Preparation
        );
        assert_eq!(
            StillmotionError::FileNotFound {
                path: PathBuf::from("/missing.jpg")
            }
            .kind(),
            FailureKind::Preparation
        );
        assert_eq!(
            StillmotionError::invocation("exit 1").kind(),
            FailureKind::Invocation
        );
        assert_eq!(
            StillmotionError::workspace("mkdir").kind(),
            FailureKind::Unexpected
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(StillmotionError::from(io).kind(), FailureKind::Unexpected);
    }

    #[test]
    fn test_unexpected_displays_bare_message() {
        let err = StillmotionError::unexpected("render task panicked");
        assert_eq!(err.to_string(), "render task panicked");
    }
}
