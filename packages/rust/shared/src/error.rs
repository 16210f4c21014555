//! Error types for Adapt.
//!
//! Library crates use [`AdaptError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for all Adapt operations.
#[derive(Debug, thiserror::Error)]
pub enum AdaptError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Form or input validation error, raised before any network call.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The requested operation is not valid in the current wizard phase.
    #[error("cannot {event} while {phase}")]
    InvalidTransition { phase: String, event: String },

    /// Every attempted upload failed.
    #[error("no file was uploaded successfully{}", first_error_suffix(.first_error))]
    NoFilesUploaded { first_error: Option<String> },

    /// The parse step produced too little text to generate questions from.
    #[error("insufficient text: extracted {chars} characters, need at least {min}")]
    InsufficientText { chars: usize, min: usize },

    /// A collaborator service reported a failure.
    #[error("{stage} failed: {message}")]
    Service { stage: Stage, message: String },

    /// Saving was requested with no questions.
    #[error("add at least one question before creating the course")]
    EmptyQuestionSet,

    /// A question index does not exist.
    #[error("question index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn first_error_suffix(first_error: &Option<String>) -> String {
    match first_error {
        Some(msg) => format!(": {msg}"),
        None => String::new(),
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AdaptError>;

impl AdaptError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Re-tag a collaborator error with the stage it happened in.
    ///
    /// Network and service errors become `Service { stage, .. }`; anything
    /// else is returned unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Network(message) => Self::Service { stage, message },
            Self::Service { message, .. } => Self::Service { stage, message },
            other => other,
        }
    }
}

/// Collaborator stage a [`AdaptError::Service`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Generate,
    Finalize,
    Fetch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parsing"),
            Self::Generate => write!(f, "question generation"),
            Self::Finalize => write!(f, "saving the course"),
            Self::Fetch => write!(f, "loading the saved course"),
        }
    }
}

/// Failure reported by an object storage `put`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The bucket policy (or credentials) forbid the write.
    #[error("no permission to upload: {message}")]
    PolicyDenied { message: String },

    /// The storage server answered with an error status.
    #[error("[{status}] {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a response.
    #[error("[ERR] {0}")]
    Transport(String),
}

impl StorageError {
    /// Whether this failure is a permission/policy denial.
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, Self::PolicyDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AdaptError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = AdaptError::InsufficientText { chars: 12, min: 200 };
        assert!(err.to_string().starts_with("insufficient text"));
    }

    #[test]
    fn no_files_uploaded_includes_first_error() {
        let err = AdaptError::NoFilesUploaded {
            first_error: Some("[500] boom".into()),
        };
        assert_eq!(err.to_string(), "no file was uploaded successfully: [500] boom");

        let err = AdaptError::NoFilesUploaded { first_error: None };
        assert_eq!(err.to_string(), "no file was uploaded successfully");
    }

    #[test]
    fn network_error_retagged_with_stage() {
        let err = AdaptError::Network("connection reset".into()).at_stage(Stage::Generate);
        assert_eq!(
            err.to_string(),
            "question generation failed: connection reset"
        );

        let err = AdaptError::EmptyQuestionSet.at_stage(Stage::Finalize);
        assert!(matches!(err, AdaptError::EmptyQuestionSet));
    }

    #[test]
    fn storage_error_kinds() {
        let denied = StorageError::PolicyDenied {
            message: "bucket «courses»".into(),
        };
        assert!(denied.is_policy_denied());
        assert_eq!(
            StorageError::Rejected {
                status: 413,
                message: "too big".into()
            }
            .to_string(),
            "[413] too big"
        );
        assert!(!StorageError::Transport("timeout".into()).is_policy_denied());
    }
}
