//! Custom error types for prdloop.
//!
//! Library code returns [`LoopError`] internally; public orchestrator
//! transitions never surface it, they log and treat the transition as a no-op.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong below the orchestrator.
///
/// Variants are grouped by what the CLI does with them: input problems exit
/// with code 2, a missing document with 6, bad settings with 7.
#[derive(Error, Debug)]
pub enum LoopError {
    /// `.prdloop/settings.json` is unreadable or holds invalid values
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Missing task document: {path}")]
    MissingDocument { path: PathBuf },

    /// A task id passed to a mutation does not exist in the document
    #[error("Unknown task id: {id}")]
    UnknownTask { id: String },

    /// Report date range is missing or inverted
    #[error("Invalid date range: {reason}")]
    InvalidDateRange { reason: String },

    /// Unrecognized format or period name
    #[error("Invalid value '{value}', expected one of: {expected}")]
    InvalidFormat { value: String, expected: String },

    #[error("Agent error: {message}")]
    Agent { message: String },

    #[error(transparent)]
    Watch(#[from] notify::Error),

    /// History I/O moved to the blocking pool panicked or was cancelled
    #[error("Background history task failed: {0}")]
    Background(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LoopError {
    /// Invalid settings values, not tied to a file.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// A settings file that failed to parse.
    pub fn settings_file(path: PathBuf, message: impl Into<String>) -> Self {
        Self::Config {
            message: format!("{}: {}", path.display(), message.into()),
            path: Some(path),
        }
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
        }
    }

    pub fn date_range(reason: impl Into<String>) -> Self {
        Self::InvalidDateRange {
            reason: reason.into(),
        }
    }

    pub fn invalid_format(value: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidFormat {
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Check if this error was caused by bad user input.
    ///
    /// Input errors are rejected before any write happens.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTask { .. } | Self::InvalidDateRange { .. } | Self::InvalidFormat { .. }
        )
    }

    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownTask { .. } | Self::InvalidDateRange { .. } | Self::InvalidFormat { .. } => 2,
            Self::MissingDocument { .. } => 6,
            Self::Config { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for prdloop results
pub type Result<T> = std::result::Result<T, LoopError>;
