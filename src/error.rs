//! Error types for Shield.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Shield operations.
///
/// A blocked admission is never an error; these variants only describe
/// operational failures and contract violations.
#[derive(Error, Debug)]
pub enum ShieldError {
    /// Limiter configuration rejected at construction time
    #[error("Invalid limiter configuration: {0}")]
    InvalidConfig(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote store errors (unreachable, command rejected, script failure)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The remote store answered with something the admission script never returns
    #[error("Unexpected reply from remote store: {0}")]
    UnexpectedReply(String),

    /// The caller's deadline elapsed before the admission completed
    #[error("Admission deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Background tasks did not stop before the caller's deadline
    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// The in-memory engine needs a Tokio runtime for its reclamation task
    #[error("Runtime error: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Shield operations.
pub type Result<T> = std::result::Result<T, ShieldError>;
