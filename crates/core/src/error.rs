// Central Error Type for the Broker

use std::time::Duration;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Enqueue error: {0}")]
    Enqueue(#[from] crate::application::queue::EnqueueError),

    #[error("Shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
