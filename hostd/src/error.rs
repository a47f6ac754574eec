//! Daemon error types

use thiserror::Error;

/// Errors surfaced by the workbench host daemon
#[derive(Debug, Error)]
pub enum HostdError {
    /// Loading or validating the workers configuration failed
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Daemon startup failed
    #[error("Startup error: {0}")]
    StartupError(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result alias for daemon operations
pub type Result<T> = std::result::Result<T, HostdError>;
