//! Core functionality for the Arcturus workbench host
//!
//! This crate contains the worker launch pipeline, the per-worker
//! supervisor, and the process-wide shutdown registry shared by the daemon
//! and any embedding host.

pub mod config;
pub mod error;
pub mod launch;
#[cfg(unix)]
pub mod process;
pub mod shutdown;
pub mod supervisor;

#[cfg(test)]
mod error_tests;

// Re-export schema types for convenience
pub use schema::*;

pub use error::{CoreError, Result};
pub use launch::{build_spawn_parameters, HostSnapshot, SpawnParameters};
pub use supervisor::WorkerSupervisor;

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
