//! Worker launch configuration and lifecycle types
//!
//! These types describe how a worker process is launched, the states its
//! supervisor moves through, and the events the supervisor broadcasts.
//!
//! ## Supervisor lifecycle
//!
//! A supervisor only ever moves forward:
//!
//! ```text
//! NotStarted → Running → ExitedClean | ExitedCrashed → Disposed
//! ```
//!
//! `ExitedClean`, `ExitedCrashed` and `Disposed` are terminal; the exit
//! event fires at most once per supervisor lifetime.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;

/// The signal a graceful terminate request delivers
const GRACEFUL_TERMINATE_SIGNAL: &str = "SIGTERM";

/// Complete launch configuration for a worker process
///
/// Immutable once handed to a supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfiguration {
    /// Path of the worker entry module to execute
    pub module_path: String,

    /// Command-line arguments passed to the worker module
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variable overrides; these win over inherited entries
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// If set, the worker inherits no runtime arguments from the host
    #[serde(default)]
    pub fresh_argv: bool,

    /// Debug port for a non-breaking inspector flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_port: Option<u16>,

    /// Debug port for a break-on-start inspector flag; wins over `debug_port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_brk_port: Option<u16>,

    /// Human-readable label used to tag logs and diagnostics for this worker
    pub worker_label: String,
}

impl LaunchConfiguration {
    /// Create a configuration with defaults for everything but the two
    /// required fields.
    #[must_use]
    pub fn new(module_path: impl Into<String>, worker_label: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            args: Vec::new(),
            env: HashMap::new(),
            fresh_argv: false,
            debug_port: None,
            debug_brk_port: None,
            worker_label: worker_label.into(),
        }
    }
}

/// Termination record for a worker process, produced exactly once per
/// supervisor lifetime
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExitRecord {
    /// Exit code, if the process exited on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal name, if the process was killed by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl ExitRecord {
    /// Record for a process that exited on its own with `code`
    #[must_use]
    pub fn with_code(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
        }
    }

    /// Record for a process terminated by the named signal
    #[must_use]
    pub fn with_signal(signal: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            signal: Some(signal.into()),
        }
    }

    /// Record for a process that never produced exit information, e.g. one
    /// that could not be spawned at all
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            exit_code: None,
            signal: None,
        }
    }

    /// Crash classification: a worker crashed iff its exit code is non-zero
    /// and its terminating signal is not the graceful terminate signal.
    ///
    /// Operator tooling depends on this exact predicate; a missing exit code
    /// counts as non-zero.
    #[must_use]
    pub fn is_crash(&self) -> bool {
        self.exit_code != Some(0) && self.signal.as_deref() != Some(GRACEFUL_TERMINATE_SIGNAL)
    }
}

/// Current state of a worker supervisor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    /// `start()` has not been called yet
    NotStarted,
    /// Worker process is alive and the channel is being pumped
    Running,
    /// Worker exited and was classified as a clean exit
    ExitedClean,
    /// Worker exited and was classified as a crash
    ExitedCrashed,
    /// Supervisor resources have been released
    Disposed,
}

impl SupervisorState {
    /// Check whether the worker process is supposed to be alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, SupervisorState::Running)
    }

    /// Check whether this state can never be left again
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorState::ExitedClean
                | SupervisorState::ExitedCrashed
                | SupervisorState::Disposed
        )
    }
}

/// Lifecycle events broadcast by a worker supervisor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum WorkerEvent {
    /// The worker signalled readiness over the channel.
    ///
    /// Fires once per ready message received; the supervisor does not
    /// deduplicate repeated handshakes.
    Ready {
        /// Worker label
        worker_label: String,
        /// Full raw handshake message
        payload: Value,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// An opaque message arrived that the supervisor does not interpret
    Inbound {
        /// Worker label
        worker_label: String,
        /// Raw message, passed through untouched
        payload: Value,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// The worker process terminated. Fires exactly once per supervisor.
    Exited {
        /// Worker label
        worker_label: String,
        /// Exit information
        exit: ExitRecord,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },
}

impl WorkerEvent {
    /// Get the worker label for this event
    #[must_use]
    pub fn worker_label(&self) -> &str {
        match self {
            Self::Ready { worker_label, .. }
            | Self::Inbound { worker_label, .. }
            | Self::Exited { worker_label, .. } => worker_label,
        }
    }

    /// Create a ready event carrying the raw handshake payload
    #[must_use]
    pub fn ready(worker_label: String, payload: Value) -> Self {
        Self::Ready {
            worker_label,
            payload,
            timestamp: current_timestamp(),
        }
    }

    /// Create an inbound pass-through event
    #[must_use]
    pub fn inbound(worker_label: String, payload: Value) -> Self {
        Self::Inbound {
            worker_label,
            payload,
            timestamp: current_timestamp(),
        }
    }

    /// Create an exited event
    #[must_use]
    pub fn exited(worker_label: String, exit: ExitRecord) -> Self {
        Self::Exited {
            worker_label,
            exit,
            timestamp: current_timestamp(),
        }
    }
}

/// Create a current timestamp string in RFC3339 format
/// (second precision: YYYY-MM-DDTHH:MM:SSZ)
#[must_use]
pub fn current_timestamp() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}
