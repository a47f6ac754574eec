//! Schema definitions for Arcturus
//!
//! This crate contains the shared data structures exchanged between the host
//! and its extension worker processes: the message envelope protocol, launch
//! configuration, exit records, and supervisor lifecycle types. All types
//! here implement JSON Schema generation for external consumption.

pub mod envelope;
pub mod worker;

pub use envelope::{Envelope, LogSeverity, RemoteConsoleLog, CONSOLE_LOG_TYPE, READY_MESSAGE_TYPE};
pub use worker::{current_timestamp, ExitRecord, LaunchConfiguration, SupervisorState, WorkerEvent};
