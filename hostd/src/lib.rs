//! Workbench host daemon library
//!
//! Thin daemon wrapper around `arcturus-core`: loads the workers
//! configuration, starts one supervisor per worker, and wires lifecycle
//! events into the log.

#![allow(unused_crate_dependencies)]

pub mod bootstrap;
pub mod error;

pub use bootstrap::{bootstrap, BootstrapHandle};
pub use error::{HostdError, Result};
