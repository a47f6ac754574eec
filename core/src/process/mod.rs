//! Platform process management
//!
//! Low-level spawning and signalling for worker processes. Only Unix is
//! implemented; the adapter seam in [`crate::supervisor::adapters`] keeps the
//! rest of the crate platform-agnostic.

#[cfg(unix)]
pub mod unix;
