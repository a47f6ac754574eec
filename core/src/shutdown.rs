//! Process-wide shutdown registry for live workers
//!
//! Every running supervisor registers a kill handle here so that a host that
//! begins shutting down can terminate all of its workers. A single registry
//! replaces one host-shutdown listener per supervisor: add and remove are
//! O(1) slab operations keyed by [`RegistrationId`], and a supervisor always
//! removes its entry at worker exit or dispose, so entries never accumulate
//! across many short-lived supervisors.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

type KillFn = Box<dyn Fn() + Send + Sync>;

/// Opaque handle for a registry entry. Consumed on deregistration, so an
/// entry cannot be removed twice.
#[derive(Debug)]
pub struct RegistrationId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, KillFn>,
}

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

/// Register a kill handle for a live worker.
///
/// The handle is invoked at most once, from [`run_shutdown_hooks`], and must
/// not block.
pub fn register(kill: impl Fn() + Send + Sync + 'static) -> RegistrationId {
    let mut guard = registry().lock().unwrap_or_else(|e| e.into_inner());
    let id = guard.next_id;
    guard.next_id += 1;
    guard.entries.insert(id, Box::new(kill));
    debug!("Registered shutdown hook {}", id);
    RegistrationId(id)
}

/// Remove a registry entry. Safe to call for entries already drained by
/// [`run_shutdown_hooks`].
pub fn deregister(id: RegistrationId) {
    let mut guard = registry().lock().unwrap_or_else(|e| e.into_inner());
    if guard.entries.remove(&id.0).is_some() {
        debug!("Deregistered shutdown hook {}", id.0);
    }
}

/// Drain the registry and invoke every kill handle.
///
/// Called when the host process begins shutting down while workers may
/// still be alive.
pub fn run_shutdown_hooks() {
    let entries = {
        let mut guard = registry().lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut guard.entries)
    };
    if !entries.is_empty() {
        debug!("Running {} shutdown hook(s)", entries.len());
    }
    for (_, kill) in entries {
        kill();
    }
}

/// Number of currently registered entries
#[must_use]
pub fn registered_count() -> usize {
    registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .entries
        .len()
}
