//! Worker process supervisor
//!
//! This module provides the supervisor that owns a single extension worker
//! process: it spawns the worker, pumps its message channel, classifies the
//! handshake and log traffic, reports lifecycle events, and guarantees safe,
//! idempotent teardown.
//!
//! ## Architecture
//!
//! Exactly one [`WorkerSupervisor`] exists per worker process. The
//! supervisor exclusively owns the process handle (through the channel
//! receiver) and the shutdown-registry entry. Its state only moves forward:
//!
//! ```text
//! NotStarted → Running → ExitedClean | ExitedCrashed → Disposed
//! ```
//!
//! A single pump task drives the channel: every inbound message is
//! classified per [`schema::Envelope`] and dispatched before the exit
//! transition completes, so subscribers observe all ready/log side effects
//! for messages received before the exit notification.
//!
//! ## Failure semantics
//!
//! Nothing here aborts the host. A spawn failure is reported once to the
//! diagnostic sink and surfaces as an immediate exited transition; a crash
//! is a warning diagnostic plus the ordinary exited event; a send on a
//! dead channel is a `false` return, never an error.

use crate::launch::{build_spawn_parameters, HostSnapshot};
use crate::shutdown::{self, RegistrationId};
use schema::{Envelope, ExitRecord, LaunchConfiguration, LogSeverity, RemoteConsoleLog, SupervisorState, WorkerEvent};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

pub mod adapters;

pub use adapters::*;


/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State shared between the supervisor handle and its pump task
struct Shared {
    /// Worker label used in diagnostics
    label: String,
    /// Lifecycle state broadcaster
    state_tx: watch::Sender<SupervisorState>,
    /// Guard ensuring the exited event fires at most once
    exited_fired: AtomicBool,
    /// Shutdown-registry entry, present while the worker may be alive
    registration: std::sync::Mutex<Option<RegistrationId>>,
}

/// Mutable supervisor internals behind the handle's mutex
struct Inner {
    /// Guards against a second start
    started: bool,
    /// Outbound channel half, present while running
    sender: Option<Arc<dyn WorkerSender>>,
    /// Termination request line into the pump task
    kill_tx: Option<mpsc::UnboundedSender<()>>,
    /// Lifecycle event sender; dropped on dispose to end subscriptions
    events: Option<broadcast::Sender<WorkerEvent>>,
}

/// Supervisor for a single worker process
///
/// Construct with [`WorkerSupervisor::new`], call [`start`](Self::start)
/// once, observe lifecycle through [`subscribe`](Self::subscribe) and
/// [`watch_state`](Self::watch_state), and release everything with
/// [`dispose`](Self::dispose).
pub struct WorkerSupervisor {
    config: LaunchConfiguration,
    adapter: Arc<dyn WorkerAdapter>,
    shared: Arc<Shared>,
    inner: std::sync::Mutex<Inner>,
}

impl WorkerSupervisor {
    /// Create a supervisor for the given launch configuration.
    ///
    /// The configuration is immutable from here on; nothing happens until
    /// [`start`](Self::start).
    pub fn new(config: LaunchConfiguration, adapter: Arc<dyn WorkerAdapter>) -> Self {
        let (state_tx, _state_rx) = watch::channel(SupervisorState::NotStarted);
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                label: config.worker_label.clone(),
                state_tx,
                exited_fired: AtomicBool::new(false),
                registration: std::sync::Mutex::new(None),
            }),
            inner: std::sync::Mutex::new(Inner {
                started: false,
                sender: None,
                kill_tx: None,
                events: Some(events_tx),
            }),
            config,
            adapter,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SupervisorState {
        *self.shared.state_tx.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    ///
    /// After [`dispose`](Self::dispose) the returned receiver reports the
    /// channel as closed once the pump has wound down.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &inner.events {
            Some(events) => events.subscribe(),
            None => {
                // Disposed: hand back an already-closed receiver
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }

    /// Start the worker process.
    ///
    /// Transitions NotStarted → Running. A spawn failure is reported once
    /// through the diagnostic sink and shows up as an immediate exited
    /// transition; it is not returned as an error.
    pub async fn start(&self) {
        let events = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.started || self.state().is_terminal() {
                warn!(
                    "Cannot start worker '{}' - already started (state: {:?})",
                    self.shared.label,
                    self.state()
                );
                return;
            }
            inner.started = true;
            inner.events.clone()
        };

        let params = build_spawn_parameters(&self.config, &HostSnapshot::capture());

        let spawned = match self.adapter.spawn(&params).await {
            Ok(spawned) => spawned,
            Err(e) => {
                // Reported once; consumers detect the failed start through
                // the missing ready event and the exited transition.
                error!("Failed to start worker '{}': {}", self.shared.label, e);
                advance_state(&self.shared.state_tx, SupervisorState::ExitedCrashed);
                if let Some(events) = events {
                    fire_exited(&self.shared, &events, ExitRecord::unknown());
                }
                return;
            }
        };

        let SpawnedWorker {
            pid,
            sender,
            receiver,
        } = spawned;

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();

        // Commit the handles under the lock so a concurrent dispose either
        // sees them or is observed here; checked under the same lock.
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if self.state() == SupervisorState::Disposed {
            // Disposed while spawning; the worker must not outlive us
            drop(inner);
            let mut receiver = receiver;
            if let Err(e) = receiver.kill().await {
                warn!("Failed to kill worker '{}': {}", self.shared.label, e);
            }
            return;
        }
        let mut inner = inner;

        let registration = shutdown::register({
            let kill_tx = kill_tx.clone();
            move || {
                let _ = kill_tx.send(());
            }
        });
        *self
            .shared
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(registration);

        advance_state(&self.shared.state_tx, SupervisorState::Running);

        inner.sender = Some(sender);
        inner.kill_tx = Some(kill_tx);
        if let Some(events) = events {
            // Detached on purpose: the pump must outlive dispose so the
            // worker is always reaped.
            tokio::spawn(pump_loop(receiver, self.shared.clone(), events, kill_rx));
        }
        drop(inner);

        info!("Started worker '{}' (pid {})", self.shared.label, pid);
    }

    /// Send an opaque message to the worker.
    ///
    /// Returns true iff the supervisor is Running and the channel reports
    /// itself connected; callers must check the return value. Returns false
    /// in every other state, including before `start` and after `dispose`.
    pub async fn send_message(&self, payload: Value, handle: Option<TransferHandle>) -> bool {
        if !self.state().is_running() {
            return false;
        }
        let sender = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sender.clone()
        };
        match sender {
            Some(sender) if sender.is_connected() => sender.send(payload, handle).await,
            _ => false,
        }
    }

    /// Release all supervisor resources.
    ///
    /// If the worker is still alive it receives exactly one termination
    /// request no matter how many times this is called; the shutdown
    /// registry entry is removed if still present and event subscriptions
    /// end. Idempotent from any state.
    pub fn dispose(&self) {
        // State moves first so a start racing with this dispose observes it
        // before committing its handles
        let first = advance_state(&self.shared.state_tx, SupervisorState::Disposed);
        let kill_tx = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sender = None;
            inner.events = None;
            inner.kill_tx.take()
        };
        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }
        if let Some(registration) = self
            .shared
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            shutdown::deregister(registration);
        }
        if first {
            debug!("Disposed supervisor for worker '{}'", self.shared.label);
        }
    }
}

/// Apply a forward-only state transition. Returns whether it took effect.
fn advance_state(state_tx: &watch::Sender<SupervisorState>, next: SupervisorState) -> bool {
    state_tx.send_if_modified(|current| {
        let allowed = match next {
            SupervisorState::NotStarted => false,
            SupervisorState::Running => *current == SupervisorState::NotStarted,
            SupervisorState::ExitedClean | SupervisorState::ExitedCrashed => {
                matches!(
                    *current,
                    SupervisorState::NotStarted | SupervisorState::Running
                )
            }
            SupervisorState::Disposed => *current != SupervisorState::Disposed,
        };
        if allowed {
            *current = next;
        }
        allowed
    })
}

/// Fire the exited event, at most once per supervisor lifetime
fn fire_exited(shared: &Shared, events: &broadcast::Sender<WorkerEvent>, exit: ExitRecord) {
    if !shared.exited_fired.swap(true, Ordering::SeqCst) {
        let _ = events.send(WorkerEvent::exited(shared.label.clone(), exit));
    }
}

/// Classify and dispatch one inbound message
fn dispatch_inbound(shared: &Shared, events: &broadcast::Sender<WorkerEvent>, raw: Value) {
    match Envelope::classify(raw) {
        Envelope::Ready(payload) => {
            debug!("Worker '{}' signalled ready", shared.label);
            // Re-fired on every handshake message; deduplication is a
            // caller concern.
            let _ = events.send(WorkerEvent::ready(shared.label.clone(), payload));
        }
        Envelope::Log(record) => forward_console_log(&shared.label, &record),
        Envelope::Opaque(payload) => {
            let _ = events.send(WorkerEvent::inbound(shared.label.clone(), payload));
        }
    }
}

/// Forward a remote console log record to the logging sink
fn forward_console_log(label: &str, record: &RemoteConsoleLog) {
    match record.severity_level() {
        LogSeverity::Error => error!("Worker '{}' console: {}", label, record.arguments),
        LogSeverity::Warn => warn!("Worker '{}' console: {}", label, record.arguments),
        LogSeverity::Info => info!("Worker '{}' console: {}", label, record.arguments),
        LogSeverity::Log => debug!("Worker '{}' console: {}", label, record.arguments),
    }
}

/// Drive the worker channel until it closes, then reap and report the exit.
///
/// The channel is fully drained before the exit transition, so every
/// ready/log side effect for messages received before the exit notification
/// is dispatched first.
async fn pump_loop(
    mut receiver: Box<dyn WorkerReceiver>,
    shared: Arc<Shared>,
    events: broadcast::Sender<WorkerEvent>,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
) {
    let mut killed = false;
    loop {
        tokio::select! {
            inbound = receiver.recv() => {
                match inbound {
                    Some(raw) => dispatch_inbound(&shared, &events, raw),
                    None => break,
                }
            }
            _ = kill_rx.recv() => {
                killed = true;
                break;
            }
        }
    }

    if killed {
        if let Err(e) = receiver.kill().await {
            warn!("Failed to kill worker '{}': {}", shared.label, e);
        }
        // Drain whatever was already buffered before the exit transition
        while let Some(raw) = receiver.recv().await {
            dispatch_inbound(&shared, &events, raw);
        }
    }

    // The worker can no longer be alive; drop the shutdown hook before
    // reporting the exit.
    if let Some(registration) = shared
        .registration
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        shutdown::deregister(registration);
    }

    let exit = match receiver.wait().await {
        Ok(exit) => exit,
        Err(e) => {
            error!("Failed to reap worker '{}': {}", shared.label, e);
            ExitRecord::unknown()
        }
    };

    let crashed = exit.is_crash();
    let next = if crashed {
        SupervisorState::ExitedCrashed
    } else {
        SupervisorState::ExitedClean
    };
    let transitioned = advance_state(&shared.state_tx, next);
    if crashed && transitioned {
        warn!(
            "Worker '{}' crashed with exit code {:?} and signal {:?}",
            shared.label, exit.exit_code, exit.signal
        );
    } else {
        debug!(
            "Worker '{}' exited with exit code {:?} and signal {:?}",
            shared.label, exit.exit_code, exit.signal
        );
    }

    fire_exited(&shared, &events, exit);
}
