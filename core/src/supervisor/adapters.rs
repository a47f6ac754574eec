//! Channel adapters for abstracting worker processes
//!
//! This module provides traits and implementations for abstracting the
//! worker process and its message channel, enabling testing with mock
//! implementations and supporting different channel backends.
//!
//! The channel is split into two halves: a shareable sender for outbound
//! messages and an owned receiver the supervisor's pump task drives. A
//! spawned worker hands both halves back together with its pid.

use crate::launch::SpawnParameters;
use crate::{CoreError, Result};
use async_trait::async_trait;
use schema::ExitRecord;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw platform handle optionally transferred alongside an outbound message.
/// The protocol does not interpret it; whether a channel backend can carry
/// it is backend-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHandle(pub i32);

/// Trait for spawning workers in a platform-agnostic way
#[async_trait]
pub trait WorkerAdapter: Send + Sync {
    /// Spawn a worker process with the given parameters and open its channel
    async fn spawn(&self, params: &SpawnParameters) -> Result<SpawnedWorker>;
}

/// Outbound half of a worker channel; shareable across call sites
#[async_trait]
pub trait WorkerSender: Send + Sync {
    /// Whether the channel currently reports itself connected
    fn is_connected(&self) -> bool;

    /// Enqueue an opaque payload for delivery. Returns true iff the message
    /// was accepted; failure is an expected condition, not an error.
    async fn send(&self, payload: Value, handle: Option<TransferHandle>) -> bool;
}

/// Inbound half of a worker channel plus process control; owned by the
/// supervisor's pump task
#[async_trait]
pub trait WorkerReceiver: Send {
    /// Receive the next raw inbound message. `None` means the channel has
    /// closed and no further messages will arrive.
    async fn recv(&mut self) -> Option<Value>;

    /// Reap the worker and classify its termination. Must only be called
    /// after `recv` has returned `None`.
    async fn wait(&mut self) -> Result<ExitRecord>;

    /// Forcefully terminate the worker
    async fn kill(&mut self) -> Result<()>;
}

/// A freshly spawned worker: pid plus both channel halves
pub struct SpawnedWorker {
    /// Process id of the worker
    pub pid: u32,
    /// Outbound channel half
    pub sender: Arc<dyn WorkerSender>,
    /// Inbound channel half and process control
    pub receiver: Box<dyn WorkerReceiver>,
}

/// Unix worker adapter: stdio JSON-line channel over a process-group child
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixWorkerAdapter;

#[cfg(unix)]
impl UnixWorkerAdapter {
    /// Create a new Unix worker adapter
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl WorkerAdapter for UnixWorkerAdapter {
    async fn spawn(&self, params: &SpawnParameters) -> Result<SpawnedWorker> {
        use crate::process::unix;
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut process = unix::spawn(params)?;
        let pid = process.pid();

        let stdin = process
            .take_stdin()
            .ok_or_else(|| CoreError::ProcessSpawn("Worker stdin was not piped".to_string()))?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| CoreError::ProcessSpawn("Worker stdout was not piped".to_string()))?;
        let stderr = process.take_stderr();

        // Forward raw stderr lines to the logging sink, tagged with the label
        if let Some(stderr) = stderr {
            let label = params.worker_label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("Worker '{}' stderr: {}", label, line);
                }
            });
        }

        let connected = Arc::new(AtomicBool::new(true));
        let sender = UnixWorkerSender {
            label: params.worker_label.clone(),
            stdin: tokio::sync::Mutex::new(stdin),
            connected: connected.clone(),
        };
        let receiver = UnixWorkerReceiver {
            process,
            lines: BufReader::new(stdout).lines(),
            connected,
        };

        Ok(SpawnedWorker {
            pid,
            sender: Arc::new(sender),
            receiver: Box::new(receiver),
        })
    }
}

/// Outbound half of the stdio channel: newline-delimited JSON over stdin
#[cfg(unix)]
struct UnixWorkerSender {
    label: String,
    stdin: tokio::sync::Mutex<tokio::process::ChildStdin>,
    connected: Arc<AtomicBool>,
}

#[cfg(unix)]
#[async_trait]
impl WorkerSender for UnixWorkerSender {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: Value, handle: Option<TransferHandle>) -> bool {
        use tokio::io::AsyncWriteExt;

        if !self.is_connected() {
            return false;
        }
        if handle.is_some() {
            // The stdio channel has no way to pass a platform handle along
            debug!(
                "Worker '{}': dropping transfer handle, stdio channel cannot carry it",
                self.label
            );
        }

        let mut frame = match serde_json::to_vec(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Worker '{}': failed to encode message: {}", self.label, e);
                return false;
            }
        };
        frame.push(b'\n');

        let mut stdin = self.stdin.lock().await;
        match stdin.write_all(&frame).await {
            Ok(()) => stdin.flush().await.is_ok(),
            Err(e) => {
                debug!("Worker '{}': channel write failed: {}", self.label, e);
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }
}

/// Inbound half of the stdio channel: newline-delimited JSON over stdout
#[cfg(unix)]
struct UnixWorkerReceiver {
    process: crate::process::unix::WorkerProcess,
    lines: tokio::io::Lines<tokio::io::BufReader<tokio::process::ChildStdout>>,
    connected: Arc<AtomicBool>,
}

#[cfg(unix)]
#[async_trait]
impl WorkerReceiver for UnixWorkerReceiver {
    async fn recv(&mut self) -> Option<Value> {
        match self.lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str(&line) {
                Ok(value) => Some(value),
                // Not valid JSON; pass the raw line through untouched
                Err(_) => Some(Value::String(line)),
            },
            Ok(None) => {
                self.connected.store(false, Ordering::SeqCst);
                None
            }
            Err(e) => {
                debug!("Worker channel read failed: {}", e);
                self.connected.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    async fn wait(&mut self) -> Result<ExitRecord> {
        self.connected.store(false, Ordering::SeqCst);
        self.process.wait().await
    }

    async fn kill(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        crate::process::unix::signal_kill_group(self.process.pid())
    }
}

/// Scripted behavior for one mock worker
#[derive(Debug, Clone)]
pub struct MockWorkerScript {
    /// Messages the worker delivers, in order
    pub inbound: Vec<Value>,
    /// Exit record reported when the worker exits on its own
    pub exit: ExitRecord,
    /// How long the channel stays open after the last scripted message;
    /// a long hold simulates a healthy long-running worker
    pub hold_open: Duration,
    /// Whether spawning this worker fails outright
    pub fail_spawn: bool,
}

impl Default for MockWorkerScript {
    fn default() -> Self {
        Self {
            inbound: Vec::new(),
            exit: ExitRecord::with_code(0),
            hold_open: Duration::from_millis(50),
            fail_spawn: false,
        }
    }
}

/// Mock worker adapter for testing
#[derive(Clone, Default)]
pub struct MockWorkerAdapter {
    scripts: Arc<std::sync::Mutex<VecDeque<MockWorkerScript>>>,
    sent: Arc<std::sync::Mutex<Vec<Value>>>,
    kill_count: Arc<AtomicUsize>,
    next_pid: Arc<AtomicU32>,
}

impl MockWorkerAdapter {
    /// Create a new mock adapter with no pre-configured scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next spawned worker
    pub fn add_script(&self, script: MockWorkerScript) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(script);
    }

    /// Messages sent to any worker spawned by this adapter, in order
    pub fn sent_messages(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Total number of kill requests delivered to spawned workers
    pub fn kill_count(&self) -> usize {
        self.kill_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerAdapter for MockWorkerAdapter {
    async fn spawn(&self, params: &SpawnParameters) -> Result<SpawnedWorker> {
        debug!(
            "Spawning mock worker '{}' for module {}",
            params.worker_label, params.module_path
        );

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();

        if script.fail_spawn {
            return Err(CoreError::ProcessSpawn(format!(
                "Mock spawn failure for '{}'",
                params.module_path
            )));
        }

        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let killed = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(true));

        let sender = MockWorkerSender {
            sent: self.sent.clone(),
            connected: connected.clone(),
        };
        let receiver = MockWorkerReceiver {
            inbound: script.inbound.into(),
            exit: script.exit,
            deadline: tokio::time::Instant::now() + script.hold_open,
            killed,
            connected,
            kill_count: self.kill_count.clone(),
        };

        Ok(SpawnedWorker {
            pid,
            sender: Arc::new(sender),
            receiver: Box::new(receiver),
        })
    }
}

struct MockWorkerSender {
    sent: Arc<std::sync::Mutex<Vec<Value>>>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerSender for MockWorkerSender {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: Value, _handle: Option<TransferHandle>) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload);
        true
    }
}

struct MockWorkerReceiver {
    inbound: VecDeque<Value>,
    exit: ExitRecord,
    deadline: tokio::time::Instant,
    killed: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    kill_count: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerReceiver for MockWorkerReceiver {
    async fn recv(&mut self) -> Option<Value> {
        if let Some(message) = self.inbound.pop_front() {
            tokio::time::sleep(Duration::from_millis(1)).await;
            return Some(message);
        }

        // Channel stays open until the worker "exits" or is killed
        loop {
            if self.killed.load(Ordering::SeqCst) || tokio::time::Instant::now() >= self.deadline {
                self.connected.store(false, Ordering::SeqCst);
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait(&mut self) -> Result<ExitRecord> {
        if self.killed.load(Ordering::SeqCst) {
            Ok(ExitRecord::with_signal("SIGKILL"))
        } else {
            Ok(self.exit.clone())
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.kill_count.fetch_add(1, Ordering::SeqCst);
        self.killed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
