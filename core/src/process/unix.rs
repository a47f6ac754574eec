//! Unix worker process management with safe spawn/kill using process groups
//!
//! Workers are placed in their own process group via `setsid()` so the
//! entire process tree can be signalled reliably: the worker may itself fork
//! helpers, and a kill must not leave those behind.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::launch::SpawnParameters;
use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, error};

use schema::ExitRecord;

/// A worker child process managed with Unix process groups
#[derive(Debug)]
pub struct WorkerProcess {
    /// The process ID of the spawned worker
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl WorkerProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Take the stdin handle for the outbound channel half, if not taken yet
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the stdout handle for the inbound channel half, if not taken yet
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle for log forwarding, if not taken yet
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the worker to exit and classify its termination
    pub async fn wait(&mut self) -> Result<ExitRecord> {
        let status = self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })?;

        Ok(exit_record_from_status(&status))
    }
}

/// Translate a process exit status into an [`ExitRecord`]
pub fn exit_record_from_status(status: &std::process::ExitStatus) -> ExitRecord {
    if let Some(code) = status.code() {
        ExitRecord::with_code(code)
    } else if let Some(signo) = status.signal() {
        ExitRecord::with_signal(signal_name(signo))
    } else {
        ExitRecord::unknown()
    }
}

/// Name for a raw signal number, e.g. 15 → "SIGTERM"
fn signal_name(signo: i32) -> String {
    match Signal::try_from(signo) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("SIG{signo}"),
    }
}

/// Spawn a worker in its own process group with a piped stdio channel
///
/// The command line is `module_path runtime_args... args...`; the
/// environment is exactly `params.env` (nothing else is inherited). The
/// worker's stdin/stdout become the message channel and stderr is piped for
/// log forwarding.
///
/// ## Safety
///
/// Uses `unsafe` to call `libc::setsid()` in the `pre_exec` closure;
/// `setsid()` is async-signal-safe and appropriate for use there.
pub fn spawn(params: &SpawnParameters) -> Result<WorkerProcess> {
    debug!(
        "Spawning worker '{}': {} {:?} {:?}",
        params.worker_label, params.module_path, params.runtime_args, params.args
    );

    let mut command = Command::new(&params.module_path);
    command.args(&params.runtime_args);
    command.args(&params.args);
    command.env_clear();
    command.envs(&params.env);
    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    // Use pre_exec to call setsid() in the child process
    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            // Create a new session and process group
            let result = libc::setsid();
            if result == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!(
            "Failed to spawn worker '{}' ({}): {}",
            params.worker_label, params.module_path, e
        );
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", params.module_path, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned worker did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned worker {} in new process group", pid);

    Ok(WorkerProcess { pid, child })
}

/// Send SIGKILL to the worker's process group for forceful termination
///
/// `ESRCH` and `EPERM` are treated as success since they mean the process
/// group has already exited.
pub fn signal_kill_group(pid: u32) -> Result<()> {
    let pgid = Pid::from_raw(pid as i32);
    debug!("Sending SIGKILL to process group {}", pgid);

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", pgid);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                pgid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send SIGKILL to process group {}: {}", pgid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGKILL to process group {}: {}",
                pgid, e
            )))
        }
    }
}
