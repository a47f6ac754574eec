//! Launch parameter assembly for worker processes
//!
//! [`build_spawn_parameters`] turns a [`LaunchConfiguration`] plus a snapshot
//! of the host process into the concrete parameters a worker is spawned with.
//! It is a pure function of its inputs: no environment reads, no process
//! creation, fully unit-testable.
//!
//! ## Environment assembly
//!
//! The worker environment is the host environment snapshot, plus a
//! `PARENT_PID` entry carrying the host's own process id, plus the
//! configuration's overrides (overrides win on key collision). On macOS the
//! dynamic-library search path variable is removed unconditionally, since it
//! is known to crash forked workers.
//!
//! ## Debug flags
//!
//! Debug flags are mutually exclusive: a break-on-start port wins over a
//! plain debug port, and either wins over `fresh_argv`. When none is set the
//! worker inherits the host's runtime arguments with any inspector flags
//! stripped, so the host's own debug port is never bound twice.

use schema::LaunchConfiguration;
use std::collections::HashMap;

/// Environment variable carrying the host's process id, as a decimal string
pub const PARENT_PID_ENV: &str = "PARENT_PID";

/// Dynamic-library search path variable removed on macOS before spawn.
/// Leaving it set leads to crashes in forked workers.
const MACOS_DYLIB_PATH_ENV: &str = "DYLD_LIBRARY_PATH";

/// Platform family tag for the launch builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux and other non-Apple Unixes
    Linux,
    /// Apple platforms (the `DYLD_LIBRARY_PATH` special case applies)
    MacOs,
    /// Windows
    Windows,
}

impl Platform {
    /// The platform this host was compiled for
    #[must_use]
    pub const fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::MacOs
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            Platform::Linux
        }
        #[cfg(windows)]
        {
            Platform::Windows
        }
    }
}

/// Snapshot of the host process state the launch builder depends on
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    /// The host's own process id
    pub pid: u32,
    /// The host's current environment
    pub env: HashMap<String, String>,
    /// The host's own runtime (interpreter) arguments
    pub runtime_args: Vec<String>,
    /// Platform family the host runs on
    pub platform: Platform,
}

impl HostSnapshot {
    /// Capture a snapshot of the live host process.
    ///
    /// A native host binary carries no interpreter arguments, so
    /// `runtime_args` is empty here; the inherit-and-strip behavior still
    /// applies to snapshots that do carry them.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            pid: std::process::id(),
            env: std::env::vars().collect(),
            runtime_args: Vec::new(),
            platform: Platform::current(),
        }
    }
}

/// Spawn-ready parameter set for a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnParameters {
    /// Path of the worker entry module
    pub module_path: String,
    /// Runtime (interpreter) arguments, passed before the module arguments
    pub runtime_args: Vec<String>,
    /// Arguments for the worker module itself
    pub args: Vec<String>,
    /// Complete worker environment
    pub env: HashMap<String, String>,
    /// Label used to tag logs and diagnostics
    pub worker_label: String,
}

/// Check whether a runtime argument is an inspector flag bound to a port
fn is_debug_flag(arg: &str) -> bool {
    arg.starts_with("--inspect=") || arg.starts_with("--inspect-brk=")
}

/// Build the concrete spawn parameters for a worker.
///
/// Pure function of the configuration and the host snapshot; see the module
/// docs for the merge and debug-flag rules.
#[must_use]
pub fn build_spawn_parameters(
    config: &LaunchConfiguration,
    host: &HostSnapshot,
) -> SpawnParameters {
    let mut env = host.env.clone();
    env.insert(PARENT_PID_ENV.to_string(), host.pid.to_string());
    for (key, value) in &config.env {
        env.insert(key.clone(), value.clone());
    }

    if host.platform == Platform::MacOs {
        env.remove(MACOS_DYLIB_PATH_ENV);
    }

    let runtime_args = if let Some(port) = config.debug_brk_port {
        vec!["--nolazy".to_string(), format!("--inspect-brk={port}")]
    } else if let Some(port) = config.debug_port {
        vec!["--nolazy".to_string(), format!("--inspect={port}")]
    } else if config.fresh_argv {
        Vec::new()
    } else {
        // The host's own inspector port must not be bound a second time
        host.runtime_args
            .iter()
            .filter(|arg| !is_debug_flag(arg))
            .cloned()
            .collect()
    };

    SpawnParameters {
        module_path: config.module_path.clone(),
        runtime_args,
        args: config.args.clone(),
        env,
        worker_label: config.worker_label.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_snapshot() -> HostSnapshot {
        HostSnapshot {
            pid: 4321,
            env: HashMap::from([
                ("PATH".to_string(), "/usr/bin".to_string()),
                ("HOME".to_string(), "/home/host".to_string()),
            ]),
            runtime_args: vec![
                "--max-old-space-size=4096".to_string(),
                "--inspect=9229".to_string(),
            ],
            platform: Platform::Linux,
        }
    }

    fn test_config() -> LaunchConfiguration {
        LaunchConfiguration::new("/srv/worker/main.js", "ext-host")
    }

    #[test]
    fn test_parent_pid_is_injected() {
        let params = build_spawn_parameters(&test_config(), &test_snapshot());
        assert_eq!(params.env.get(PARENT_PID_ENV).map(String::as_str), Some("4321"));
        // Inherited entries survive the merge
        assert_eq!(params.env.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[test]
    fn test_overrides_win_on_collision() {
        let mut config = test_config();
        config.env.insert("HOME".to_string(), "/home/worker".to_string());
        config
            .env
            .insert(PARENT_PID_ENV.to_string(), "override".to_string());

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert_eq!(
            params.env.get("HOME").map(String::as_str),
            Some("/home/worker")
        );
        // Even the injected parent pid yields to an explicit override
        assert_eq!(
            params.env.get(PARENT_PID_ENV).map(String::as_str),
            Some("override")
        );
    }

    #[test]
    fn test_no_debug_config_inherits_stripped_runtime_args() {
        let params = build_spawn_parameters(&test_config(), &test_snapshot());
        assert_eq!(
            params.runtime_args,
            vec!["--max-old-space-size=4096".to_string()]
        );
        assert!(!params.runtime_args.iter().any(|a| is_debug_flag(a)));
    }

    #[test]
    fn test_inherited_break_flag_is_stripped_too() {
        let mut host = test_snapshot();
        host.runtime_args = vec!["--inspect-brk=9229".to_string(), "--nolazy".to_string()];
        let params = build_spawn_parameters(&test_config(), &host);
        assert_eq!(params.runtime_args, vec!["--nolazy".to_string()]);
    }

    #[test]
    fn test_debug_port_injects_single_inspect_flag() {
        let mut config = test_config();
        config.debug_port = Some(5870);

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert_eq!(
            params.runtime_args,
            vec!["--nolazy".to_string(), "--inspect=5870".to_string()]
        );
    }

    #[test]
    fn test_debug_brk_port_wins_over_debug_port() {
        let mut config = test_config();
        config.debug_port = Some(5870);
        config.debug_brk_port = Some(5871);

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert_eq!(
            params.runtime_args,
            vec!["--nolazy".to_string(), "--inspect-brk=5871".to_string()]
        );
        assert_eq!(
            params
                .runtime_args
                .iter()
                .filter(|a| is_debug_flag(a))
                .count(),
            1
        );
    }

    #[test]
    fn test_fresh_argv_clears_runtime_args() {
        let mut config = test_config();
        config.fresh_argv = true;

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert!(params.runtime_args.is_empty());
    }

    #[test]
    fn test_debug_flag_wins_over_fresh_argv() {
        let mut config = test_config();
        config.fresh_argv = true;
        config.debug_port = Some(5870);

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert_eq!(
            params.runtime_args,
            vec!["--nolazy".to_string(), "--inspect=5870".to_string()]
        );
    }

    #[test]
    fn test_dylib_path_is_removed_on_macos() {
        let mut host = test_snapshot();
        host.platform = Platform::MacOs;
        host.env
            .insert("DYLD_LIBRARY_PATH".to_string(), "/opt/lib".to_string());

        let params = build_spawn_parameters(&test_config(), &host);
        assert!(!params.env.contains_key("DYLD_LIBRARY_PATH"));
    }

    #[test]
    fn test_dylib_path_removed_even_when_set_via_override() {
        let mut host = test_snapshot();
        host.platform = Platform::MacOs;

        let mut config = test_config();
        config
            .env
            .insert("DYLD_LIBRARY_PATH".to_string(), "/opt/lib".to_string());

        let params = build_spawn_parameters(&config, &host);
        assert!(!params.env.contains_key("DYLD_LIBRARY_PATH"));
    }

    #[test]
    fn test_dylib_path_survives_on_linux() {
        let mut host = test_snapshot();
        host.env
            .insert("DYLD_LIBRARY_PATH".to_string(), "/opt/lib".to_string());

        let params = build_spawn_parameters(&test_config(), &host);
        assert!(params.env.contains_key("DYLD_LIBRARY_PATH"));
    }

    #[test]
    fn test_module_args_and_label_pass_through() {
        let mut config = test_config();
        config.args = vec!["--connect".to_string(), "pipe:/run/host".to_string()];

        let params = build_spawn_parameters(&config, &test_snapshot());
        assert_eq!(params.module_path, "/srv/worker/main.js");
        assert_eq!(params.args, config.args);
        assert_eq!(params.worker_label, "ext-host");
    }
}
