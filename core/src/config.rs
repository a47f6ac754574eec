//! Configuration loading and validation for worker launches
//!
//! This module parses a TOML configuration into `schema::LaunchConfiguration`
//! values, applies defaults (via serde defaults on schema types), and
//! performs strict validation with field-path error messages.

use crate::{CoreError, Result};
use schema::LaunchConfiguration;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Top-level TOML structure for the workers configuration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkersFile {
    /// List of workers to launch and supervise
    pub workers: Vec<LaunchConfiguration>,
}

impl WorkersFile {
    /// Validate the configuration and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(CoreError::ValidationError(
                "workers: must contain at least one worker".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, worker) in self.workers.iter().enumerate() {
            if worker.worker_label.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "workers[{}].workerLabel: cannot be empty",
                    i
                )));
            }
            if !seen.insert(worker.worker_label.clone()) {
                return Err(CoreError::ValidationError(format!(
                    "workers[{}].workerLabel: duplicate label '{}'",
                    i, worker.worker_label
                )));
            }
            if worker.module_path.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "workers[{}].modulePath: cannot be empty",
                    i
                )));
            }

            for (k, _v) in worker.env.iter() {
                if k.trim().is_empty() {
                    return Err(CoreError::ValidationError(format!(
                        "workers[{}].env: keys cannot be empty",
                        i
                    )));
                }
            }

            if worker.debug_port == Some(0) {
                return Err(CoreError::ValidationError(format!(
                    "workers[{}].debugPort: must be 1..=65535",
                    i
                )));
            }
            if worker.debug_brk_port == Some(0) {
                return Err(CoreError::ValidationError(format!(
                    "workers[{}].debugBrkPort: must be 1..=65535",
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Load workers from a TOML file path
pub fn load_workers_from_toml_path(path: impl AsRef<Path>) -> Result<WorkersFile> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_workers_from_toml_str(&data)
}

/// Load workers from a TOML string
pub fn load_workers_from_toml_str(input: &str) -> Result<WorkersFile> {
    let cfg: WorkersFile = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> String {
        r#"
        [[workers]]
        modulePath = "/srv/workbench/worker/main.js"
        workerLabel = "ext-host"
        args = ["--pipe", "/tmp/workbench.sock"]
        freshArgv = true

        [workers.env]
        WORKBENCH_LOG_LEVEL = "info"

        [[workers]]
        modulePath = "/srv/workbench/search/main.js"
        workerLabel = "search"
        debugPort = 9229
        "#
        .to_string()
    }

    #[test]
    fn parses_and_validates_valid_config() {
        let cfg = load_workers_from_toml_str(&valid_config()).expect("should parse");
        assert_eq!(cfg.workers.len(), 2);
        assert_eq!(cfg.workers[0].worker_label, "ext-host");
        assert!(cfg.workers[0].fresh_argv);
        assert_eq!(
            cfg.workers[0].env.get("WORKBENCH_LOG_LEVEL"),
            Some(&"info".to_string())
        );
        assert_eq!(cfg.workers[1].debug_port, Some(9229));
    }

    #[test]
    fn errors_on_empty_workers() {
        let err = load_workers_from_toml_str("workers = []").unwrap_err();
        assert!(format!("{}", err).contains("workers: must contain at least one worker"));
    }

    #[test]
    fn errors_on_duplicate_labels() {
        let input = r#"
        [[workers]]
        modulePath = "/a/main.js"
        workerLabel = "dup"
        [[workers]]
        modulePath = "/b/main.js"
        workerLabel = "dup"
        "#;
        let err = load_workers_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("duplicate label"));
    }

    #[test]
    fn errors_on_empty_module_path() {
        let input = r#"
        [[workers]]
        modulePath = "  "
        workerLabel = "w"
        "#;
        let err = load_workers_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("modulePath: cannot be empty"));
    }

    #[test]
    fn errors_on_zero_debug_port() {
        let input = r#"
        [[workers]]
        modulePath = "/a/main.js"
        workerLabel = "w"
        debugBrkPort = 0
        "#;
        let err = load_workers_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("debugBrkPort"));
    }

    #[test]
    fn loads_from_file_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(valid_config().as_bytes()).expect("write");
        let cfg = load_workers_from_toml_path(file.path()).expect("should load");
        assert_eq!(cfg.workers.len(), 2);
    }
}
