//! Message envelope protocol for the host/worker channel
//!
//! Every inbound message from a worker is classified into one of three
//! shapes before the supervisor acts on it:
//!
//! - **Ready**: the handshake message the worker sends once its extension
//!   runtime is operational. Recognized by the `type` discriminator field.
//! - **Log**: a remote console log record the worker forwards instead of
//!   writing to its own console. These are routed to the host's logging
//!   sink and never surfaced as lifecycle events.
//! - **Opaque**: everything else, handed to the caller untouched.
//!
//! Classification is total and never fails: malformed or unrecognized
//! messages simply fall through to `Opaque`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator value the worker must send to be recognized as ready
pub const READY_MESSAGE_TYPE: &str = "ARCTURUS_WORKER_IPC_READY";

/// Discriminator value for remote console log records
pub const CONSOLE_LOG_TYPE: &str = "__$console";

/// A console log record forwarded from the worker process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConsoleLog {
    /// Severity label as reported by the worker ("log", "info", "warn", "error")
    pub severity: String,
    /// Structured arguments of the original console call, JSON-encoded
    pub arguments: String,
}

impl RemoteConsoleLog {
    /// Map the worker-reported severity label onto a known level.
    /// Unknown labels fall back to [`LogSeverity::Log`].
    #[must_use]
    pub fn severity_level(&self) -> LogSeverity {
        match self.severity.as_str() {
            "info" => LogSeverity::Info,
            "warn" => LogSeverity::Warn,
            "error" => LogSeverity::Error,
            _ => LogSeverity::Log,
        }
    }
}

/// Known severity levels for remote console log records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LogSeverity {
    /// Plain console output
    Log,
    /// Informational output
    Info,
    /// Warning output
    Warn,
    /// Error output
    Error,
}

/// A classified inbound message from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Handshake message; payload is the full raw message
    Ready(Value),
    /// Remote console log record, routed to the logging sink
    Log(RemoteConsoleLog),
    /// Unrecognized message, passed through to the caller untouched
    Opaque(Value),
}

impl Envelope {
    /// Classify a raw inbound message.
    ///
    /// A message is `Ready` iff its `type` field equals
    /// [`READY_MESSAGE_TYPE`]; it is `Log` iff its `type` field equals
    /// [`CONSOLE_LOG_TYPE`] and it carries the severity/arguments fields of
    /// a [`RemoteConsoleLog`]. Everything else is `Opaque`.
    #[must_use]
    pub fn classify(raw: Value) -> Self {
        match raw.get("type").and_then(Value::as_str) {
            Some(READY_MESSAGE_TYPE) => Envelope::Ready(raw),
            Some(CONSOLE_LOG_TYPE) => {
                match serde_json::from_value::<RemoteConsoleLog>(raw.clone()) {
                    Ok(record) => Envelope::Log(record),
                    // Console-typed but missing the log fields; not ours to interpret
                    Err(_) => Envelope::Opaque(raw),
                }
            }
            _ => Envelope::Opaque(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_message_classification() {
        let raw = json!({ "type": READY_MESSAGE_TYPE });
        match Envelope::classify(raw.clone()) {
            Envelope::Ready(payload) => assert_eq!(payload, raw),
            other => panic!("Expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_ready_payload_is_preserved() {
        let raw = json!({ "type": READY_MESSAGE_TYPE, "pid": 4242 });
        match Envelope::classify(raw) {
            Envelope::Ready(payload) => assert_eq!(payload["pid"], 4242),
            other => panic!("Expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_console_log_classification() {
        let raw = json!({
            "type": CONSOLE_LOG_TYPE,
            "severity": "warn",
            "arguments": "[\"something happened\"]",
        });
        match Envelope::classify(raw) {
            Envelope::Log(record) => {
                assert_eq!(record.severity, "warn");
                assert_eq!(record.severity_level(), LogSeverity::Warn);
            }
            other => panic!("Expected Log, got {:?}", other),
        }
    }

    #[test]
    fn test_console_log_missing_fields_is_opaque() {
        let raw = json!({ "type": CONSOLE_LOG_TYPE, "severity": "warn" });
        assert!(matches!(Envelope::classify(raw), Envelope::Opaque(_)));
    }

    #[test]
    fn test_unknown_type_is_opaque() {
        let raw = json!({ "type": "somethingElse", "data": 1 });
        match Envelope::classify(raw.clone()) {
            Envelope::Opaque(payload) => assert_eq!(payload, raw),
            other => panic!("Expected Opaque, got {:?}", other),
        }
    }

    #[test]
    fn test_untyped_message_is_opaque() {
        assert!(matches!(
            Envelope::classify(json!({ "hello": "world" })),
            Envelope::Opaque(_)
        ));
        assert!(matches!(
            Envelope::classify(json!("not even an object")),
            Envelope::Opaque(_)
        ));
        assert!(matches!(Envelope::classify(json!(null)), Envelope::Opaque(_)));
    }

    #[test]
    fn test_severity_level_fallback() {
        let record = RemoteConsoleLog {
            severity: "bogus".to_string(),
            arguments: "[]".to_string(),
        };
        assert_eq!(record.severity_level(), LogSeverity::Log);
    }
}
