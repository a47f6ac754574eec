//! Tests for core error types

use crate::CoreError;

#[test]
fn test_error_codes() {
    assert_eq!(
        CoreError::ConfigurationError("test".to_string()).code(),
        "CORE001"
    );
    assert_eq!(
        CoreError::ValidationError("test".to_string()).code(),
        "CORE002"
    );
    assert_eq!(
        CoreError::InitializationError("test".to_string()).code(),
        "CORE003"
    );
    assert_eq!(CoreError::ProcessSpawn("test".to_string()).code(), "CORE004");
    assert_eq!(CoreError::ProcessWait("test".to_string()).code(), "CORE005");
    assert_eq!(CoreError::ProcessSignal("test".to_string()).code(), "CORE006");
    assert_eq!(CoreError::Other("test".to_string()).code(), "CORE999");
}

#[test]
fn test_error_display() {
    let error = CoreError::ProcessSpawn("worker binary missing".to_string());
    assert_eq!(
        error.to_string(),
        "Process spawn error: worker binary missing"
    );
}

#[test]
fn test_from_implementations() {
    let error: CoreError = "test error".into();
    assert_eq!(error.to_string(), "Generic error: test error");

    let error: CoreError = "test error".to_string().into();
    assert_eq!(error.to_string(), "Generic error: test error");
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: CoreError = io.into();
    assert_eq!(error.code(), "CORE007");
}
