//! Tests for error handling

use cortex_config::ConfigError;
use std::io;

#[test]
fn test_io_error_display() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err = ConfigError::Io(io_err);

    let display = format!("{}", err);
    assert!(display.contains("config io error"));
    assert!(display.contains("file not found"));
}

#[test]
fn test_json_error_display() {
    let json_err: serde_json::Error =
        serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let err = ConfigError::Json(json_err);

    assert!(err.to_string().contains("config parse error"));
}

#[test]
fn test_invalid_error_display() {
    let err = ConfigError::Invalid("strategy.max_steps must be at least 1".to_string());
    assert_eq!(
        err.to_string(),
        "invalid config: strategy.max_steps must be at least 1"
    );
}

#[test]
fn test_error_trait() {
    fn check_error_trait<T: std::error::Error + Send + Sync + 'static>() {}
    check_error_trait::<ConfigError>();
}

#[test]
fn test_io_error_from() {
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "no permission");
    let err: ConfigError = io_err.into();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_json_error_from() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json").unwrap_err();
    let err: ConfigError = json_err.into();
    assert!(matches!(err, ConfigError::Json(_)));
}
