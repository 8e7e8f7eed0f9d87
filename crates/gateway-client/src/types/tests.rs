//! Unit tests for types module.

use super::*;

// ============================================================================
// InitStatus Tests
// ============================================================================

#[test]
fn test_init_status_display() {
    assert_eq!(format!("{}", InitStatus::Success), "success");
    assert_eq!(format!("{}", InitStatus::Error), "error");
}

#[test]
fn test_init_status_deserialization() {
    let success: InitStatus = serde_json::from_str("\"success\"").unwrap();
    let error: InitStatus = serde_json::from_str("\"error\"").unwrap();

    assert_eq!(success, InitStatus::Success);
    assert_eq!(error, InitStatus::Error);
}

#[test]
fn test_init_status_rejects_unknown_value() {
    let result = serde_json::from_str::<InitStatus>("\"pending\"");
    assert!(result.is_err());
}

// ============================================================================
// InitResponse Tests
// ============================================================================

#[test]
fn test_init_response_success_without_message() {
    let response: InitResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();

    assert!(response.is_success());
    assert!(response.message.is_none());
}

#[test]
fn test_init_response_error_with_message() {
    let json = r#"{"status":"error","message":"login required","extra":1}"#;
    let response: InitResponse = serde_json::from_str(json).unwrap();

    assert!(!response.is_success());
    assert_eq!(response.message.as_deref(), Some("login required"));
}

// ============================================================================
// HealthResponse Tests
// ============================================================================

#[test]
fn test_health_response_ok() {
    let response: HealthResponse =
        serde_json::from_str(r#"{"status":"ok","version":"1.2.0"}"#).unwrap();

    assert!(response.is_ok());
    assert_eq!(response.version.as_deref(), Some("1.2.0"));
}

#[test]
fn test_health_response_degraded() {
    let response: HealthResponse = serde_json::from_str(r#"{"status":"degraded"}"#).unwrap();

    assert!(!response.is_ok());
    assert!(response.version.is_none());
}
