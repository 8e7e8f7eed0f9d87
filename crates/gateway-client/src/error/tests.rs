//! Unit tests for error module.

use super::*;

#[test]
fn test_api_error_display() {
    let error = Error::Api {
        status: 502,
        message: "Broker unavailable".to_string(),
    };

    let display = format!("{}", error);
    assert!(display.contains("502"));
    assert!(display.contains("Broker unavailable"));
}

#[test]
fn test_not_found_error_display() {
    let error = Error::NotFound("/api/ws/init".to_string());

    let display = format!("{}", error);
    assert!(display.contains("Not found"));
    assert!(display.contains("/api/ws/init"));
}

#[test]
fn test_init_rejected_error_display() {
    let error = Error::InitRejected("access token expired".to_string());

    assert_eq!(
        format!("{}", error),
        "Stream session init rejected: access token expired"
    );
}

#[test]
fn test_invalid_url_error_from_parse_error() {
    let parse_error = url::Url::parse("not a url").unwrap_err();
    let error: Error = parse_error.into();

    assert!(format!("{}", error).starts_with("Invalid URL"));
}

#[test]
fn test_error_debug() {
    let error = Error::Api {
        status: 500,
        message: "Internal server error".to_string(),
    };

    let debug = format!("{:?}", error);
    assert!(debug.contains("Api"));
    assert!(debug.contains("500"));
}
