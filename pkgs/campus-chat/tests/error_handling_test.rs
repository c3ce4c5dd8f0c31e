//! Error handling tests for campus-chat
//!
//! Tests error variants and their messages

use campus_chat::{ChatError, RequestStatus};
use sea_orm::DbErr;

#[test]
fn test_validation_error() {
    let error = ChatError::Validation("a message needs text or an attachment".to_string());

    assert!(matches!(error, ChatError::Validation(_)));
    assert!(error.to_string().contains("Invalid message"));
    assert!(!error.is_transport());
}

#[test]
fn test_duplicate_request_error() {
    let error = ChatError::DuplicateRequest {
        sender: "s1".to_string(),
        receiver: "s2".to_string(),
    };

    assert!(error.to_string().contains("already sent"));
    assert!(error.to_string().contains("s1"));
    assert!(error.to_string().contains("s2"));
}

#[test]
fn test_invalid_state_error_names_status() {
    let error = ChatError::InvalidState {
        request_id: "req-1".to_string(),
        status: RequestStatus::Rejected,
    };

    assert!(error.to_string().contains("req-1"));
    assert!(error.to_string().contains("rejected"));
}

#[test]
fn test_request_not_found_error() {
    let error = ChatError::RequestNotFound("req-404".to_string());

    assert!(matches!(error, ChatError::RequestNotFound(_)));
    assert!(error.to_string().contains("Chat request not found"));
    assert!(error.to_string().contains("req-404"));
}

#[test]
fn test_consent_required_error() {
    let error = ChatError::ConsentRequired {
        sender: "s1".to_string(),
        receiver: "s2".to_string(),
    };

    assert!(error.to_string().contains("accepted chat request"));
}

#[test]
fn test_transport_error_from_db_err() {
    let error: ChatError = DbErr::Custom("disk I/O error".to_string()).into();

    assert!(error.is_transport());
    assert!(error.to_string().contains("Transport error"));
    assert!(error.to_string().contains("disk I/O error"));
}

#[test]
fn test_error_debug() {
    let error = ChatError::Upload("bucket unavailable".to_string());
    let debug_str = format!("{:?}", error);

    assert!(debug_str.contains("Upload"));
    assert!(debug_str.contains("bucket unavailable"));
}
