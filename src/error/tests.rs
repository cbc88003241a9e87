use anyhow::anyhow;
use serde_json::json;

use super::*;
use crate::notifications::NoticeKind;

#[test]
fn test_wallet_error_constructors() {
    let error = WalletError::validation_error("Invalid bolt11 string");
    assert_eq!(error.category, ErrorCategory::ValidationError);
    assert_eq!(error.message, "Invalid bolt11 string");
    assert!(error.details.is_none());

    let error = WalletError::insufficient_funds("Balance too low");
    assert_eq!(error.category, ErrorCategory::InsufficientFunds);

    let error = WalletError::invalid_state("No receive dialog open");
    assert_eq!(error.category, ErrorCategory::InvalidState);
}

#[test]
fn test_wallet_error_from_anyhow() {
    let error = WalletError::from(anyhow!("inner").context("outer"));
    assert_eq!(error.category, ErrorCategory::InternalError);
    assert_eq!(error.message, "outer: inner");
}

#[test]
fn test_wallet_error_from_repository() {
    let error = WalletError::from_repository(anyhow!("connection refused"));
    assert_eq!(error.category, ErrorCategory::RepositoryError);
    assert!(!error.is_user_error());
}

#[test]
fn test_wallet_error_display() {
    let error = WalletError::validation_error("Amount must be positive")
        .with_details(json!({ "amount": 0 }));
    assert_eq!(
        format!("{}", error),
        "VALIDATION_ERROR: Amount must be positive"
    );
    assert_eq!(error.details, Some(json!({ "amount": 0 })));
}

#[test]
fn test_validation_error_notice() {
    let notice = WalletError::validation_error("Invalid checksum").to_notice();
    assert_eq!(notice.kind, NoticeKind::Warning);
    assert_eq!(notice.message, "Invalid checksum.");
    assert_eq!(notice.caption.as_deref(), Some("400 Bad Request"));
    assert_eq!(notice.timeout, Some(ERROR_NOTICE_TIMEOUT));
}

#[test]
fn test_repository_error_notice() {
    let notice = WalletError::repository_error("Service unavailable").to_notice();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.caption.as_deref(), Some("502 Bad Gateway"));
}
