use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::notifications::NoticeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // User errors
    ValidationError,
    InvalidState,
    InsufficientFunds,
    InvoiceExpired,

    // Repository errors
    RepositoryError,
    PollObservationError,

    // System errors
    ConfigurationError,
    InternalError,
}

impl ErrorCategory {
    /// HTTP status matching the category, shown as the notice caption
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::InvalidState => StatusCode::CONFLICT,
            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            Self::InvoiceExpired => StatusCode::GONE,
            Self::RepositoryError | Self::PollObservationError => StatusCode::BAD_GATEWAY,
            Self::ConfigurationError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::InvoiceExpired => "INVOICE_EXPIRED",
            Self::RepositoryError => "REPOSITORY_ERROR",
            Self::PollObservationError => "POLL_OBSERVATION_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Errors the user can fix by changing their input or retrying the action
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::InvalidState
                | Self::InsufficientFunds
                | Self::InvoiceExpired
        )
    }

    pub fn notice_kind(&self) -> NoticeKind {
        if self.is_user_error() {
            NoticeKind::Warning
        } else {
            NoticeKind::Error
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code())
    }
}
