use std::fmt;
use std::time::Duration;

use tracing::{error, warn};

pub mod categories;

pub use categories::ErrorCategory;

use crate::notifications::Notice;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

pub type Result<T, E = WalletError> = std::result::Result<T, E>;

/// How long error notices stay on screen
pub const ERROR_NOTICE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct WalletError {
    pub category: ErrorCategory,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WalletError {
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors for common error types
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::ValidationError, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InvalidState, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InsufficientFunds, message)
    }

    pub fn invoice_expired(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InvoiceExpired, message)
    }

    pub fn repository_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::RepositoryError, message)
    }

    pub fn poll_observation_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::PollObservationError, message)
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::ConfigurationError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InternalError, message)
    }

    pub fn with_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Classify an adapter failure from the payment repository
    pub fn from_repository(err: anyhow::Error) -> Self {
        Self::repository_error(format!("{:#}", err))
    }

    pub fn is_user_error(&self) -> bool {
        self.category.is_user_error()
    }

    /// Render the error as a dismissable notice and log it once
    pub fn to_notice(&self) -> Notice {
        if self.is_user_error() {
            warn!(
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                details = ?self.details,
                "User error"
            );
        } else {
            error!(
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                details = ?self.details,
                source = ?self.source,
                "Wallet operation failed"
            );
        }

        Notice::new(self.category.notice_kind(), format!("{}.", self.message))
            .with_caption(self.category.status_code().to_string())
            .with_timeout(ERROR_NOTICE_TIMEOUT)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for WalletError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// anyhow::Error already carries the full chain, so keep its alternate rendering
impl From<anyhow::Error> for WalletError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(format!("{:#}", err))
    }
}

impl From<toml::de::Error> for WalletError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration_error(format!("Invalid configuration file: {}", err)).with_source(err)
    }
}
