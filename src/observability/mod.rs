pub mod logging;
pub mod sanitization;

pub use logging::{init_logging, LoggingConfig};
pub use sanitization::{
    sanitize_api_key, sanitize_invoice, sanitize_payment_hash, SanitizationConfig, SensitiveData,
    SensitiveDataType,
};
