use std::fmt;

/// Configuration for sensitive data sanitization
#[derive(Clone, Debug)]
pub struct SanitizationConfig {
    /// Whether to redact the middle of bolt11 strings
    pub sanitize_invoices: bool,
    /// Maximum characters to show from start/end of sensitive data
    pub partial_show_chars: usize,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            sanitize_invoices: true,
            partial_show_chars: 6,
        }
    }
}

/// A wrapper for sensitive data that implements safe Display
#[derive(Clone, Debug)]
pub struct SensitiveData<T> {
    inner: T,
    data_type: SensitiveDataType,
    config: SanitizationConfig,
}

#[derive(Clone, Debug, Copy)]
pub enum SensitiveDataType {
    /// Lightning invoice (bolt11)
    LightningInvoice,
    /// Wallet admin or invoice key
    ApiKey,
    /// Payment hash
    PaymentHash,
}

impl SensitiveDataType {
    fn display_name(&self) -> &'static str {
        match self {
            Self::LightningInvoice => "invoice",
            Self::ApiKey => "api_key",
            Self::PaymentHash => "payment_hash",
        }
    }
}

impl<T: fmt::Display> SensitiveData<T> {
    pub fn new(data: T, data_type: SensitiveDataType) -> Self {
        Self {
            inner: data,
            data_type,
            config: SanitizationConfig::default(),
        }
    }

    pub fn with_config(data: T, data_type: SensitiveDataType, config: SanitizationConfig) -> Self {
        Self {
            inner: data,
            data_type,
            config,
        }
    }

    fn sanitized_repr(&self) -> String {
        let original = self.inner.to_string();

        let should_sanitize = match self.data_type {
            SensitiveDataType::LightningInvoice => self.config.sanitize_invoices,
            SensitiveDataType::ApiKey => true,
            SensitiveDataType::PaymentHash => false,
        };

        if !should_sanitize {
            return original;
        }

        let chars: Vec<char> = original.chars().collect();
        let show = self.config.partial_show_chars;
        if chars.len() <= show * 2 {
            format!(
                "[REDACTED_{}]",
                self.data_type.display_name().to_uppercase()
            )
        } else {
            let start: String = chars[..show].iter().collect();
            let end: String = chars[chars.len() - show..].iter().collect();

            format!(
                "{}[REDACTED_{}_{}_CHARS]{}",
                start,
                self.data_type.display_name().to_uppercase(),
                chars.len() - show * 2,
                end
            )
        }
    }
}

impl<T: fmt::Display> fmt::Display for SensitiveData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sanitized_repr())
    }
}

pub fn sanitize_invoice<T: fmt::Display>(invoice: T) -> SensitiveData<T> {
    SensitiveData::new(invoice, SensitiveDataType::LightningInvoice)
}

pub fn sanitize_api_key<T: fmt::Display>(key: T) -> SensitiveData<T> {
    SensitiveData::new(key, SensitiveDataType::ApiKey)
}

pub fn sanitize_payment_hash<T: fmt::Display>(hash: T) -> SensitiveData<T> {
    SensitiveData::new(hash, SensitiveDataType::PaymentHash)
}
