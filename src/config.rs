use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::ControllerConfig;
use crate::error::WalletError;
use crate::types::Wallet;

/// Name of the configuration file inside the data directory
pub const CONFIG_FILE_NAME: &str = "lnwallet.toml";

/// Configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the payments API
    #[serde(rename = "api-url", default = "default_api_url")]
    pub api_url: String,

    #[serde(rename = "wallet-id")]
    pub wallet_id: Option<String>,

    #[serde(rename = "wallet-name", default = "default_wallet_name")]
    pub wallet_name: String,

    /// Spending key, only needed to pay invoices
    #[serde(rename = "admin-key")]
    pub admin_key: Option<String>,

    /// Read/receive key
    #[serde(rename = "invoice-key")]
    pub invoice_key: Option<String>,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Poll periods and grace delays
    #[serde(rename = "timing", default)]
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            wallet_id: None,
            wallet_name: default_wallet_name(),
            admin_key: None,
            invoice_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            timing: TimingConfig::default(),
        }
    }
}

/// Controller timing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TimingConfig {
    pub receive_poll_interval_ms: u64,
    pub receive_close_grace_ms: u64,
    pub send_poll_interval_ms: u64,
    pub send_close_grace_ms: u64,
    pub pending_sweep_delay_ms: u64,
    pub validation_notice_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            receive_poll_interval_ms: 2000,
            receive_close_grace_ms: 10_000,
            send_poll_interval_ms: 2000,
            send_close_grace_ms: 1000,
            pending_sweep_delay_ms: 1100,
            validation_notice_timeout_ms: 3000,
        }
    }
}

impl TimingConfig {
    /// Poll periods must be non-zero; grace delays may be zero
    pub fn validate(&self) -> std::result::Result<(), WalletError> {
        for (key, value) in [
            ("receive-poll-interval-ms", self.receive_poll_interval_ms),
            ("send-poll-interval-ms", self.send_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(WalletError::configuration_error(format!(
                    "timing.{} must be greater than zero",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            receive_poll_interval: Duration::from_millis(self.receive_poll_interval_ms),
            receive_close_grace: Duration::from_millis(self.receive_close_grace_ms),
            send_poll_interval: Duration::from_millis(self.send_poll_interval_ms),
            send_close_grace: Duration::from_millis(self.send_close_grace_ms),
            pending_sweep_delay: Duration::from_millis(self.pending_sweep_delay_ms),
            validation_notice_timeout: Duration::from_millis(self.validation_notice_timeout_ms),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;
        config.timing.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file atomically
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;

        // The config file is never left partially written
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;

        match std::fs::rename(&temp_path, path) {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e.into())
            }
        }
    }

    /// Load the configuration file, writing defaults when it is missing or
    /// unreadable. Returns whether a new file was written.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => return Ok((config, false)),
                // Out-of-range values are reported, not overwritten
                Err(e) if e.is::<WalletError>() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Configuration file is corrupted, replacing it with defaults"
                    );
                }
            }
        }

        let config = Self::default();
        config.save_to_file(path)?;
        Ok((config, true))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The wallet described by this configuration.
    ///
    /// The configuration carries no balance, so `balance_msat` starts at 0;
    /// callers fill it from [`LnbitsClient::wallet_details`](crate::repository::LnbitsClient::wallet_details).
    pub fn wallet(&self) -> std::result::Result<Wallet, WalletError> {
        let id = non_empty(&self.wallet_id).ok_or_else(|| {
            WalletError::validation_error("Missing wallet id (set wallet-id or LNWALLET_WALLET_ID)")
        })?;
        let invoice_key = non_empty(&self.invoice_key).ok_or_else(|| {
            WalletError::validation_error(
                "Missing invoice key (set invoice-key or LNWALLET_INVOICE_KEY)",
            )
        })?;

        Ok(Wallet {
            id: id.to_string(),
            name: self.wallet_name.clone(),
            admin_key: non_empty(&self.admin_key).map(str::to_string),
            invoice_key: invoice_key.to_string(),
            balance_msat: 0,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// Default value functions
fn default_api_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_wallet_name() -> String {
    "My Wallet".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
