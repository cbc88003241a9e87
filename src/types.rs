use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::view::format_sat;

/// Wallet the controller operates on
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    /// Key allowed to spend, only needed for outgoing payments
    pub admin_key: Option<String>,
    pub invoice_key: String,
    /// Balance reported by the server, used while no payments are loaded
    pub balance_msat: i64,
}

impl Wallet {
    pub fn fallback_balance_sat(&self) -> i64 {
        msat_to_sat(self.balance_msat)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("admin_key", &self.admin_key.as_ref().map(|_| "[REDACTED]"))
            .field("invoice_key", &"[REDACTED]")
            .field("balance_msat", &self.balance_msat)
            .finish()
    }
}

/// Integer msat to sat conversion, truncating toward zero
pub fn msat_to_sat(msat: i64) -> i64 {
    msat / 1000
}

/// Payment as returned by the payments API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayment {
    pub checking_id: String,
    #[serde(default)]
    pub pending: bool,
    /// Signed amount in msat, negative for outgoing payments
    pub amount: i64,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub memo: String,
    /// Unix timestamp in seconds
    pub time: i64,
    #[serde(default)]
    pub bolt11: String,
    #[serde(default)]
    pub preimage: Option<String>,
    #[serde(default)]
    pub payment_hash: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

/// Payment row held by the controller and shown in the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: String,
    pub amount_msat: i64,
    pub fee_msat: i64,
    pub memo: String,
    pub time: DateTime<Utc>,
    pub pending: bool,
    pub payment_hash: String,
    pub bolt11: String,
}

impl Payment {
    pub fn from_raw(raw: RawPayment) -> Self {
        let time = Utc
            .timestamp_opt(raw.time, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Self {
            id: raw.checking_id,
            amount_msat: raw.amount,
            fee_msat: raw.fee,
            memo: raw.memo,
            time,
            pending: raw.pending,
            payment_hash: raw.payment_hash,
            bolt11: raw.bolt11,
        }
    }

    pub fn sat(&self) -> i64 {
        msat_to_sat(self.amount_msat)
    }

    pub fn fsat(&self) -> String {
        format_sat(self.sat())
    }

    pub fn is_in(&self) -> bool {
        self.amount_msat > 0
    }

    pub fn is_out(&self) -> bool {
        self.amount_msat < 0
    }

    pub fn is_paid(&self) -> bool {
        !self.pending
    }

    /// Date column of the payments table
    pub fn date(&self) -> String {
        self.time.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Wallet summary reported by the payments API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDetails {
    pub id: String,
    pub name: String,
    /// Balance in msat
    pub balance: i64,
}

/// Result of creating an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub payment_request: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub paid: bool,
}

/// Acknowledgement of an accepted pay request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAck {
    #[serde(default)]
    pub payment_hash: String,
}

/// Tagged field of a parsed payment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceTag {
    PaymentHash(String),
    Description(String),
    /// Expiry in seconds from the invoice timestamp
    Expiry(u64),
    Other(String),
}

/// Structured fields of a payment request as produced by an invoice decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInvoice {
    pub amount_msat: Option<u64>,
    /// Creation time, unix seconds
    pub timestamp: u64,
    pub tags: Vec<InvoiceTag>,
}

/// Invoice decoded for the send dialog.
///
/// Shared behind an `Arc` once decoded and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedInvoice {
    pub payment_request: String,
    pub payment_hash: String,
    pub amount_msat: u64,
    pub satoshis: u64,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub expire_date: Option<DateTime<Utc>>,
}

impl DecodedInvoice {
    pub fn from_raw(payment_request: impl Into<String>, raw: RawInvoice) -> Result<Self, WalletError> {
        let amount_msat = raw
            .amount_msat
            .ok_or_else(|| WalletError::validation_error("Invoice has no amount"))?;

        let timestamp = i64::try_from(raw.timestamp)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| WalletError::validation_error("Invoice timestamp out of range"))?;

        let mut payment_hash = None;
        let mut description = None;
        let mut expire_date = None;

        for tag in raw.tags {
            match tag {
                InvoiceTag::PaymentHash(hash) => payment_hash = Some(hash),
                InvoiceTag::Description(text) => description = Some(text),
                InvoiceTag::Expiry(secs) => {
                    let expiry = i64::try_from(secs)
                        .ok()
                        .and_then(ChronoDuration::try_seconds)
                        .ok_or_else(|| WalletError::validation_error("Invoice expiry out of range"))?;
                    expire_date = timestamp.checked_add_signed(expiry);
                }
                InvoiceTag::Other(_) => {}
            }
        }

        let payment_hash = payment_hash
            .ok_or_else(|| WalletError::validation_error("Invoice has no payment hash"))?;

        Ok(Self {
            payment_request: payment_request.into(),
            payment_hash,
            amount_msat,
            satoshis: amount_msat / 1000,
            description,
            timestamp,
            expire_date,
        })
    }

    pub fn fsat(&self) -> String {
        format_sat(self.satoshis as i64)
    }

    /// Expiration as `YYYY-MM-DDTHH:mm:ss.SSSZ`
    pub fn expire_date_string(&self) -> Option<String> {
        self.expire_date
            .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Invoices without an expiry tag never expire here
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_date.map(|date| now >= date).unwrap_or(false)
    }
}
