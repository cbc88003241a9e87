//! Read-only projections of controller state for the surrounding UI.

use std::sync::Arc;

use serde::Serialize;

use crate::aggregator::{aggregate, Bucket};
use crate::core::session::{ReceiveStatus, SendStatus};
use crate::types::{DecodedInvoice, Payment};

/// Wallet balance in sat: the sum of loaded payments, or the server figure
/// while the list is empty
pub fn balance_sat(payments: &[Payment], fallback_sat: i64) -> i64 {
    if payments.is_empty() {
        fallback_sat
    } else {
        payments.iter().map(Payment::sat).sum()
    }
}

/// Format with thousands separators, e.g. `1,234,567`
pub fn format_sat(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn can_pay(invoice: Option<&DecodedInvoice>, balance_sat: i64) -> bool {
    match invoice {
        Some(invoice) => i64::try_from(invoice.satoshis).map_or(false, |sat| sat <= balance_sat),
        None => false,
    }
}

pub fn pending_payments_exist(payments: &[Payment]) -> bool {
    payments.iter().any(|payment| payment.pending)
}

pub fn paid_payments(payments: &[Payment]) -> Vec<Payment> {
    payments
        .iter()
        .filter(|payment| payment.is_paid())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiveDialogView {
    pub show: bool,
    pub status: ReceiveStatus,
    pub payment_request: Option<String>,
    pub amount_sat: Option<u64>,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendDialogView {
    pub show: bool,
    pub status: SendStatus,
    pub raw_input: String,
    pub invoice: Option<Arc<DecodedInvoice>>,
}

/// Snapshot of everything the wallet page renders
#[derive(Debug, Clone, Serialize)]
pub struct WalletView {
    pub balance_sat: i64,
    pub formatted_balance: String,
    pub can_pay: bool,
    pub pending_payments_exist: bool,
    /// Newest first
    pub payments: Vec<Payment>,
    pub paid_payments: Vec<Payment>,
    pub receive: Option<ReceiveDialogView>,
    pub send: Option<SendDialogView>,
    pub camera_open: bool,
}

impl WalletView {
    pub fn chart(&self) -> Vec<Bucket> {
        aggregate(&self.payments)
    }
}
