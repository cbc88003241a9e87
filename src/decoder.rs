//! Payment request decoding.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use lightning_invoice::{Bolt11Invoice, TaggedField};

use crate::types::{InvoiceTag, RawInvoice};

const LIGHTNING_URI_PREFIX: &str = "lightning:";

/// Turns a payment request string into its structured fields
pub trait InvoiceDecoder: Send + Sync {
    fn decode(&self, bolt11: &str) -> Result<RawInvoice>;
}

/// Strips whitespace and a `lightning:` URI scheme, as scanned from QR codes
pub fn normalize_payment_request(input: &str) -> &str {
    let trimmed = input.trim();
    match trimmed.get(..LIGHTNING_URI_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(LIGHTNING_URI_PREFIX) => {
            trimmed[LIGHTNING_URI_PREFIX.len()..].trim_start()
        }
        _ => trimmed,
    }
}

/// BOLT11 decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct Bolt11Decoder;

impl InvoiceDecoder for Bolt11Decoder {
    fn decode(&self, bolt11: &str) -> Result<RawInvoice> {
        let bolt11 = normalize_payment_request(bolt11);
        if bolt11.is_empty() {
            return Err(anyhow!("Empty payment request"));
        }

        let invoice = Bolt11Invoice::from_str(bolt11)
            .map_err(|e| anyhow!("Invalid payment request: {}", e))?;

        let tags = invoice
            .tagged_fields()
            .map(|field| match field {
                TaggedField::PaymentHash(hash) => InvoiceTag::PaymentHash(hash.0.to_string()),
                TaggedField::Description(description) => {
                    InvoiceTag::Description(description.to_string())
                }
                TaggedField::ExpiryTime(expiry) => InvoiceTag::Expiry(expiry.as_seconds()),
                TaggedField::DescriptionHash(_) => InvoiceTag::Other("description_hash".into()),
                TaggedField::PayeePubKey(_) => InvoiceTag::Other("payee".into()),
                TaggedField::PaymentSecret(_) => InvoiceTag::Other("payment_secret".into()),
                TaggedField::Fallback(_) => InvoiceTag::Other("fallback_address".into()),
                TaggedField::PrivateRoute(_) => InvoiceTag::Other("routing_info".into()),
                _ => InvoiceTag::Other("unknown".into()),
            })
            .collect();

        Ok(RawInvoice {
            amount_msat: invoice.amount_milli_satoshis(),
            timestamp: invoice.duration_since_epoch().as_secs(),
            tags,
        })
    }
}
