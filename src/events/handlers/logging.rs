use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{EventHandler, WalletEvent};
use crate::observability::sanitization::{sanitize_invoice, sanitize_payment_hash};

/// Event handler that logs all events with appropriate levels and sanitization
pub struct LoggingEventHandler {
    include_poll_events: bool,
}

impl LoggingEventHandler {
    pub fn new(include_poll_events: bool) -> Self {
        Self {
            include_poll_events,
        }
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle(&self, event: WalletEvent) -> anyhow::Result<()> {
        match event {
            WalletEvent::InvoiceCreated {
                payment_hash,
                payment_request,
                amount_sat,
                memo,
                timestamp,
            } => {
                info!(
                    event_type = "invoice_created",
                    payment_hash = %sanitize_payment_hash(&payment_hash),
                    invoice = %sanitize_invoice(&payment_request),
                    amount_sat = amount_sat,
                    memo = %memo,
                    timestamp = %timestamp,
                    "Invoice created"
                );
            }
            WalletEvent::InvoicePaid {
                payment_hash,
                timestamp,
            } => {
                info!(
                    event_type = "invoice_paid",
                    payment_hash = %sanitize_payment_hash(&payment_hash),
                    timestamp = %timestamp,
                    "Invoice paid"
                );
            }
            WalletEvent::PaymentInitiated {
                payment_hash,
                amount_sat,
                invoice,
                timestamp,
            } => {
                info!(
                    event_type = "payment_initiated",
                    payment_hash = %sanitize_payment_hash(&payment_hash),
                    amount_sat = amount_sat,
                    invoice = %sanitize_invoice(&invoice),
                    timestamp = %timestamp,
                    "Payment initiated"
                );
            }
            WalletEvent::PaymentSucceeded {
                payment_hash,
                timestamp,
            } => {
                info!(
                    event_type = "payment_succeeded",
                    payment_hash = %sanitize_payment_hash(&payment_hash),
                    timestamp = %timestamp,
                    "Payment succeeded"
                );
            }
            WalletEvent::PaymentFailed {
                payment_hash,
                reason,
                timestamp,
            } => {
                warn!(
                    event_type = "payment_failed",
                    payment_hash = %sanitize_payment_hash(&payment_hash),
                    reason = %reason,
                    timestamp = %timestamp,
                    "Payment failed"
                );
            }
            WalletEvent::PaymentsReconciled {
                payment_count,
                include_pending,
                timestamp,
            } => {
                info!(
                    event_type = "payments_reconciled",
                    payment_count = payment_count,
                    include_pending = include_pending,
                    timestamp = %timestamp,
                    "Payment list reconciled"
                );
            }
            WalletEvent::PollStarted {
                poll_id,
                kind,
                payment_hash,
                timestamp,
            } => {
                if self.include_poll_events {
                    debug!(
                        event_type = "poll_started",
                        poll_id = %poll_id,
                        kind = %kind,
                        payment_hash = %sanitize_payment_hash(&payment_hash),
                        timestamp = %timestamp,
                        "Payment status poll started"
                    );
                }
            }
            WalletEvent::PollStopped {
                poll_id,
                kind,
                reason,
                timestamp,
            } => {
                if self.include_poll_events {
                    debug!(
                        event_type = "poll_stopped",
                        poll_id = %poll_id,
                        kind = %kind,
                        reason = %reason,
                        timestamp = %timestamp,
                        "Payment status poll stopped"
                    );
                }
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
