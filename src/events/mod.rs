use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

pub mod handlers;

/// Which workflow a poll belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    Receive,
    Send,
}

impl std::fmt::Display for PollKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollKind::Receive => write!(f, "receive"),
            PollKind::Send => write!(f, "send"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    // Receive events
    InvoiceCreated {
        payment_hash: String,
        payment_request: String,
        amount_sat: u64,
        memo: String,
        timestamp: DateTime<Utc>,
    },
    InvoicePaid {
        payment_hash: String,
        timestamp: DateTime<Utc>,
    },

    // Send events
    PaymentInitiated {
        payment_hash: String,
        amount_sat: u64,
        invoice: String,
        timestamp: DateTime<Utc>,
    },
    PaymentSucceeded {
        payment_hash: String,
        timestamp: DateTime<Utc>,
    },
    PaymentFailed {
        payment_hash: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // Reconciliation
    PaymentsReconciled {
        payment_count: usize,
        include_pending: bool,
        timestamp: DateTime<Utc>,
    },

    // Polling
    PollStarted {
        poll_id: String,
        kind: PollKind,
        payment_hash: String,
        timestamp: DateTime<Utc>,
    },
    PollStopped {
        poll_id: String,
        kind: PollKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl WalletEvent {
    /// Generate a unique event ID
    pub fn event_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::InvoiceCreated { timestamp, .. }
            | WalletEvent::InvoicePaid { timestamp, .. }
            | WalletEvent::PaymentInitiated { timestamp, .. }
            | WalletEvent::PaymentSucceeded { timestamp, .. }
            | WalletEvent::PaymentFailed { timestamp, .. }
            | WalletEvent::PaymentsReconciled { timestamp, .. }
            | WalletEvent::PollStarted { timestamp, .. }
            | WalletEvent::PollStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Payment hash the event refers to, if any
    pub fn payment_hash(&self) -> Option<&str> {
        match self {
            WalletEvent::InvoiceCreated { payment_hash, .. }
            | WalletEvent::InvoicePaid { payment_hash, .. }
            | WalletEvent::PaymentInitiated { payment_hash, .. }
            | WalletEvent::PaymentSucceeded { payment_hash, .. }
            | WalletEvent::PaymentFailed { payment_hash, .. }
            | WalletEvent::PollStarted { payment_hash, .. } => Some(payment_hash),
            WalletEvent::PaymentsReconciled { .. } | WalletEvent::PollStopped { .. } => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::InvoiceCreated { .. } => "invoice_created",
            WalletEvent::InvoicePaid { .. } => "invoice_paid",
            WalletEvent::PaymentInitiated { .. } => "payment_initiated",
            WalletEvent::PaymentSucceeded { .. } => "payment_succeeded",
            WalletEvent::PaymentFailed { .. } => "payment_failed",
            WalletEvent::PaymentsReconciled { .. } => "payments_reconciled",
            WalletEvent::PollStarted { .. } => "poll_started",
            WalletEvent::PollStopped { .. } => "poll_stopped",
        }
    }
}

/// Trait for handling events asynchronously
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: WalletEvent) -> anyhow::Result<()>;

    /// Get the name of this handler for identification
    fn name(&self) -> &str;

    /// Critical handlers are awaited before `publish` returns
    fn is_critical(&self) -> bool {
        false
    }
}

/// Event bus for distributing events to multiple handlers
pub struct EventBus {
    sender: broadcast::Sender<WalletEvent>,
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    max_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("max_capacity", &self.max_capacity)
            .field(
                "handlers_count",
                &self.handlers.try_read().map(|h| h.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            max_capacity: capacity,
        }
    }

    pub async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        debug!(
            handler_name = %handler.name(),
            total_handlers = handlers.len() + 1,
            "Event handler registered"
        );
        handlers.push(handler);
    }

    /// Publish an event to subscribers and registered handlers.
    ///
    /// Having nobody listening is not an error.
    pub async fn publish(&self, event: WalletEvent) {
        let event_id = event.event_id();
        let event_type = event.event_type();

        match self.sender.send(event.clone()) {
            Ok(subscriber_count) => {
                debug!(
                    event_id = %event_id,
                    event_type = %event_type,
                    subscriber_count = subscriber_count,
                    "Event broadcast to subscribers"
                );
            }
            Err(broadcast::error::SendError(_)) => {
                debug!(
                    event_id = %event_id,
                    event_type = %event_type,
                    "Event published but no active subscribers"
                );
            }
        }

        let handlers = self.handlers.read().await;
        let mut critical = Vec::new();

        for handler in handlers.iter() {
            let is_critical = handler.is_critical();
            let handler = handler.clone();
            let event = event.clone();
            let event_id = event_id.clone();

            let task = async move {
                if let Err(e) = handler.handle(event).await {
                    error!(
                        event_id = %event_id,
                        handler_name = %handler.name(),
                        error = ?e,
                        "Event handler failed"
                    );
                }
            };

            if is_critical {
                critical.push(task);
            } else {
                tokio::spawn(task);
            }
        }

        futures::future::join_all(critical).await;
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.sender.subscribe()
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}
