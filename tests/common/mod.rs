#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lnwallet::core::{ControllerConfig, WalletController};
use lnwallet::decoder::InvoiceDecoder;
use lnwallet::events::{EventBus, WalletEvent};
use lnwallet::notifications::{Notice, NoticeHandle, Notifier};
use lnwallet::repository::PaymentRepository;
use lnwallet::types::{
    CreatedInvoice, InvoiceTag, PaymentAck, PaymentStatus, RawInvoice, RawPayment, Wallet,
};
use tokio::sync::broadcast;

pub fn test_wallet(balance_msat: i64) -> Wallet {
    Wallet {
        id: "wallet-1".to_string(),
        name: "Test Wallet".to_string(),
        admin_key: Some("adminkey".to_string()),
        invoice_key: "invoicekey".to_string(),
        balance_msat,
    }
}

pub fn raw_payment(id: &str, amount_msat: i64, time: i64, pending: bool) -> RawPayment {
    RawPayment {
        checking_id: id.to_string(),
        pending,
        amount: amount_msat,
        fee: 0,
        memo: format!("memo {}", id),
        time,
        bolt11: String::new(),
        preimage: None,
        payment_hash: format!("hash-{}", id),
        extra: None,
    }
}

/// In-memory payments API.
///
/// `list_payments` snapshots the list when called; `get_payment_status`
/// reads the paid set when it responds.
#[derive(Default)]
pub struct MockRepository {
    payments: Mutex<Vec<RawPayment>>,
    paid: Mutex<HashSet<String>>,
    list_delays: Mutex<VecDeque<Duration>>,
    status_delay: Mutex<Option<Duration>>,
    list_flags: Mutex<Vec<bool>>,
    pub fail_create: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_pay: AtomicBool,
    pub fail_list: AtomicBool,
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub pay_calls: AtomicUsize,
    invoice_counter: AtomicUsize,
}

impl MockRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_payments(payments: Vec<RawPayment>) -> Arc<Self> {
        let repository = Self::default();
        *repository.payments.lock().unwrap() = payments;
        Arc::new(repository)
    }

    pub fn set_payments(&self, payments: Vec<RawPayment>) {
        *self.payments.lock().unwrap() = payments;
    }

    pub fn add_payment(&self, payment: RawPayment) {
        self.payments.lock().unwrap().push(payment);
    }

    pub fn mark_paid(&self, payment_hash: &str) {
        self.paid.lock().unwrap().insert(payment_hash.to_string());
    }

    /// Delay applied to the next `list_payments` calls, in order
    pub fn push_list_delay(&self, delay: Duration) {
        self.list_delays.lock().unwrap().push_back(delay);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_flags.lock().unwrap().len()
    }

    /// `include_pending` flag of every `list_payments` call so far
    pub fn list_flags(&self) -> Vec<bool> {
        self.list_flags.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentRepository for MockRepository {
    async fn create_invoice(
        &self,
        _wallet: &Wallet,
        amount_sat: u64,
        _memo: &str,
    ) -> Result<CreatedInvoice> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("500 Internal Server Error: node offline"));
        }
        let n = self.invoice_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedInvoice {
            payment_request: format!("lnbcrt{}n1mock{}", amount_sat, n),
            payment_hash: format!("invoice-hash-{}", n),
        })
    }

    async fn get_payment_status(&self, _wallet: &Wallet, payment_hash: &str) -> Result<PaymentStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        Ok(PaymentStatus {
            paid: self.paid.lock().unwrap().contains(payment_hash),
        })
    }

    async fn pay_invoice(&self, _wallet: &Wallet, _bolt11: &str) -> Result<PaymentAck> {
        self.pay_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pay.load(Ordering::SeqCst) {
            return Err(anyhow!("520: Payment failed: no route"));
        }
        Ok(PaymentAck {
            payment_hash: String::new(),
        })
    }

    async fn list_payments(&self, _wallet: &Wallet, include_pending: bool) -> Result<Vec<RawPayment>> {
        self.list_flags.lock().unwrap().push(include_pending);
        let snapshot = self.payments.lock().unwrap().clone();
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(snapshot)
    }
}

/// Decoder answering from a fixed table
#[derive(Default)]
pub struct StaticDecoder {
    invoices: HashMap<String, RawInvoice>,
}

impl StaticDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice(mut self, bolt11: &str, invoice: RawInvoice) -> Self {
        self.invoices.insert(bolt11.to_string(), invoice);
        self
    }
}

impl InvoiceDecoder for StaticDecoder {
    fn decode(&self, bolt11: &str) -> Result<RawInvoice> {
        self.invoices
            .get(bolt11)
            .cloned()
            .ok_or_else(|| anyhow!("Invalid payment request"))
    }
}

pub fn raw_invoice(amount_msat: u64, payment_hash: &str, timestamp: u64, expiry: Option<u64>) -> RawInvoice {
    let mut tags = vec![
        InvoiceTag::PaymentHash(payment_hash.to_string()),
        InvoiceTag::Description("test invoice".to_string()),
    ];
    if let Some(expiry) = expiry {
        tags.push(InvoiceTag::Expiry(expiry));
    }
    RawInvoice {
        amount_msat: Some(amount_msat),
        timestamp,
        tags,
    }
}

/// Notifier that remembers every notice
#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(NoticeHandle, Notice)>>,
    open: Mutex<HashSet<NoticeHandle>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|(_, notice)| notice.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices().pop()
    }

    pub fn was_shown(&self, message: &str) -> bool {
        self.notices().iter().any(|notice| notice.message == message)
    }

    /// Messages of persistent notices not yet dismissed
    pub fn open_messages(&self) -> Vec<String> {
        let open = self.open.lock().unwrap();
        self.shown
            .lock()
            .unwrap()
            .iter()
            .filter(|(handle, _)| open.contains(handle))
            .map(|(_, notice)| notice.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notice: Notice) -> NoticeHandle {
        let handle = NoticeHandle::new();
        if notice.is_persistent() {
            self.open.lock().unwrap().insert(handle);
        }
        self.shown.lock().unwrap().push((handle, notice));
        handle
    }

    fn dismiss(&self, handle: NoticeHandle) {
        self.open.lock().unwrap().remove(&handle);
    }
}

pub struct TestHarness {
    pub controller: WalletController,
    pub repository: Arc<MockRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub event_bus: Arc<EventBus>,
}

impl TestHarness {
    pub fn new(repository: Arc<MockRepository>, decoder: impl InvoiceDecoder + 'static) -> Self {
        Self::with_wallet(test_wallet(0), repository, decoder)
    }

    pub fn with_wallet(
        wallet: Wallet,
        repository: Arc<MockRepository>,
        decoder: impl InvoiceDecoder + 'static,
    ) -> Self {
        Self::with_config(wallet, repository, decoder, ControllerConfig::default())
    }

    pub fn with_config(
        wallet: Wallet,
        repository: Arc<MockRepository>,
        decoder: impl InvoiceDecoder + 'static,
        config: ControllerConfig,
    ) -> Self {
        let notifier = RecordingNotifier::new();
        let event_bus = Arc::new(EventBus::new(64));
        let controller = WalletController::new(
            wallet,
            repository.clone(),
            Arc::new(decoder),
            notifier.clone(),
            event_bus.clone(),
            config,
        );

        Self {
            controller,
            repository,
            notifier,
            event_bus,
        }
    }
}

/// Drain every event already published
pub fn drain_events(receiver: &mut broadcast::Receiver<WalletEvent>) -> Vec<WalletEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
