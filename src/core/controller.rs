//! Payment lifecycle controller for a single wallet page.
//!
//! Owns the payment list, the receive and send sessions and their status
//! polls. State lives behind one async mutex that is never held across a
//! repository call, so every transition between two awaits is atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::polling::{spawn_poll, PollFlow, PollHandle};
use super::session::{ReceiveSession, ReceiveStatus, SendSession, SendStatus};
use super::ControllerConfig;
use crate::aggregator::{aggregate, Bucket};
use crate::decoder::{normalize_payment_request, InvoiceDecoder};
use crate::error::{Result, WalletError};
use crate::events::{EventBus, PollKind, WalletEvent};
use crate::notifications::{Notice, NoticeHandle, Notifier};
use crate::observability::sanitization::sanitize_invoice;
use crate::repository::PaymentRepository;
use crate::types::{DecodedInvoice, Payment, Wallet};
use crate::view::{
    balance_sat, can_pay, format_sat, paid_payments, pending_payments_exist, WalletView,
};

const PAYMENT_PROGRESS_MESSAGE: &str = "Processing payment...";
const PENDING_CHECK_MESSAGE: &str = "Checking pending transactions...";

/// A fetched payment list waiting to replace the held one
#[derive(Debug)]
struct Snapshot {
    ticket: u64,
    include_pending: bool,
    payments: Vec<Payment>,
}

#[derive(Debug, Default)]
struct WalletState {
    /// Newest first, always a full snapshot from one fetch
    payments: Vec<Payment>,
    receive: Option<ReceiveSession>,
    send: Option<SendSession>,
    camera_open: bool,
    /// Ticket of the last snapshot written to `payments`
    committed_ticket: u64,
}

impl WalletState {
    /// Replace the payment list unless a later-started fetch already did
    fn commit(&mut self, snapshot: Snapshot) -> Option<usize> {
        if snapshot.ticket <= self.committed_ticket {
            debug!(
                ticket = snapshot.ticket,
                committed_ticket = self.committed_ticket,
                include_pending = snapshot.include_pending,
                "Discarding stale payment snapshot"
            );
            return None;
        }
        self.committed_ticket = snapshot.ticket;
        self.payments = snapshot.payments;
        Some(self.payments.len())
    }

    fn balance_sat(&self, wallet: &Wallet) -> i64 {
        balance_sat(&self.payments, wallet.fallback_balance_sat())
    }
}

#[derive(Clone)]
pub struct WalletController {
    wallet: Arc<Wallet>,
    repository: Arc<dyn PaymentRepository>,
    decoder: Arc<dyn InvoiceDecoder>,
    notifier: Arc<dyn Notifier>,
    event_bus: Arc<EventBus>,
    config: ControllerConfig,
    state: Arc<Mutex<WalletState>>,
    next_ticket: Arc<AtomicU64>,
}

impl std::fmt::Debug for WalletController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletController")
            .field("wallet", &self.wallet)
            .field("config", &self.config)
            .finish()
    }
}

impl WalletController {
    pub fn new(
        wallet: Wallet,
        repository: Arc<dyn PaymentRepository>,
        decoder: Arc<dyn InvoiceDecoder>,
        notifier: Arc<dyn Notifier>,
        event_bus: Arc<EventBus>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            wallet: Arc::new(wallet),
            repository,
            decoder,
            notifier,
            event_bus,
            config,
            state: Arc::new(Mutex::new(WalletState::default())),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Startup reconciliation followed by a delayed pending sweep.
    ///
    /// The sweep timer starts before the initial fetch so a slow first
    /// response cannot push it back. Returns the sweep task.
    #[instrument(skip(self), fields(wallet_id = %self.wallet.id))]
    pub async fn start(&self) -> JoinHandle<()> {
        info!(
            sweep_delay_ms = self.config.pending_sweep_delay.as_millis() as u64,
            "Starting wallet controller"
        );

        let controller = self.clone();
        let delay = self.config.pending_sweep_delay;
        let sweep = tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = controller.check_pending_payments().await {
                warn!(error = %e, "Pending payments sweep failed");
            }
        });

        if let Err(e) = self.fetch_payments(false).await {
            warn!(error = %e, "Initial payments fetch failed");
        }

        sweep
    }

    // Reconciliation

    /// Replace the payment list with the repository's current view.
    ///
    /// Returns the number of payments now held, or the held count when a
    /// newer fetch had already committed.
    pub async fn fetch_payments(&self, include_pending: bool) -> Result<usize> {
        let snapshot = match self.load_snapshot(include_pending).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.notifier.show(err.to_notice());
                return Err(err);
            }
        };

        let committed = self.state.lock().await.commit(snapshot);
        match committed {
            Some(count) => {
                self.publish_reconciled(count, include_pending).await;
                Ok(count)
            }
            None => Ok(self.state.lock().await.payments.len()),
        }
    }

    /// Re-fetch including pending payments behind a persistent notice
    pub async fn check_pending_payments(&self) -> Result<usize> {
        let notice = self.notifier.show(Notice::progress(PENDING_CHECK_MESSAGE));
        let result = self.fetch_payments(true).await;
        self.notifier.dismiss(notice);
        result
    }

    async fn load_snapshot(&self, include_pending: bool) -> Result<Snapshot> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let raw = self
            .repository
            .list_payments(&self.wallet, include_pending)
            .await
            .map_err(WalletError::from_repository)?;

        let mut payments: Vec<Payment> = raw.into_iter().map(Payment::from_raw).collect();
        payments.sort_by(|a, b| b.time.cmp(&a.time));

        Ok(Snapshot {
            ticket,
            include_pending,
            payments,
        })
    }

    // Receive workflow

    /// Show a fresh receive dialog, stopping the previous session's poll
    pub async fn open_receive(&self) {
        let replaced = {
            let mut state = self.state.lock().await;
            state
                .receive
                .replace(ReceiveSession::new())
                .and_then(|mut previous| previous.stop_poll())
        };

        if let Some(poll) = replaced {
            self.publish_poll_stopped(&poll, "replaced").await;
        }
    }

    /// Create an invoice for the open receive dialog and start watching it.
    ///
    /// Returns the payment request to display.
    #[instrument(skip(self, memo), fields(wallet_id = %self.wallet.id))]
    pub async fn request_invoice(&self, amount_sat: u64, memo: &str) -> Result<String> {
        if amount_sat == 0 {
            return Err(self.report(WalletError::validation_error(
                "Amount must be greater than zero",
            )));
        }

        let session_id = {
            let mut state = self.state.lock().await;
            let session = state
                .receive
                .as_mut()
                .ok_or_else(|| WalletError::invalid_state("Receive dialog is not open"))?;
            session.begin_request(amount_sat, memo)?;
            session.id
        };

        let created = match self
            .repository
            .create_invoice(&self.wallet, amount_sat, memo)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                let mut state = self.state.lock().await;
                if let Some(session) = state.receive.as_mut().filter(|s| s.id == session_id) {
                    session.request_failed();
                }
                drop(state);
                return Err(self.report(WalletError::from_repository(e)));
            }
        };

        let poll = {
            let mut state = self.state.lock().await;
            match state.receive.as_mut() {
                Some(session) if session.id == session_id && session.awaiting_invoice() => {
                    let poll = self.spawn_receive_poll(session_id, created.payment_hash.clone());
                    session.invoice_created(&created, poll.clone());
                    Some(poll)
                }
                _ => None,
            }
        };

        info!(
            payment_hash = %created.payment_hash,
            amount_sat = amount_sat,
            "Invoice created"
        );
        self.event_bus
            .publish(WalletEvent::InvoiceCreated {
                payment_hash: created.payment_hash.clone(),
                payment_request: created.payment_request.clone(),
                amount_sat,
                memo: memo.to_string(),
                timestamp: Utc::now(),
            })
            .await;

        match poll {
            Some(poll) => {
                self.publish_poll_started(&poll, &created.payment_hash).await;
            }
            None => {
                debug!(
                    payment_hash = %created.payment_hash,
                    "Receive dialog closed before the invoice arrived, not polling"
                );
            }
        }

        Ok(created.payment_request)
    }

    /// Hide the receive dialog; its poll is cancelled after the grace delay
    pub async fn close_receive(&self) {
        let poll = {
            let mut state = self.state.lock().await;
            state
                .receive
                .as_mut()
                .filter(|session| session.show)
                .and_then(ReceiveSession::hide)
        };

        if let Some(poll) = poll {
            self.schedule_grace_cancel(poll, self.config.receive_close_grace, None);
        }
    }

    fn spawn_receive_poll(&self, session_id: Uuid, payment_hash: String) -> PollHandle {
        let controller = self.clone();
        spawn_poll(
            PollKind::Receive,
            self.config.receive_poll_interval,
            move |handle| {
                let controller = controller.clone();
                let payment_hash = payment_hash.clone();
                async move {
                    controller
                        .receive_tick(handle, session_id, &payment_hash)
                        .await
                }
            },
        )
    }

    async fn receive_tick(&self, handle: PollHandle, session_id: Uuid, payment_hash: &str) -> PollFlow {
        let Some(snapshot) = self.observe_settlement(&handle, payment_hash).await else {
            return if handle.is_cancelled() {
                PollFlow::Stop
            } else {
                PollFlow::Continue
            };
        };

        let (committed, stopped) = {
            let mut state = self.state.lock().await;
            let committed = state.commit(snapshot);
            let stopped = state
                .receive
                .as_mut()
                .filter(|session| session.id == session_id)
                .and_then(ReceiveSession::settle);
            (committed, stopped)
        };

        info!(payment_hash = %payment_hash, "Invoice paid");
        self.event_bus
            .publish(WalletEvent::InvoicePaid {
                payment_hash: payment_hash.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        if let Some(count) = committed {
            self.publish_reconciled(count, false).await;
        }
        if let Some(poll) = stopped {
            self.publish_poll_stopped(&poll, "settled").await;
        }

        PollFlow::Stop
    }

    // Send workflow

    /// Show a fresh send dialog, releasing the previous session
    pub async fn open_send(&self) {
        let (replaced, notice) = {
            let mut state = self.state.lock().await;
            state.camera_open = false;
            match state.send.replace(SendSession::new()) {
                Some(mut previous) => (previous.stop_poll(), previous.abandon()),
                None => (None, None),
            }
        };

        if let Some(notice) = notice {
            self.notifier.dismiss(notice);
        }
        if let Some(poll) = replaced {
            self.publish_poll_stopped(&poll, "replaced").await;
        }
    }

    pub async fn show_camera(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.send.as_ref().map_or(false, |session| session.show) {
            return Err(WalletError::invalid_state("Send dialog is not open"));
        }
        state.camera_open = true;
        Ok(())
    }

    pub async fn close_camera(&self) {
        self.state.lock().await.camera_open = false;
    }

    /// Decode a payment request typed or pasted into the send dialog.
    ///
    /// A failure shows a short-lived warning and leaves any previously
    /// decoded invoice in place.
    pub async fn decode(&self, raw_input: &str) -> Result<Arc<DecodedInvoice>> {
        let mut state = self.state.lock().await;
        let session = state
            .send
            .as_mut()
            .filter(|session| session.show)
            .ok_or_else(|| WalletError::invalid_state("Send dialog is not open"))?;
        session.ensure_can_decode()?;
        session.raw_input = raw_input.to_string();

        let payment_request = normalize_payment_request(raw_input);
        let decoded = self
            .decoder
            .decode(payment_request)
            .map_err(|e| WalletError::validation_error(format!("{:#}", e)))
            .and_then(|raw| DecodedInvoice::from_raw(payment_request, raw));

        let invoice = match decoded {
            Ok(invoice) => Arc::new(invoice),
            Err(err) => {
                drop(state);
                self.notifier.show(
                    err.to_notice()
                        .with_timeout(self.config.validation_notice_timeout),
                );
                return Err(err);
            }
        };

        session.set_decoded(invoice.clone())?;
        debug!(
            payment_hash = %invoice.payment_hash,
            satoshis = invoice.satoshis,
            invoice = %sanitize_invoice(&invoice.payment_request),
            "Invoice decoded"
        );
        Ok(invoice)
    }

    /// Decode a string captured from the camera, closing the camera first
    pub async fn decode_qr(&self, captured: &str) -> Result<Arc<DecodedInvoice>> {
        self.close_camera().await;
        self.decode(captured).await
    }

    /// Pay the decoded invoice.
    ///
    /// Returns once the payment is submitted; the outcome arrives through
    /// the send poll or a failure notice.
    #[instrument(skip(self), fields(wallet_id = %self.wallet.id))]
    pub async fn pay(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let balance = state.balance_sat(&self.wallet);

        let session = state
            .send
            .as_mut()
            .filter(|session| session.show)
            .ok_or_else(|| WalletError::invalid_state("Send dialog is not open"))?;
        let invoice = session.payable_invoice()?;

        if invoice.is_expired(Utc::now()) {
            let expired_at = invoice.expire_date_string().unwrap_or_default();
            drop(guard);
            return Err(self.report(WalletError::invoice_expired(format!(
                "Invoice expired at {}",
                expired_at
            ))));
        }
        if !can_pay(Some(&invoice), balance) {
            drop(guard);
            return Err(self.report(WalletError::insufficient_funds(format!(
                "Insufficient balance: invoice requires {} sat, wallet holds {} sat",
                invoice.fsat(),
                format_sat(balance)
            ))));
        }

        let notice = self.notifier.show(Notice::progress(PAYMENT_PROGRESS_MESSAGE));
        let session_id = session.id;
        let poll = self.spawn_send_poll(session_id, invoice.payment_hash.clone());
        let replaced = session.begin_payment(poll.clone(), notice);
        drop(guard);

        info!(
            payment_hash = %invoice.payment_hash,
            amount_sat = invoice.satoshis,
            "Paying invoice"
        );
        if let Some(previous) = replaced {
            self.publish_poll_stopped(&previous, "replaced").await;
        }
        self.event_bus
            .publish(WalletEvent::PaymentInitiated {
                payment_hash: invoice.payment_hash.clone(),
                amount_sat: invoice.satoshis,
                invoice: invoice.payment_request.clone(),
                timestamp: Utc::now(),
            })
            .await;
        self.publish_poll_started(&poll, &invoice.payment_hash).await;

        let controller = self.clone();
        tokio::spawn(async move { controller.submit_payment(session_id, invoice).await });

        Ok(())
    }

    async fn submit_payment(&self, session_id: Uuid, invoice: Arc<DecodedInvoice>) {
        let e = match self
            .repository
            .pay_invoice(&self.wallet, &invoice.payment_request)
            .await
        {
            Ok(ack) => {
                debug!(payment_hash = %ack.payment_hash, "Payment accepted");
                return;
            }
            Err(e) => e,
        };

        let reverted = {
            let mut state = self.state.lock().await;
            match state.send.as_mut() {
                Some(session) if session.id == session_id => {
                    if session.status == SendStatus::Settled {
                        None
                    } else {
                        Some(session.payment_failed())
                    }
                }
                _ => Some(None),
            }
        };

        let Some(notice) = reverted else {
            debug!(
                payment_hash = %invoice.payment_hash,
                "Ignoring pay failure for an already settled payment"
            );
            return;
        };

        if let Some(notice) = notice {
            self.notifier.dismiss(notice);
        }
        let err = self.report(WalletError::from_repository(e));
        self.event_bus
            .publish(WalletEvent::PaymentFailed {
                payment_hash: invoice.payment_hash.clone(),
                reason: err.message,
                timestamp: Utc::now(),
            })
            .await;
    }

    /// Hide the send dialog and camera; the poll is cancelled after the
    /// grace delay and an unfinished payment's progress notice goes with it
    pub async fn close_send(&self) {
        let target = {
            let mut state = self.state.lock().await;
            state.camera_open = false;
            state
                .send
                .as_mut()
                .filter(|session| session.show)
                .and_then(|session| session.hide().map(|poll| (session.id, poll)))
        };

        if let Some((session_id, poll)) = target {
            self.schedule_grace_cancel(poll, self.config.send_close_grace, Some(session_id));
        }
    }

    fn spawn_send_poll(&self, session_id: Uuid, payment_hash: String) -> PollHandle {
        let controller = self.clone();
        spawn_poll(PollKind::Send, self.config.send_poll_interval, move |handle| {
            let controller = controller.clone();
            let payment_hash = payment_hash.clone();
            async move { controller.send_tick(handle, session_id, &payment_hash).await }
        })
    }

    async fn send_tick(&self, handle: PollHandle, session_id: Uuid, payment_hash: &str) -> PollFlow {
        let Some(snapshot) = self.observe_settlement(&handle, payment_hash).await else {
            return if handle.is_cancelled() {
                PollFlow::Stop
            } else {
                PollFlow::Continue
            };
        };

        let (committed, stopped, notice) = {
            let mut state = self.state.lock().await;
            let committed = state.commit(snapshot);
            let (stopped, notice) = match state.send.as_mut() {
                Some(session) if session.id == session_id => session.settle(),
                _ => (None, None),
            };
            (committed, stopped, notice)
        };

        if let Some(notice) = notice {
            self.notifier.dismiss(notice);
        }

        info!(payment_hash = %payment_hash, "Payment settled");
        self.event_bus
            .publish(WalletEvent::PaymentSucceeded {
                payment_hash: payment_hash.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        if let Some(count) = committed {
            self.publish_reconciled(count, false).await;
        }
        if let Some(poll) = stopped {
            self.publish_poll_stopped(&poll, "settled").await;
        }

        PollFlow::Stop
    }

    // Shared poll plumbing

    /// One status check. Returns a fresh payment snapshot once the payment
    /// is settled, `None` while it is not or when the tick must not act.
    async fn observe_settlement(&self, handle: &PollHandle, payment_hash: &str) -> Option<Snapshot> {
        let status = match self
            .repository
            .get_payment_status(&self.wallet, payment_hash)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                let err = WalletError::poll_observation_error(format!("{:#}", e));
                warn!(
                    poll_id = %handle.id(),
                    kind = %handle.kind(),
                    payment_hash = %payment_hash,
                    error = %err,
                    "Payment status check failed, retrying next tick"
                );
                return None;
            }
        };

        if handle.is_cancelled() {
            debug!(
                poll_id = %handle.id(),
                payment_hash = %payment_hash,
                "Ignoring status response for a cancelled poll"
            );
            return None;
        }
        if !status.paid {
            return None;
        }

        // Settlement only takes effect together with a fresh list
        match self.load_snapshot(false).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    poll_id = %handle.id(),
                    payment_hash = %payment_hash,
                    error = %err,
                    "Payment settled but the payments fetch failed, retrying next tick"
                );
                None
            }
        }
    }

    fn schedule_grace_cancel(&self, poll: PollHandle, grace: Duration, send_session: Option<Uuid>) {
        let controller = self.clone();
        tokio::spawn(async move {
            sleep(grace).await;
            if !poll.cancel() {
                return;
            }

            if let Some(session_id) = send_session {
                let notice = {
                    let mut state = controller.state.lock().await;
                    state
                        .send
                        .as_mut()
                        .filter(|session| session.id == session_id)
                        .and_then(SendSession::abandon)
                };
                if let Some(notice) = notice {
                    controller.notifier.dismiss(notice);
                }
            }

            controller.publish_poll_stopped(&poll, "grace_expired").await;
        });
    }

    /// Cancel every running poll and release any progress notice
    pub async fn shutdown(&self) {
        let (stopped, notice): (Vec<PollHandle>, Option<NoticeHandle>) = {
            let mut state = self.state.lock().await;
            let receive = state.receive.as_mut().and_then(ReceiveSession::stop_poll);
            let (send, notice) = match state.send.as_mut() {
                Some(session) => (session.stop_poll(), session.abandon()),
                None => (None, None),
            };
            (receive.into_iter().chain(send).collect(), notice)
        };

        if let Some(notice) = notice {
            self.notifier.dismiss(notice);
        }
        for poll in &stopped {
            self.publish_poll_stopped(poll, "shutdown").await;
        }
        info!(stopped_polls = stopped.len(), "Wallet controller stopped");
    }

    // Projections

    pub async fn view(&self) -> WalletView {
        let state = self.state.lock().await;
        let balance = state.balance_sat(&self.wallet);
        let invoice = state
            .send
            .as_ref()
            .and_then(|session| session.invoice().cloned());

        WalletView {
            balance_sat: balance,
            formatted_balance: format_sat(balance),
            can_pay: can_pay(invoice.as_deref(), balance),
            pending_payments_exist: pending_payments_exist(&state.payments),
            payments: state.payments.clone(),
            paid_payments: paid_payments(&state.payments),
            receive: state.receive.as_ref().map(ReceiveSession::view),
            send: state.send.as_ref().map(SendSession::view),
            camera_open: state.camera_open,
        }
    }

    pub async fn chart(&self) -> Vec<Bucket> {
        aggregate(&self.state.lock().await.payments)
    }

    pub async fn receive_status(&self) -> Option<ReceiveStatus> {
        self.state.lock().await.receive.as_ref().map(|s| s.status)
    }

    pub async fn send_status(&self) -> Option<SendStatus> {
        self.state.lock().await.send.as_ref().map(|s| s.status)
    }

    // Helpers

    fn report(&self, err: WalletError) -> WalletError {
        self.notifier.show(err.to_notice());
        err
    }

    async fn publish_reconciled(&self, payment_count: usize, include_pending: bool) {
        self.event_bus
            .publish(WalletEvent::PaymentsReconciled {
                payment_count,
                include_pending,
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn publish_poll_started(&self, poll: &PollHandle, payment_hash: &str) {
        self.event_bus
            .publish(WalletEvent::PollStarted {
                poll_id: poll.id().to_string(),
                kind: poll.kind(),
                payment_hash: payment_hash.to_string(),
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn publish_poll_stopped(&self, poll: &PollHandle, reason: &str) {
        self.event_bus
            .publish(WalletEvent::PollStopped {
                poll_id: poll.id().to_string(),
                kind: poll.kind(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            })
            .await;
    }
}
