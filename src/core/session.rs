//! Receive and send dialog sessions.
//!
//! At most one session of each kind is live. Each owns the handle of its
//! status poll; replacing a session must stop the previous poll first.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::core::polling::PollHandle;
use crate::error::{Result, WalletError};
use crate::notifications::NoticeHandle;
use crate::types::{CreatedInvoice, DecodedInvoice};
use crate::view::{ReceiveDialogView, SendDialogView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiveStatus {
    Idle,
    Loading,
    Success,
    Settled,
    Cancelled,
}

#[derive(Debug)]
pub struct ReceiveSession {
    pub id: Uuid,
    pub show: bool,
    pub status: ReceiveStatus,
    pub amount_sat: Option<u64>,
    pub memo: String,
    pub payment_request: Option<String>,
    pub payment_hash: Option<String>,
    poll: Option<PollHandle>,
}

impl ReceiveSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            show: true,
            status: ReceiveStatus::Idle,
            amount_sat: None,
            memo: String::new(),
            payment_request: None,
            payment_hash: None,
            poll: None,
        }
    }

    /// idle → loading
    pub fn begin_request(&mut self, amount_sat: u64, memo: &str) -> Result<()> {
        if self.status != ReceiveStatus::Idle || !self.show {
            return Err(WalletError::invalid_state(format!(
                "Cannot request an invoice while the receive dialog is {:?}",
                self.status
            )));
        }
        self.status = ReceiveStatus::Loading;
        self.amount_sat = Some(amount_sat);
        self.memo = memo.to_string();
        Ok(())
    }

    /// Whether a create-invoice response is still wanted by this session
    pub fn awaiting_invoice(&self) -> bool {
        self.status == ReceiveStatus::Loading
    }

    /// loading → success, starting to watch the new invoice
    pub fn invoice_created(&mut self, invoice: &CreatedInvoice, poll: PollHandle) -> Option<PollHandle> {
        self.status = ReceiveStatus::Success;
        self.payment_request = Some(invoice.payment_request.clone());
        self.payment_hash = Some(invoice.payment_hash.clone());
        self.replace_poll(Some(poll))
    }

    /// loading → idle
    pub fn request_failed(&mut self) {
        if self.status == ReceiveStatus::Loading {
            self.status = ReceiveStatus::Idle;
        }
    }

    /// Settlement observed: hide the dialog and stop the poll
    pub fn settle(&mut self) -> Option<PollHandle> {
        self.show = false;
        self.status = ReceiveStatus::Settled;
        self.stop_poll()
    }

    /// Hide the dialog. The poll keeps running; the caller decides when to
    /// cancel the returned handle.
    pub fn hide(&mut self) -> Option<PollHandle> {
        self.show = false;
        if self.status != ReceiveStatus::Settled {
            self.status = ReceiveStatus::Cancelled;
        }
        self.poll.clone()
    }

    /// Cancel and drop the poll, returning it if this call stopped it
    pub fn stop_poll(&mut self) -> Option<PollHandle> {
        self.replace_poll(None)
    }

    fn replace_poll(&mut self, poll: Option<PollHandle>) -> Option<PollHandle> {
        let previous = std::mem::replace(&mut self.poll, poll)?;
        previous.cancel().then_some(previous)
    }

    pub fn view(&self) -> ReceiveDialogView {
        ReceiveDialogView {
            show: self.show,
            status: self.status,
            payment_request: self.payment_request.clone(),
            amount_sat: self.amount_sat,
            memo: self.memo.clone(),
        }
    }
}

impl Default for ReceiveSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Idle,
    Decoded,
    Paying,
    Settled,
}

#[derive(Debug)]
pub struct SendSession {
    pub id: Uuid,
    pub show: bool,
    pub status: SendStatus,
    pub raw_input: String,
    invoice: Option<Arc<DecodedInvoice>>,
    poll: Option<PollHandle>,
    progress_notice: Option<NoticeHandle>,
}

impl SendSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            show: true,
            status: SendStatus::Idle,
            raw_input: String::new(),
            invoice: None,
            poll: None,
            progress_notice: None,
        }
    }

    pub fn invoice(&self) -> Option<&Arc<DecodedInvoice>> {
        self.invoice.as_ref()
    }

    pub fn ensure_can_decode(&self) -> Result<()> {
        match self.status {
            SendStatus::Idle | SendStatus::Decoded => Ok(()),
            status => Err(WalletError::invalid_state(format!(
                "Cannot decode another invoice while the payment is {:?}",
                status
            ))),
        }
    }

    /// idle/decoded → decoded
    pub fn set_decoded(&mut self, invoice: Arc<DecodedInvoice>) -> Result<()> {
        self.ensure_can_decode()?;
        self.invoice = Some(invoice);
        self.status = SendStatus::Decoded;
        Ok(())
    }

    /// The invoice ready to be paid, only while in `Decoded`
    pub fn payable_invoice(&self) -> Result<Arc<DecodedInvoice>> {
        match (&self.status, &self.invoice) {
            (SendStatus::Decoded, Some(invoice)) => Ok(invoice.clone()),
            (SendStatus::Paying, _) => Err(WalletError::invalid_state(
                "Payment already in progress",
            )),
            _ => Err(WalletError::invalid_state("No decoded invoice to pay")),
        }
    }

    /// decoded → paying. Returns the poll it replaced, if any was running.
    pub fn begin_payment(&mut self, poll: PollHandle, notice: NoticeHandle) -> Option<PollHandle> {
        self.status = SendStatus::Paying;
        self.progress_notice = Some(notice);
        let previous = std::mem::replace(&mut self.poll, Some(poll))?;
        previous.cancel().then_some(previous)
    }

    /// paying → decoded. The poll keeps running so a late settlement is
    /// still observed.
    pub fn payment_failed(&mut self) -> Option<NoticeHandle> {
        if self.status != SendStatus::Paying {
            return None;
        }
        self.status = SendStatus::Decoded;
        self.progress_notice.take()
    }

    /// Settlement observed: hide the dialog, stop the poll, release the
    /// progress notice
    pub fn settle(&mut self) -> (Option<PollHandle>, Option<NoticeHandle>) {
        self.show = false;
        self.status = SendStatus::Settled;
        (self.stop_poll(), self.progress_notice.take())
    }

    pub fn hide(&mut self) -> Option<PollHandle> {
        self.show = false;
        self.poll.clone()
    }

    /// Give up on an unsettled payment after its poll was cancelled
    pub fn abandon(&mut self) -> Option<NoticeHandle> {
        if self.status == SendStatus::Paying {
            self.status = SendStatus::Decoded;
        }
        self.progress_notice.take()
    }

    pub fn stop_poll(&mut self) -> Option<PollHandle> {
        let previous = self.poll.take()?;
        previous.cancel().then_some(previous)
    }

    pub fn view(&self) -> SendDialogView {
        SendDialogView {
            show: self.show,
            status: self.status,
            raw_input: self.raw_input.clone(),
            invoice: self.invoice.clone(),
        }
    }
}

impl Default for SendSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::core::polling::{spawn_poll, PollFlow};
    use crate::error::ErrorCategory;
    use crate::events::PollKind;

    fn idle_poll(kind: PollKind) -> PollHandle {
        spawn_poll(kind, Duration::from_secs(3600), |_| async { PollFlow::Continue })
    }

    fn created() -> CreatedInvoice {
        CreatedInvoice {
            payment_request: "lnbc10u1...".to_string(),
            payment_hash: "abc".to_string(),
        }
    }

    fn decoded() -> Arc<DecodedInvoice> {
        Arc::new(DecodedInvoice {
            payment_request: "lnbc...".to_string(),
            payment_hash: "abc".to_string(),
            amount_msat: 10_000,
            satoshis: 10,
            description: None,
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            expire_date: None,
        })
    }

    #[tokio::test]
    async fn test_receive_happy_path() {
        let mut session = ReceiveSession::new();
        session.begin_request(1000, "tip").unwrap();
        assert_eq!(session.status, ReceiveStatus::Loading);

        let poll = idle_poll(PollKind::Receive);
        assert!(session.invoice_created(&created(), poll.clone()).is_none());
        assert_eq!(session.status, ReceiveStatus::Success);
        assert_eq!(session.payment_hash.as_deref(), Some("abc"));

        let stopped = session.settle().expect("poll stopped by settle");
        assert_eq!(stopped.id(), poll.id());
        assert!(poll.is_cancelled());
        assert!(!session.show);
        assert_eq!(session.status, ReceiveStatus::Settled);
    }

    #[tokio::test]
    async fn test_receive_request_only_from_idle() {
        let mut session = ReceiveSession::new();
        session.begin_request(1000, "").unwrap();

        let err = session.begin_request(1000, "").unwrap_err();
        assert_eq!(err.category, ErrorCategory::InvalidState);

        session.request_failed();
        assert_eq!(session.status, ReceiveStatus::Idle);
        assert!(session.begin_request(5, "").is_ok());
    }

    #[tokio::test]
    async fn test_receive_hide_keeps_poll_running() {
        let mut session = ReceiveSession::new();
        session.begin_request(1000, "").unwrap();
        session.invoice_created(&created(), idle_poll(PollKind::Receive));

        let poll = session.hide().expect("poll handle");
        assert!(!poll.is_cancelled());
        assert!(!session.show);
        assert_eq!(session.status, ReceiveStatus::Cancelled);
        assert!(!session.awaiting_invoice());

        // Settlement inside the grace window still wins
        session.settle();
        assert_eq!(session.status, ReceiveStatus::Settled);
        assert!(poll.is_cancelled());
    }

    #[tokio::test]
    async fn test_send_flow_and_failure_revert() {
        let mut session = SendSession::new();
        assert!(session.payable_invoice().is_err());

        session.set_decoded(decoded()).unwrap();
        let invoice = session.payable_invoice().unwrap();
        assert_eq!(invoice.satoshis, 10);

        let notice = NoticeHandle::new();
        let poll = idle_poll(PollKind::Send);
        session.begin_payment(poll.clone(), notice);
        assert_eq!(session.status, SendStatus::Paying);
        assert!(session.set_decoded(decoded()).is_err());

        assert_eq!(session.payment_failed(), Some(notice));
        assert_eq!(session.status, SendStatus::Decoded);
        assert!(!poll.is_cancelled());
        assert_eq!(session.payment_failed(), None);
    }

    #[tokio::test]
    async fn test_send_settle_releases_everything() {
        let mut session = SendSession::new();
        session.set_decoded(decoded()).unwrap();
        let notice = NoticeHandle::new();
        let poll = idle_poll(PollKind::Send);
        session.begin_payment(poll.clone(), notice);

        let (stopped, released) = session.settle();
        assert!(stopped.is_some());
        assert_eq!(released, Some(notice));
        assert!(poll.is_cancelled());
        assert!(!session.show);

        // A second stop is a no-op
        assert!(session.stop_poll().is_none());
    }

    #[tokio::test]
    async fn test_repay_replaces_previous_poll() {
        let mut session = SendSession::new();
        session.set_decoded(decoded()).unwrap();
        let first = idle_poll(PollKind::Send);
        session.begin_payment(first.clone(), NoticeHandle::new());
        session.payment_failed();

        let second = idle_poll(PollKind::Send);
        let replaced = session.begin_payment(second.clone(), NoticeHandle::new());
        assert_eq!(replaced.map(|p| p.id()), Some(first.id()));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        second.cancel();
    }
}
