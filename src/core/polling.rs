//! Repeating payment-status poll with explicit cancellation.
//!
//! A poll runs on a fixed period until its [`PollHandle`] is cancelled or a
//! tick asks it to stop. Cancelling is idempotent and does not interrupt a
//! tick whose request is already in flight; ticks check
//! [`PollHandle::is_cancelled`] before acting on a late response.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::events::PollKind;

/// Outcome of a single poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFlow {
    Continue,
    Stop,
}

#[derive(Clone)]
pub struct PollHandle {
    id: Uuid,
    kind: PollKind,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl PollHandle {
    fn new(kind: PollKind) -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Self {
            id: Uuid::new_v4(),
            kind,
            cancel_tx: Arc::new(cancel_tx),
        };
        (handle, cancel_rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> PollKind {
        self.kind
    }

    /// Stop the poll. Returns `true` only for the call that actually
    /// cancelled it; later calls are no-ops.
    pub fn cancel(&self) -> bool {
        let was_cancelled = self.cancel_tx.send_replace(true);
        if !was_cancelled {
            debug!(poll_id = %self.id, kind = %self.kind, "Poll cancelled");
        }
        !was_cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// Shortest period a poll runs at; `interval_at` rejects a zero period
const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Spawn a poll calling `tick` every `period`, first after one full period.
pub fn spawn_poll<F, Fut>(kind: PollKind, period: Duration, mut tick: F) -> PollHandle
where
    F: FnMut(PollHandle) -> Fut + Send + 'static,
    Fut: Future<Output = PollFlow> + Send + 'static,
{
    let (handle, mut cancel_rx) = PollHandle::new(kind);
    let task_handle = handle.clone();
    let period = period.max(MIN_POLL_PERIOD);

    debug!(
        poll_id = %handle.id,
        kind = %kind,
        period_ms = period.as_millis() as u64,
        "Starting poll"
    );

    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if task_handle.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = timer.tick() => {
                    if task_handle.is_cancelled() {
                        break;
                    }
                    if tick(task_handle.clone()).await == PollFlow::Stop {
                        task_handle.cancel();
                        break;
                    }
                }
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(poll_id = %task_handle.id, kind = %task_handle.kind, "Poll stopped");
    });

    handle
}
