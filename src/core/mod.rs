pub mod controller;
pub mod polling;
pub mod session;

use std::time::Duration;

pub use self::controller::WalletController;
pub use self::polling::{spawn_poll, PollFlow, PollHandle};
pub use self::session::{ReceiveSession, ReceiveStatus, SendSession, SendStatus};

/// Timing knobs of the payment lifecycle controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How often an open receive invoice is checked for settlement
    pub receive_poll_interval: Duration,
    /// How long a receive poll outlives its closed dialog
    pub receive_close_grace: Duration,
    /// How often an outgoing payment is checked for settlement
    pub send_poll_interval: Duration,
    /// How long a send poll outlives its closed dialog
    pub send_close_grace: Duration,
    /// Delay between startup and the pending-payments sweep
    pub pending_sweep_delay: Duration,
    /// How long an invalid invoice warning stays on screen
    pub validation_notice_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            receive_poll_interval: Duration::from_millis(2000),
            receive_close_grace: Duration::from_millis(10_000),
            send_poll_interval: Duration::from_millis(2000),
            send_close_grace: Duration::from_millis(1000),
            pending_sweep_delay: Duration::from_millis(1100),
            validation_notice_timeout: Duration::from_millis(3000),
        }
    }
}
