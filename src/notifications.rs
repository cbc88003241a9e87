//! User-facing notices.
//!
//! Every notice the controller shows returns a [`NoticeHandle`]; persistent
//! notices (no timeout) stay up until that handle is passed back to
//! [`Notifier::dismiss`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub caption: Option<String>,
    /// `None` keeps the notice up until it is dismissed through its handle
    pub timeout: Option<Duration>,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            caption: None,
            timeout: None,
        }
    }

    /// A notice that only goes away when dismissed
    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, message)
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.timeout.is_none()
    }
}

/// Opaque token identifying a shown notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeHandle(Uuid);

impl NoticeHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoticeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoticeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Surface for transient and persistent user notices.
///
/// Dismissing an unknown or already dismissed handle must be a no-op.
pub trait Notifier: Send + Sync {
    fn show(&self, notice: Notice) -> NoticeHandle;

    fn dismiss(&self, handle: NoticeHandle);
}

#[cfg(feature = "cli")]
pub use console_notifier::ConsoleNotifier;

#[cfg(feature = "cli")]
mod console_notifier {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use console::{style, Term};
    use tracing::debug;

    use super::{Notice, NoticeHandle, NoticeKind, Notifier};

    /// Prints notices to stderr
    pub struct ConsoleNotifier {
        term: Term,
        open: Mutex<HashSet<NoticeHandle>>,
    }

    impl ConsoleNotifier {
        pub fn new() -> Self {
            Self {
                term: Term::stderr(),
                open: Mutex::new(HashSet::new()),
            }
        }

        fn render(notice: &Notice) -> String {
            let message = match notice.kind {
                NoticeKind::Info => style(notice.message.as_str()).cyan(),
                NoticeKind::Warning => style(notice.message.as_str()).yellow(),
                NoticeKind::Error => style(notice.message.as_str()).red(),
            };
            match &notice.caption {
                Some(caption) => format!("{} {}", message, style(caption).dim()),
                None => message.to_string(),
            }
        }
    }

    impl Default for ConsoleNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Notifier for ConsoleNotifier {
        fn show(&self, notice: Notice) -> NoticeHandle {
            let handle = NoticeHandle::new();
            if notice.is_persistent() {
                if let Ok(mut open) = self.open.lock() {
                    open.insert(handle);
                }
            }
            let _ = self.term.write_line(&Self::render(&notice));
            handle
        }

        fn dismiss(&self, handle: NoticeHandle) {
            let removed = self
                .open
                .lock()
                .map(|mut open| open.remove(&handle))
                .unwrap_or(false);
            if removed {
                debug!(notice = %handle, "Notice dismissed");
                let _ = self.term.write_line(&style("done").dim().to_string());
            }
        }
    }
}
