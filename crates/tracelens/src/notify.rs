//! User-facing notifications, injected rather than looked up globally.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// Whether retrying the action can help
    pub retryable: bool,
}

impl Notification {
    pub fn error(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            retryable,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Info => tracing::info!(retryable = n.retryable, "{}", n.message),
            Severity::Warning => tracing::warn!(retryable = n.retryable, "{}", n.message),
            Severity::Error => tracing::error!(retryable = n.retryable, "{}", n.message),
        }
    }
}

/// Keeps every notification, for tests and headless callers
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    seen: parking_lot::Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
