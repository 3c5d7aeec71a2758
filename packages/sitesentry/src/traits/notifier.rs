//! Notification port.

use crate::types::Alert;

/// Delivers alerts to the outside world. Fire-and-forget: the engine never
/// blocks on delivery, so implementations queue internally and own routing,
/// retries, rate limiting and deduplication.
pub trait AlertNotifier: Send + Sync {
    fn emit(&self, alert: Alert);
}

/// Drops every alert. Default wiring for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl AlertNotifier for NullNotifier {
    fn emit(&self, alert: Alert) {
        tracing::debug!(alert_id = %alert.id, kind = alert.kind.as_str(), "alert dropped (null notifier)");
    }
}
