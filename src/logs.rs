//! Log capture and shipping.
//!
//! [`LogCaptureLayer`] is installed into the `tracing` subscriber up front and
//! forwards every event into a shared [`LogShipper`]. The shipper discards
//! records until the orchestrator arms it at run start, and is drained by the
//! orchestrator when the run finishes.
//!
//! ```text
//!  tracing event ──► LogCaptureLayer ──► LogShipper (armed?) ──► buffer
//!                                                                  │
//!                         finish_run ◄── drain() ◄─────────────────┘
//!                             │
//!                             └──► ReportingApi::send_logs
//! ```
//!
//! Events emitted by this crate or by the HTTP stack underneath it
//! (`reqwest`, `hyper`, `hyper_util`, `h2`) are not captured, so transport
//! diagnostics never end up in the shipped log.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::api::models::LogRecord;

/// Target roots whose events stay local.
const EXCLUDED_TARGETS: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
];

fn is_excluded(target: &str) -> bool {
    EXCLUDED_TARGETS.iter().any(|root| {
        target
            .strip_prefix(root)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Default)]
struct ShipperState {
    armed: bool,
    test_id: Option<i64>,
    records: Vec<LogRecord>,
}

/// Shared buffer of captured log records.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Default)]
pub struct LogShipper {
    state: Arc<Mutex<ShipperState>>,
}

impl LogShipper {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ShipperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts accepting records.
    pub fn arm(&self) {
        self.lock().armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Sets the server id stamped onto subsequent records.
    pub fn set_test_id(&self, test_id: Option<i64>) {
        self.lock().test_id = test_id;
    }

    /// Buffers a record stamped with the current time and test id.
    ///
    /// Dropped while the shipper is not armed.
    pub fn push(&self, level: &str, message: impl Into<String>) {
        let mut state = self.lock();
        if !state.armed {
            return;
        }
        let record = LogRecord {
            test_id: state.test_id.map(|id| id.to_string()).unwrap_or_default(),
            level: level.to_string(),
            timestamp: Utc::now().timestamp_millis().to_string(),
            message: message.into(),
        };
        state.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every buffered record, in capture order.
    pub fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut self.lock().records)
    }

    /// A subscriber layer feeding this shipper.
    pub fn layer(&self) -> LogCaptureLayer {
        LogCaptureLayer {
            shipper: self.clone(),
        }
    }
}

/// `tracing_subscriber` layer that feeds a [`LogShipper`].
pub struct LogCaptureLayer {
    shipper: LogShipper,
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_excluded(metadata.target()) || !self.shipper.is_armed() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.shipper
            .push(metadata.level().as_str(), visitor.into_message());
    }
}

/// Renders `message` followed by the remaining fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let fields = self.fields.join(" ");
        if self.message.is_empty() {
            fields
        } else {
            format!("{} {}", self.message, fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn test_disarmed_shipper_drops_records() {
        let shipper = LogShipper::new();
        shipper.push("INFO", "ignored");
        assert!(shipper.is_empty());

        shipper.arm();
        shipper.set_test_id(Some(12));
        shipper.push("INFO", "kept");
        let records = shipper.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_id, "12");
        assert_eq!(records[0].message, "kept");
        assert!(shipper.is_empty());
    }

    #[test]
    fn test_layer_captures_foreign_events() {
        let shipper = LogShipper::new();
        shipper.arm();
        let subscriber = tracing_subscriber::registry().with(shipper.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "app", attempt = 2, "connection reset");
            tracing::info!("emitted by the reporter itself");
        });

        let records = shipper.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "WARN");
        assert_eq!(records[0].message, "connection reset attempt=2");
        assert_eq!(records[0].test_id, "");
    }

    #[test]
    fn test_layer_skips_http_stack_events() {
        let shipper = LogShipper::new();
        shipper.arm();
        let subscriber = tracing_subscriber::registry().with(shipper.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "reqwest::connect", "starting new connection");
            tracing::debug!(target: "hyper_util::client::legacy::pool", "pooling idle connection");
            tracing::debug!(target: "hyper", "flushed 120 bytes");
            tracing::debug!(target: "h2::codec", "send frame");
            tracing::info!(target: "hyperion", "kept");
        });

        let records = shipper.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn test_clones_share_buffer() {
        let shipper = LogShipper::new();
        let other = shipper.clone();
        other.arm();
        other.push("ERROR", "boom");
        assert_eq!(shipper.len(), 1);
    }
}
