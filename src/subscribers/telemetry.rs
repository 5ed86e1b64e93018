//! # Telemetry bridge.
//!
//! The host application owns the telemetry transport; the supervisor only needs
//! a fire-and-forget sink. [`TelemetryBridge`] adapts lifecycle [`Event`]s into
//! `(event_name, props)` records and hands them to a [`Telemetry`] implementation.
//!
//! Event names follow `nodevisor.<node kind>.<event label>`, for example
//! `nodevisor.ganache.node_ready`. Props are flat strings.
//!
//! Recording happens on the bridge's own subscriber worker, so a slow or
//! panicking sink never reaches the supervisor: panics surface as
//! `SubscriberPanicked` events.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Flat string properties attached to a telemetry record.
pub type TelemetryProps = BTreeMap<&'static str, String>;

/// Fire-and-forget telemetry sink.
///
/// Implementations must not block; errors are the sink's own business.
pub trait Telemetry: Send + Sync + 'static {
    /// Records one event.
    fn record(&self, event_name: &str, props: &TelemetryProps);
}

/// Subscriber forwarding lifecycle events to a [`Telemetry`] sink.
pub struct TelemetryBridge {
    sink: Arc<dyn Telemetry>,
}

impl TelemetryBridge {
    /// Wraps a sink.
    pub fn new(sink: Arc<dyn Telemetry>) -> Self {
        Self { sink }
    }

    /// Whether events of `kind` are reported; subscriber diagnostics are not.
    pub fn reports(kind: EventKind) -> bool {
        !matches!(
            kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }

    /// Builds the record for an event, or `None` for events that are not reported.
    pub fn record_for(event: &Event) -> Option<(String, TelemetryProps)> {
        if !Self::reports(event.kind) {
            return None;
        }

        let node = event.node.as_deref().unwrap_or("node");
        let name = format!("nodevisor.{node}.{}", event.kind.as_label());

        let mut props = TelemetryProps::new();
        if let Some(port) = event.port {
            props.insert("port", port.to_string());
        }
        if let Some(pid) = event.pid {
            props.insert("pid", pid.to_string());
        }
        if let Some(attempt) = event.attempt {
            props.insert("attempt", attempt.to_string());
        }
        if let Some(count) = event.count {
            props.insert("count", count.to_string());
        }
        if let Some(reason) = event.reason.as_deref() {
            props.insert("reason", reason.to_string());
        }
        Some((name, props))
    }
}

#[async_trait]
impl Subscribe for TelemetryBridge {
    async fn on_event(&self, event: &Event) {
        if let Some((name, props)) = Self::record_for(event) {
            self.sink.record(&name, &props);
        }
    }

    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        Self::reports(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortKey;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(String, TelemetryProps)>>);

    impl Telemetry for Capture {
        fn record(&self, event_name: &str, props: &TelemetryProps) {
            self.0.lock().unwrap().push((event_name.to_string(), props.clone()));
        }
    }

    #[tokio::test]
    async fn forwards_named_records() {
        let sink = Arc::new(Capture::default());
        let bridge = TelemetryBridge::new(sink.clone());

        let ev = Event::new(EventKind::StartFailed)
            .with_node("ganache")
            .with_port(PortKey::new(8545).unwrap())
            .with_reason("port_busy");
        bridge.on_event(&ev).await;

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "nodevisor.ganache.start_failed");
        assert_eq!(records[0].1.get("port").map(String::as_str), Some("8545"));
        assert_eq!(records[0].1.get("reason").map(String::as_str), Some("port_busy"));
    }

    #[test]
    fn dispose_counts_use_their_own_prop() {
        let ev = Event::new(EventKind::DisposeCompleted)
            .with_node("ganache")
            .with_count(2);
        let (name, props) = TelemetryBridge::record_for(&ev).unwrap();
        assert_eq!(name, "nodevisor.ganache.dispose_completed");
        assert_eq!(props.get("count").map(String::as_str), Some("2"));
        assert!(!props.contains_key("attempt"));
    }

    #[test]
    fn subscriber_events_are_not_reported() {
        let ev = Event::subscriber_overflow("telemetry", "full");
        assert!(TelemetryBridge::record_for(&ev).is_none());
        assert!(!TelemetryBridge::new(Arc::new(Capture::default())).accepts(ev.kind));
    }
}
