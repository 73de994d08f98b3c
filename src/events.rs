use crate::camera::{ScanErrorKind, StreamState};
use crate::error::EventBusError;
use crate::router::{CaptureTarget, CapturedValue};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn, Level};

/// Everything a scanning session reports to its UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScannerEvent {
    /// The decode stream moved to a new lifecycle state
    StreamStateChanged {
        state: StreamState,
        timestamp: SystemTime,
    },
    /// A code was decoded from a camera frame
    CodeDecoded { text: String, timestamp: SystemTime },
    /// A per-frame decode attempt failed with something other than "not found"
    ScanFailed {
        kind: ScanErrorKind,
        message: String,
    },
    /// An interpreted value was written into a field
    FieldCaptured {
        target: CaptureTarget,
        value: CapturedValue,
        timestamp: SystemTime,
    },
    /// One field (or all, when `target` is `None`) was cleared
    FieldReset { target: Option<CaptureTarget> },
    /// The operator selected a new capture target
    TargetSelected { target: CaptureTarget },
    /// The user-visible status message changed
    StatusChanged { message: String, is_error: bool },
    /// A submission request finished
    SubmissionSent { success: bool, timestamp: SystemTime },
    /// Session shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ScannerEvent {
    /// When the event happened; events without a stored time report now
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ScannerEvent::StreamStateChanged { timestamp, .. } => *timestamp,
            ScannerEvent::CodeDecoded { timestamp, .. } => *timestamp,
            ScannerEvent::FieldCaptured { timestamp, .. } => *timestamp,
            ScannerEvent::SubmissionSent { timestamp, .. } => *timestamp,
            ScannerEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            ScannerEvent::ScanFailed { .. }
            | ScannerEvent::FieldReset { .. }
            | ScannerEvent::TargetSelected { .. }
            | ScannerEvent::StatusChanged { .. } => SystemTime::now(),
        }
    }

    /// One-line summary for logs
    pub fn description(&self) -> String {
        match self {
            ScannerEvent::StreamStateChanged { state, .. } => {
                format!("Decode stream {:?}", state)
            }
            ScannerEvent::CodeDecoded { text, .. } => format!("Decoded: {}", text),
            ScannerEvent::ScanFailed { kind, message } => {
                format!("Scan failed ({:?}): {}", kind, message)
            }
            ScannerEvent::FieldCaptured { target, value, .. } => {
                format!("{} captured: {}", target, value)
            }
            ScannerEvent::FieldReset { target: Some(target) } => format!("{} reset", target),
            ScannerEvent::FieldReset { target: None } => "All fields reset".to_string(),
            ScannerEvent::TargetSelected { target } => format!("Scanning {}", target),
            ScannerEvent::StatusChanged { message, .. } => format!("Status: {}", message),
            ScannerEvent::SubmissionSent { success, .. } => format!(
                "Submission {}",
                if *success { "succeeded" } else { "failed" }
            ),
            ScannerEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Stable snake_case name, used by [`EventFilter::EventTypes`]
    pub fn event_type(&self) -> &'static str {
        match self {
            ScannerEvent::StreamStateChanged { .. } => "stream_state_changed",
            ScannerEvent::CodeDecoded { .. } => "code_decoded",
            ScannerEvent::ScanFailed { .. } => "scan_failed",
            ScannerEvent::FieldCaptured { .. } => "field_captured",
            ScannerEvent::FieldReset { .. } => "field_reset",
            ScannerEvent::TargetSelected { .. } => "target_selected",
            ScannerEvent::StatusChanged { .. } => "status_changed",
            ScannerEvent::SubmissionSent { .. } => "submission_sent",
            ScannerEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Fan-out of session events to UI subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may fall behind
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, false)
    }

    /// Same as [`EventBus::new`], also logging every published event
    pub fn with_debug_logging(capacity: usize) -> Self {
        Self::build(capacity, true)
    }

    fn build(capacity: usize, debug_logging: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name)
    }

    /// Publish to current subscribers, returning how many received it.
    /// Fails when nobody is subscribed.
    pub fn publish(&self, event: ScannerEvent) -> Result<usize, EventBusError> {
        match self.log_level(&event) {
            Some(Level::WARN) => warn!("{}", event.description()),
            Some(Level::INFO) => info!("{}", event.description()),
            Some(_) => debug!("Publishing {}", event.description()),
            None => {}
        }

        self.sender
            .send(event)
            .map_err(|_| EventBusError::PublishFailed {
                details: "no subscribers".to_string(),
            })
    }

    /// Publish without caring whether anyone is listening
    pub fn emit(&self, event: ScannerEvent) {
        if self.publish(event).is_err() {
            debug!("Event dropped, no subscribers");
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Operator-facing events are always logged; the rest only in debug mode
    fn log_level(&self, event: &ScannerEvent) -> Option<Level> {
        match event {
            ScannerEvent::StatusChanged { is_error: true, .. }
            | ScannerEvent::ScanFailed { .. }
            | ScannerEvent::SubmissionSent { success: false, .. } => Some(Level::WARN),
            ScannerEvent::StatusChanged { .. }
            | ScannerEvent::FieldCaptured { .. }
            | ScannerEvent::ShutdownRequested { .. } => Some(Level::INFO),
            _ if self.debug_logging => Some(Level::DEBUG),
            _ => None,
        }
    }
}

/// Which events a filtered receiver yields
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Everything
    All,
    /// Events whose `event_type()` is listed
    EventTypes(Vec<&'static str>),
    /// Arbitrary predicate
    Custom(fn(&ScannerEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &ScannerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Subscriber that only yields events passing its filter.
///
/// A receiver that falls behind skips the overwritten events and carries on;
/// the only error it reports is a closed bus.
pub struct EventReceiver {
    inner: broadcast::Receiver<ScannerEvent>,
    filter: EventFilter,
    name: String,
    skipped: u64,
}

impl EventReceiver {
    pub fn new<S: Into<String>>(
        inner: broadcast::Receiver<ScannerEvent>,
        filter: EventFilter,
        name: S,
    ) -> Self {
        Self {
            inner,
            filter,
            name: name.into(),
            skipped: 0,
        }
    }

    pub async fn recv(&mut self) -> Result<ScannerEvent, EventBusError> {
        loop {
            let event = match self.inner.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.note_lag(missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            };

            if self.filter.matches(&event) {
                trace!("'{}' <- {}", self.name, event.event_type());
                return Ok(event);
            }
        }
    }

    /// Next matching event already queued, if any
    pub fn try_recv(&mut self) -> Result<Option<ScannerEvent>, EventBusError> {
        loop {
            let event = match self.inner.try_recv() {
                Ok(event) => event,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    self.note_lag(missed);
                    continue;
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Events lost to lag since subscribing
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn note_lag(&mut self, missed: u64) {
        self.skipped += missed;
        warn!("Subscriber '{}' fell behind, skipped {} events", self.name, missed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn status(message: &str) -> ScannerEvent {
        ScannerEvent::StatusChanged {
            message: message.to_string(),
            is_error: false,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let delivered = bus
            .publish(ScannerEvent::FieldCaptured {
                target: CaptureTarget::PacketId,
                value: "ABC123".into(),
                timestamp: SystemTime::now(),
            })
            .unwrap();
        assert_eq!(delivered, 2);

        for receiver in [&mut first, &mut second] {
            let event = timeout(Duration::from_millis(100), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                ScannerEvent::FieldCaptured { target, value, .. } => {
                    assert_eq!(target, CaptureTarget::PacketId);
                    assert_eq!(value, CapturedValue::from("ABC123"));
                }
                other => panic!("Expected field capture, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_emit_tolerates_missing_subscribers() {
        let bus = EventBus::new(8);
        assert!(!bus.has_subscribers());
        assert!(bus.publish(ScannerEvent::FieldReset { target: None }).is_err());

        bus.emit(ScannerEvent::FieldReset { target: None });
    }

    #[test]
    fn test_filters() {
        let decoded = ScannerEvent::CodeDecoded {
            text: "P1".to_string(),
            timestamp: SystemTime::now(),
        };

        assert!(EventFilter::EventTypes(vec!["status_changed"]).matches(&status("ok")));
        assert!(!EventFilter::EventTypes(vec!["status_changed"]).matches(&decoded));
        assert!(EventFilter::All.matches(&decoded));

        let errors_only = EventFilter::Custom(|event| {
            matches!(event, ScannerEvent::StatusChanged { is_error: true, .. })
        });
        assert!(!errors_only.matches(&status("ok")));
    }

    #[tokio::test]
    async fn test_filtered_receiver_skips_other_events() {
        let bus = EventBus::new(8);
        let mut statuses =
            bus.subscribe_filtered(EventFilter::EventTypes(vec!["status_changed"]), "test");

        bus.emit(ScannerEvent::TargetSelected {
            target: CaptureTarget::EndSequence,
        });
        bus.emit(status("Packet ID scanned: P1"));

        let event = timeout(Duration::from_millis(100), statuses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.description(), "Status: Packet ID scanned: P1");
        assert!(statuses.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lagging_receiver_skips_ahead() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe_filtered(EventFilter::All, "slow");

        for n in 1..=5 {
            bus.emit(status(&n.to_string()));
        }

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.description(), "Status: 4");
        assert_eq!(receiver.skipped(), 3);
    }

    #[test]
    fn test_status_changes_are_logged_without_debug() {
        let bus = EventBus::new(8);

        assert_eq!(bus.log_level(&status("Packet ID scanned: P1")), Some(Level::INFO));
        assert_eq!(
            bus.log_level(&ScannerEvent::StatusChanged {
                message: "Error updating packet info".to_string(),
                is_error: true,
            }),
            Some(Level::WARN)
        );
        assert_eq!(
            bus.log_level(&ScannerEvent::TargetSelected {
                target: CaptureTarget::StartSequence,
            }),
            None
        );

        let verbose = EventBus::with_debug_logging(8);
        assert_eq!(
            verbose.log_level(&ScannerEvent::TargetSelected {
                target: CaptureTarget::StartSequence,
            }),
            Some(Level::DEBUG)
        );
        assert_eq!(verbose.log_level(&status("ok")), Some(Level::INFO));
    }

    #[test]
    fn test_event_descriptions() {
        let event = ScannerEvent::FieldReset {
            target: Some(CaptureTarget::StartSequence),
        };
        assert_eq!(event.description(), "Start Sequence reset");
        assert_eq!(event.event_type(), "field_reset");
    }
}
