use super::status::{camera_error_status, capture_status, StatusMessage};
use crate::camera::{
    DecodeEvent, DecodeStream, DisplaySurface, ScanErrorKind, StreamHandle, StreamState,
};
use crate::error::{CameraError, SubmissionError};
use crate::events::{EventBus, ScannerEvent};
use crate::payload;
use crate::router::{CaptureTarget, FieldRouter, ResetScope};
use crate::submission::SubmissionController;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A single scanning session.
///
/// Owns the decode stream, the field router and the submission controller.
/// Every mutation goes through `&mut self`, so decode events, operator
/// commands and submissions are applied strictly one after another.
pub struct ScannerSession {
    stream: DecodeStream,
    surface: DisplaySurface,
    handle: Option<StreamHandle>,
    router: FieldRouter,
    submitter: SubmissionController,
    event_bus: Arc<EventBus>,
    status: Option<StatusMessage>,
}

impl ScannerSession {
    pub fn new(
        stream: DecodeStream,
        surface: DisplaySurface,
        submitter: SubmissionController,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            stream,
            surface,
            handle: None,
            router: FieldRouter::new(),
            submitter,
            event_bus,
            status: None,
        }
    }

    /// Start the camera. A failure is reported through the status message
    /// and returned; the session stays usable either way.
    pub async fn start_scanning(&mut self) -> Result<(), CameraError> {
        self.handle = None;

        match self.stream.start(&self.surface).await {
            Ok(handle) => {
                info!("Scanning on {}", handle.device());
                self.handle = Some(handle);
                self.publish_stream_state();
                Ok(())
            }
            Err(e) => {
                self.publish_stream_state();
                self.set_status(camera_error_status(&e));
                Err(e)
            }
        }
    }

    pub async fn stop_scanning(&mut self) {
        // Closing the receiver first unblocks a decode task stuck on a full queue
        self.handle = None;
        self.stream.stop().await;
        self.publish_stream_state();
    }

    /// Stop and start again, re-running device resolution
    pub async fn restart_scanning(&mut self) -> Result<(), CameraError> {
        info!("Restarting camera");
        self.stop_scanning().await;
        self.start_scanning().await
    }

    pub fn select_target(&mut self, target: CaptureTarget) {
        self.router.set_active_target(target);
        self.event_bus.emit(ScannerEvent::TargetSelected { target });
    }

    pub fn select_next_target(&mut self) {
        let next = self.router.active_target().next();
        self.select_target(next);
    }

    /// Apply one event from the decode stream
    pub async fn handle_decode_event(&mut self, event: DecodeEvent) {
        match event {
            DecodeEvent::Decoded(text) => self.capture(text),
            DecodeEvent::Error(e) => {
                warn!("Decode error: {}", e);
                if let CameraError::DecodeRuntime { kind, details } = &e {
                    self.event_bus.emit(ScannerEvent::ScanFailed {
                        kind: scan_error_kind(kind),
                        message: details.clone(),
                    });
                }
                self.set_status(camera_error_status(&e));
            }
            DecodeEvent::Ended => {
                warn!("Camera stream ended");
                self.stop_scanning().await;
                self.set_status(camera_error_status(&CameraError::NoDevice {
                    details: "camera stream ended".to_string(),
                }));
            }
        }
    }

    fn capture(&mut self, text: String) {
        if text.is_empty() {
            debug!("Ignoring empty decode result");
            return;
        }

        self.event_bus.emit(ScannerEvent::CodeDecoded {
            text: text.clone(),
            timestamp: SystemTime::now(),
        });

        let target = self.router.active_target();
        let value = payload::interpret(&text, target);
        let status = capture_status(target, &value);

        self.router.write(target, value.clone());
        self.event_bus.emit(ScannerEvent::FieldCaptured {
            target,
            value,
            timestamp: SystemTime::now(),
        });
        self.set_status(status);
    }

    pub fn reset<R: Into<ResetScope>>(&mut self, scope: R) {
        let scope = scope.into();
        self.router.reset(scope);

        let (target, status) = match scope {
            ResetScope::All => (None, "All fields reset.".to_string()),
            ResetScope::Field(target) => (Some(target), format!("{} reset.", target.label())),
        };

        self.event_bus.emit(ScannerEvent::FieldReset { target });
        self.set_status(status);
    }

    /// Submit the captured fields and set the resulting status message
    pub async fn submit(&mut self) -> Result<StatusMessage, SubmissionError> {
        let result = self.submitter.submit(&self.router).await;

        let text = match &result {
            Ok(message) => message.clone(),
            Err(e) => e.status_message(),
        };

        if !matches!(result, Err(SubmissionError::Incomplete)) {
            self.event_bus.emit(ScannerEvent::SubmissionSent {
                success: result.is_ok(),
                timestamp: SystemTime::now(),
            });
        }

        let status = self.set_status(text);
        result.map(|_| status)
    }

    /// Wait for the next decode event. Pending forever while not scanning.
    pub async fn next_decode_event(&mut self) -> Option<DecodeEvent> {
        match self.handle.as_mut() {
            Some(handle) => {
                let event = handle.next_event().await;
                if event.is_none() {
                    debug!("Decode stream channel closed");
                    self.handle = None;
                }
                event
            }
            None => std::future::pending().await,
        }
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn router(&self) -> &FieldRouter {
        &self.router
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn set_status(&mut self, text: String) -> StatusMessage {
        let status = StatusMessage::new(text);
        self.event_bus.emit(ScannerEvent::StatusChanged {
            message: status.text.clone(),
            is_error: status.is_error,
        });
        self.status = Some(status.clone());
        status
    }

    fn publish_stream_state(&self) {
        self.event_bus.emit(ScannerEvent::StreamStateChanged {
            state: self.stream.state(),
            timestamp: SystemTime::now(),
        });
    }
}

fn scan_error_kind(kind: &str) -> ScanErrorKind {
    match kind {
        "not found" => ScanErrorKind::NotFound,
        "checksum" => ScanErrorKind::Checksum,
        "format" => ScanErrorKind::Format,
        _ => ScanErrorKind::Other,
    }
}
