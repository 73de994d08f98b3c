use super::platform::{CameraPlatform, DecodeSession, DisplaySurface, ScanErrorKind, ScanResult};
use super::resolver::DeviceResolver;
use crate::error::CameraError;
use futures::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// How long `stop` waits for the decode task before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Decode stream lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// What a running stream reports to its subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// Text decoded from a frame
    Decoded(String),
    /// A per-frame failure other than "not found"; the stream keeps running
    Error(CameraError),
    /// The camera went away and the stream stopped on its own
    Ended,
}

/// Subscriber side of a running decode session
pub struct StreamHandle {
    device: String,
    events: mpsc::Receiver<DecodeEvent>,
}

impl StreamHandle {
    /// Label of the camera in use
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Next event, `None` once the stream has been torn down
    pub async fn next_event(&mut self) -> Option<DecodeEvent> {
        self.events.recv().await
    }

    pub fn into_stream(mut self) -> impl Stream<Item = DecodeEvent> {
        async_stream::stream! {
            while let Some(event) = self.events.recv().await {
                yield event;
            }
        }
    }
}

struct Worker {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One continuous decode session against a camera and a display surface
pub struct DecodeStream {
    platform: Arc<dyn CameraPlatform>,
    resolver: DeviceResolver,
    state: Arc<RwLock<StreamState>>,
    worker: Option<Worker>,
    event_capacity: usize,
}

impl DecodeStream {
    pub fn new(platform: Arc<dyn CameraPlatform>, event_capacity: usize) -> Self {
        Self {
            resolver: DeviceResolver::new(Arc::clone(&platform)),
            platform,
            state: Arc::new(RwLock::new(StreamState::Idle)),
            worker: None,
            event_capacity: event_capacity.max(1),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    /// Resolve a camera and begin decoding.
    ///
    /// Device resolution runs from scratch on every call. A stream that is
    /// still running is stopped first so the camera is released before it is
    /// acquired again.
    pub async fn start(&mut self, surface: &DisplaySurface) -> Result<StreamHandle, CameraError> {
        if self.worker.is_some() {
            warn!("Decode stream restart requested while active, stopping first");
            self.stop().await;
        }

        self.set_state(StreamState::Starting);

        if !self.platform.is_secure_context() {
            error!("Camera access refused: not a secure context");
            self.set_state(StreamState::Stopped);
            return Err(CameraError::SecureContext);
        }

        if !self.platform.supports_media_capture() {
            error!("Camera access refused: platform has no media capture");
            self.set_state(StreamState::Stopped);
            return Err(CameraError::UnsupportedPlatform);
        }

        let session = match self.resolver.acquire(surface).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to start decode stream: {}", e);
                self.set_state(StreamState::Stopped);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let device = session.device().to_string();
        let (tx, rx) = mpsc::channel(self.event_capacity);
        let cancel = CancellationToken::new();

        self.set_state(StreamState::Running);
        info!("Decode stream {} running on {}", id, device);

        let task = tokio::spawn(Self::run_decode_loop(
            id,
            session,
            tx,
            cancel.clone(),
            Arc::clone(&self.state),
        ));

        self.worker = Some(Worker { id, cancel, task });

        Ok(StreamHandle {
            device,
            events: rx,
        })
    }

    /// Stop decoding and release the camera. No-op unless a session is active.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            debug!("Decode stream is not running");
            return;
        };

        let Worker {
            id,
            cancel,
            mut task,
        } = worker;

        info!("Stopping decode stream {}", id);
        cancel.cancel();

        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => debug!("Decode task completed"),
            Ok(Err(e)) => error!("Error waiting for decode task: {}", e),
            Err(_) => {
                // Dropping the task drops the session, which releases the camera
                warn!("Decode task did not complete within timeout, aborting");
                task.abort();
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        error!("Decode task failed while aborting: {}", e);
                    }
                }
            }
        }

        self.set_state(StreamState::Stopped);
    }

    async fn run_decode_loop(
        id: Uuid,
        mut session: Box<dyn DecodeSession>,
        tx: mpsc::Sender<DecodeEvent>,
        cancel: CancellationToken,
        state: Arc<RwLock<StreamState>>,
    ) {
        let mut not_found = 0u64;

        loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                attempt = session.next_attempt() => attempt,
            };

            let event = match attempt {
                Some(ScanResult::Text(text)) => {
                    debug!("Decoded '{}' after {} empty frames", text, not_found);
                    not_found = 0;
                    DecodeEvent::Decoded(text)
                }
                Some(ScanResult::Error {
                    kind: ScanErrorKind::NotFound,
                    ..
                }) => {
                    not_found += 1;
                    trace!("No code in frame ({} consecutive)", not_found);
                    continue;
                }
                Some(ScanResult::Error { kind, message }) => {
                    warn!("Decode attempt failed ({}): {}", kind, message);
                    DecodeEvent::Error(CameraError::DecodeRuntime {
                        kind: kind.to_string(),
                        details: message,
                    })
                }
                None => {
                    warn!("Camera {} stopped producing frames", session.device());
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tx.send(DecodeEvent::Ended) => {}
                    }
                    break;
                }
            };

            // One result is delivered before the next attempt is taken
            let delivered = tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(event) => sent.is_ok(),
            };

            if !delivered {
                debug!("Decode stream {} subscriber dropped", id);
                break;
            }
        }

        session.release().await;
        *state.write() = StreamState::Stopped;
        info!("Decode stream {} stopped", id);
    }

    fn set_state(&self, next: StreamState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("Decode stream state: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.cancel();
        }
    }
}
