use crate::config::ScannerConfig;
use crate::error::{Result, ScannerError, SubmissionError};
use crate::router::{FieldRouter, SubmissionPacket};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Successful backend reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendResponse {
    pub message: String,
}

/// Destination for completed packets
#[async_trait]
pub trait PacketBackend: Send + Sync {
    async fn update_packet_info(
        &self,
        packet: &SubmissionPacket,
    ) -> std::result::Result<BackendResponse, SubmissionError>;
}

/// JSON-over-HTTP backend: `POST <endpoint>/updatePacketInfo`
pub struct HttpPacketBackend {
    http: Client,
    url: Url,
}

impl HttpPacketBackend {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ScannerError::component("submission".to_string(), e.to_string()))?;

        Ok(Self { http, url })
    }

    pub fn from_config(config: &ScannerConfig) -> Result<Self> {
        let url = config.submission_url()?;
        Self::new(url, Duration::from_secs(config.submission.timeout_seconds))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PacketBackend for HttpPacketBackend {
    async fn update_packet_info(
        &self,
        packet: &SubmissionPacket,
    ) -> std::result::Result<BackendResponse, SubmissionError> {
        debug!("POST {}", self.url);

        let response = self
            .http
            .post(self.url.clone())
            .json(packet)
            .send()
            .await
            .map_err(|source| SubmissionError::Transport {
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SubmissionError::InvalidResponse {
                details: e.to_string(),
            })?;

        match body.get("message").and_then(Value::as_str) {
            Some(message) => Ok(BackendResponse {
                message: message.to_string(),
            }),
            None => Err(SubmissionError::InvalidResponse {
                details: format!("no 'message' string in {}", body),
            }),
        }
    }
}

/// Gates submission on a complete set of fields and sends it once
#[derive(Clone)]
pub struct SubmissionController {
    backend: Arc<dyn PacketBackend>,
}

impl SubmissionController {
    pub fn new(backend: Arc<dyn PacketBackend>) -> Self {
        Self { backend }
    }

    /// Submit the captured fields.
    ///
    /// Incomplete fields fail with [`SubmissionError::Incomplete`] before any
    /// request is made. Each call makes at most one request; there is no retry.
    pub async fn submit(
        &self,
        router: &FieldRouter,
    ) -> std::result::Result<String, SubmissionError> {
        let Some(packet) = router.snapshot() else {
            warn!(
                "Submission blocked, missing: {:?}",
                router.missing()
            );
            return Err(SubmissionError::Incomplete);
        };

        info!(
            "Submitting packet data: packet_id={} start_sequence={} end_sequence={}",
            packet.packet_id, packet.start_sequence, packet.end_sequence
        );

        match self.backend.update_packet_info(&packet).await {
            Ok(response) => {
                info!("Backend accepted packet: {}", response.message);
                Ok(response.message)
            }
            Err(e) => {
                error!("Packet submission failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::CaptureTarget;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingBackend {
        sent: Mutex<Vec<SubmissionPacket>>,
        fail: bool,
    }

    #[async_trait]
    impl PacketBackend for RecordingBackend {
        async fn update_packet_info(
            &self,
            packet: &SubmissionPacket,
        ) -> std::result::Result<BackendResponse, SubmissionError> {
            self.sent.lock().push(packet.clone());
            if self.fail {
                Err(SubmissionError::Status { status: 503 })
            } else {
                Ok(BackendResponse {
                    message: "ok".to_string(),
                })
            }
        }
    }

    fn router_with(values: &[(CaptureTarget, serde_json::Value)]) -> FieldRouter {
        let mut router = FieldRouter::new();
        for (target, value) in values {
            router.write(*target, crate::router::CapturedValue::from_json(value.clone()).unwrap());
        }
        router
    }

    #[tokio::test]
    async fn test_incomplete_fields_never_reach_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = SubmissionController::new(Arc::clone(&backend) as Arc<dyn PacketBackend>);

        let partial = router_with(&[
            (CaptureTarget::PacketId, json!("P1")),
            (CaptureTarget::StartSequence, json!(1)),
        ]);

        let result = controller.submit(&partial).await;
        assert!(matches!(result, Err(SubmissionError::Incomplete)));

        let empty = FieldRouter::new();
        assert!(controller.submit(&empty).await.is_err());

        assert!(backend.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_complete_fields_are_sent_once() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = SubmissionController::new(Arc::clone(&backend) as Arc<dyn PacketBackend>);

        let router = router_with(&[
            (CaptureTarget::PacketId, json!("P1")),
            (CaptureTarget::StartSequence, json!(1)),
            (CaptureTarget::EndSequence, json!(100)),
        ]);

        let message = controller.submit(&router).await.unwrap();
        assert_eq!(message, "ok");

        let sent = backend.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            serde_json::to_value(&sent[0]).unwrap(),
            json!({"packet_id": "P1", "start_sequence": 1, "end_sequence": 100})
        );
    }

    #[tokio::test]
    async fn test_failed_submission_can_be_repeated() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let controller = SubmissionController::new(Arc::clone(&backend) as Arc<dyn PacketBackend>);

        let router = router_with(&[
            (CaptureTarget::PacketId, json!("P1")),
            (CaptureTarget::StartSequence, json!(1)),
            (CaptureTarget::EndSequence, json!(100)),
        ]);

        let first = controller.submit(&router).await.unwrap_err();
        assert_eq!(first.status_message(), "Error updating packet info");

        let _ = controller.submit(&router).await;
        assert_eq!(backend.sent.lock().len(), 2);
    }

    #[test]
    fn test_http_backend_from_config() {
        let config = ScannerConfig::default();
        let backend = HttpPacketBackend::from_config(&config).unwrap();

        assert_eq!(backend.url().as_str(), "http://localhost:3021/updatePacketInfo");
    }
}
