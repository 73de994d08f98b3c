use super::{ScannerSession, ShutdownReason};
use crate::events::ScannerEvent;
use std::time::SystemTime;
use tracing::info;

impl ScannerSession {
    /// Stop the camera and announce the shutdown
    pub async fn shutdown(&mut self, reason: &ShutdownReason) {
        info!("Beginning graceful shutdown");

        self.stop_scanning().await;

        self.event_bus().emit(ScannerEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.to_string(),
        });

        info!("Graceful shutdown completed");
    }
}
