use super::platform::{CameraPlatform, DecodeSession, DeviceRequest, DisplaySurface};
use crate::error::CameraError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Picks the camera to open, falling back to the platform default
#[derive(Clone)]
pub struct DeviceResolver {
    platform: Arc<dyn CameraPlatform>,
}

impl DeviceResolver {
    pub fn new(platform: Arc<dyn CameraPlatform>) -> Self {
        Self { platform }
    }

    /// Choose a device: the first enumerated one, or the default camera when
    /// enumeration fails or comes back empty.
    pub async fn resolve(&self) -> DeviceRequest {
        match self.platform.enumerate_devices().await {
            Ok(devices) => match devices.into_iter().next() {
                Some(device) => {
                    info!("Using camera '{}' ({})", device.label, device.id);
                    DeviceRequest::Specific(device.id)
                }
                None => {
                    warn!("No cameras enumerated, requesting the default camera");
                    DeviceRequest::Default
                }
            },
            Err(e) => {
                warn!("Device enumeration failed, requesting the default camera: {}", e);
                DeviceRequest::Default
            }
        }
    }

    /// Resolve and open a camera.
    ///
    /// A failed open of an enumerated device is retried once against the
    /// default camera; only when that also fails is the error returned.
    pub async fn acquire(
        &self,
        surface: &DisplaySurface,
    ) -> Result<Box<dyn DecodeSession>, CameraError> {
        let request = self.resolve().await;

        match self.platform.open(&request, surface).await {
            Ok(session) => Ok(session),
            Err(e) if request != DeviceRequest::Default => {
                warn!("Opening {} failed, trying the default camera: {}", request, e);
                self.open_default(surface).await
            }
            Err(e) => Err(e),
        }
    }

    async fn open_default(
        &self,
        surface: &DisplaySurface,
    ) -> Result<Box<dyn DecodeSession>, CameraError> {
        let session = self.platform.open(&DeviceRequest::Default, surface).await?;
        debug!("Default camera opened: {}", session.device());
        Ok(session)
    }
}
