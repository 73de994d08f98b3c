use super::platform::{
    is_secure_origin, CameraPlatform, DecodeSession, DeviceRequest, DisplaySurface,
    ScanErrorKind, ScanResult, VideoDevice,
};
use crate::config::CameraConfig;
use crate::error::CameraError;
use async_trait::async_trait;
use futures::StreamExt;
use gstreamer::prelude::*;
use gstreamer::{MessageView, Pipeline};
use tracing::{debug, error, info, warn};

/// Device property keys that carry a usable source path, in preference order
const DEVICE_PATH_KEYS: [&str; 3] = ["api.v4l2.path", "device.path", "object.path"];

/// GStreamer camera platform decoding with the `zbar` element
pub struct GstCameraPlatform {
    config: CameraConfig,
}

impl GstCameraPlatform {
    pub fn new(config: CameraConfig) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Initialization {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        info!(
            "GStreamer camera platform ready ({}x{} @ {}fps)",
            config.resolution.0, config.resolution.1, config.fps
        );

        Ok(Self { config })
    }

    fn build_pipeline_string(&self, request: &DeviceRequest, surface: &DisplaySurface) -> String {
        let source = source_element(request);
        let (width, height) = self.config.resolution;
        let display = match &surface.sink {
            Some(sink) => format!("{} sync=false", sink),
            None => "fakesink sync=false".to_string(),
        };

        format!(
            "{} ! videoconvert ! videoscale ! \
             video/x-raw,width={},height={},framerate={}/1 ! tee name=t \
             t. ! queue leaky=downstream max-size-buffers=2 ! videoconvert ! zbar name=decoder ! fakesink sync=false \
             t. ! queue leaky=downstream max-size-buffers=2 ! videoconvert ! {}",
            source, width, height, self.config.fps, display
        )
    }

    fn classify_start_failure(request: &DeviceRequest, details: String) -> CameraError {
        let lowered = details.to_lowercase();
        if lowered.contains("busy") {
            CameraError::DeviceBusy {
                device: request.to_string(),
            }
        } else if lowered.contains("not found") || lowered.contains("no such") {
            CameraError::NoDevice { details }
        } else {
            CameraError::Initialization { details }
        }
    }
}

/// Source element for a device request, with the device path quoted for `parse::launch`
fn source_element(request: &DeviceRequest) -> String {
    match request {
        DeviceRequest::Specific(path) => format!(
            "v4l2src device=\"{}\"",
            path.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        DeviceRequest::Default => "autovideosrc".to_string(),
    }
}

#[async_trait]
impl CameraPlatform for GstCameraPlatform {
    fn is_secure_context(&self) -> bool {
        is_secure_origin(&self.config.origin)
    }

    fn supports_media_capture(&self) -> bool {
        let has_source = gstreamer::ElementFactory::find("v4l2src").is_some()
            || gstreamer::ElementFactory::find("autovideosrc").is_some();
        let has_decoder = gstreamer::ElementFactory::find("zbar").is_some();

        if !has_decoder {
            warn!("GStreamer 'zbar' element not available");
        }

        has_source && has_decoder
    }

    async fn enumerate_devices(&self) -> Result<Vec<VideoDevice>, CameraError> {
        let monitor = gstreamer::DeviceMonitor::new();
        let _ = monitor.add_filter(Some("Video/Source"), None);

        monitor.start().map_err(|e| CameraError::Initialization {
            details: format!("Device monitor failed to start: {}", e),
        })?;

        let devices = monitor
            .devices()
            .into_iter()
            .filter_map(|device| {
                let label = device.display_name().to_string();
                let id = device.properties().and_then(|props| {
                    DEVICE_PATH_KEYS
                        .iter()
                        .find_map(|key| props.get::<String>(*key).ok())
                });

                match id {
                    Some(id) => Some(VideoDevice { id, label }),
                    None => {
                        debug!("Skipping video device '{}' without a source path", label);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        monitor.stop();
        debug!("Enumerated {} video devices", devices.len());

        Ok(devices)
    }

    async fn open(
        &self,
        request: &DeviceRequest,
        surface: &DisplaySurface,
    ) -> Result<Box<dyn DecodeSession>, CameraError> {
        let description = self.build_pipeline_string(request, surface);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Initialization {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Initialization {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let bus = pipeline.bus().ok_or_else(|| CameraError::Initialization {
            details: "Pipeline has no bus".to_string(),
        })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(Self::classify_start_failure(request, e.to_string()));
        }

        // Device errors surface on the bus while prerolling
        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if result.is_err() {
            let details = bus
                .pop_filtered(&[gstreamer::MessageType::Error])
                .and_then(|msg| match msg.view() {
                    MessageView::Error(err) => Some(err.error().to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| "pipeline failed to start".to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(Self::classify_start_failure(request, details));
        }

        let device = match request {
            DeviceRequest::Specific(path) => path.clone(),
            DeviceRequest::Default => "default".to_string(),
        };

        Ok(Box::new(GstDecodeSession {
            device,
            messages: bus.stream(),
            pipeline,
            failed: false,
            released: false,
        }))
    }
}

struct GstDecodeSession {
    device: String,
    pipeline: Pipeline,
    messages: gstreamer::bus::BusStream,
    failed: bool,
    released: bool,
}

#[async_trait]
impl DecodeSession for GstDecodeSession {
    fn device(&self) -> &str {
        &self.device
    }

    async fn next_attempt(&mut self) -> Option<ScanResult> {
        if self.failed || self.released {
            return None;
        }

        while let Some(msg) = self.messages.next().await {
            match msg.view() {
                MessageView::Element(element) => {
                    let Some(structure) = element.structure() else {
                        continue;
                    };
                    if !structure.has_name("barcode") {
                        continue;
                    }
                    match structure.get::<String>("symbol") {
                        Ok(symbol) => return Some(ScanResult::Text(symbol)),
                        Err(e) => {
                            return Some(ScanResult::Error {
                                kind: ScanErrorKind::Format,
                                message: format!("Unreadable symbol: {}", e),
                            })
                        }
                    }
                }
                MessageView::Error(err) => {
                    error!("GStreamer pipeline error: {}", err.error());
                    self.failed = true;
                    return Some(ScanResult::Error {
                        kind: ScanErrorKind::Other,
                        message: err.error().to_string(),
                    });
                }
                MessageView::Eos(_) => {
                    info!("Camera stream reached end of stream");
                    return None;
                }
                _ => {}
            }
        }

        None
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
        info!("Camera '{}' released", self.device);
    }
}

impl Drop for GstDecodeSession {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_is_quoted() {
        assert_eq!(
            source_element(&DeviceRequest::Specific("/dev/video0".to_string())),
            "v4l2src device=\"/dev/video0\""
        );
        assert_eq!(
            source_element(&DeviceRequest::Specific("USB \"HD\" Camera".to_string())),
            "v4l2src device=\"USB \\\"HD\\\" Camera\""
        );
        assert_eq!(source_element(&DeviceRequest::Default), "autovideosrc");
    }
}
