use super::platform::{
    is_secure_origin, CameraPlatform, DecodeSession, DeviceRequest, DisplaySurface, ScanResult,
    VideoDevice,
};
use crate::error::CameraError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Empty frames shown before each scripted code
const FRAMES_BEFORE_CODE: usize = 3;

/// How device enumeration behaves
#[derive(Debug, Clone)]
pub enum Enumeration {
    Devices(Vec<VideoDevice>),
    Fails(String),
}

/// Scripted camera platform replaying a fixed sequence of decode attempts.
///
/// Each opened session replays the script from the start at
/// `frame_interval`. Once the script is exhausted the camera keeps showing
/// empty frames, unless `end_after_script` is set, in which case the session
/// ends as if the camera had been unplugged.
pub struct SimulatedPlatform {
    secure: bool,
    media_capture: bool,
    enumeration: Enumeration,
    failing: Vec<DeviceRequest>,
    script: Vec<ScanResult>,
    frame_interval: Duration,
    end_after_script: bool,
    in_use: Arc<AtomicBool>,
    enumerations: AtomicUsize,
    opened: Mutex<Vec<DeviceRequest>>,
}

impl SimulatedPlatform {
    /// A secure platform with one rear camera and an empty script
    pub fn new() -> Self {
        Self {
            secure: true,
            media_capture: true,
            enumeration: Enumeration::Devices(vec![VideoDevice::new(
                "sim-rear",
                "Simulated rear camera",
            )]),
            failing: Vec::new(),
            script: Vec::new(),
            frame_interval: Duration::from_millis(10),
            end_after_script: false,
            in_use: Arc::new(AtomicBool::new(false)),
            enumerations: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Script from newline-separated payloads, with empty frames between codes
    pub fn from_payload_lines(text: &str) -> Self {
        let mut script = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            script.extend((0..FRAMES_BEFORE_CODE).map(|_| ScanResult::not_found()));
            script.push(ScanResult::Text(line.to_string()));
        }

        info!("Simulated camera loaded with {} payloads", script.len() / (FRAMES_BEFORE_CODE + 1));
        Self::new().with_script(script)
    }

    /// Mark the context secure when `origin` passes the secure-origin rule
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.secure = is_secure_origin(origin);
        self
    }

    pub fn with_secure_context(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_media_capture(mut self, supported: bool) -> Self {
        self.media_capture = supported;
        self
    }

    pub fn with_enumeration(mut self, enumeration: Enumeration) -> Self {
        self.enumeration = enumeration;
        self
    }

    /// Make opening `request` fail with `NoDevice`
    pub fn with_failing_device(mut self, request: DeviceRequest) -> Self {
        self.failing.push(request);
        self
    }

    pub fn with_script(mut self, script: Vec<ScanResult>) -> Self {
        self.script = script;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn end_after_script(mut self, end: bool) -> Self {
        self.end_after_script = end;
        self
    }

    /// Number of times devices were enumerated
    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Every open request seen so far, in order
    pub fn open_requests(&self) -> Vec<DeviceRequest> {
        self.opened.lock().clone()
    }

    /// Whether a session currently holds the camera
    pub fn camera_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraPlatform for SimulatedPlatform {
    fn is_secure_context(&self) -> bool {
        self.secure
    }

    fn supports_media_capture(&self) -> bool {
        self.media_capture
    }

    async fn enumerate_devices(&self) -> Result<Vec<VideoDevice>, CameraError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);

        match &self.enumeration {
            Enumeration::Devices(devices) => Ok(devices.clone()),
            Enumeration::Fails(details) => Err(CameraError::Initialization {
                details: details.clone(),
            }),
        }
    }

    async fn open(
        &self,
        request: &DeviceRequest,
        _surface: &DisplaySurface,
    ) -> Result<Box<dyn DecodeSession>, CameraError> {
        self.opened.lock().push(request.clone());

        if self.failing.contains(request) {
            return Err(CameraError::NoDevice {
                details: format!("{} could not be opened", request),
            });
        }

        let label = match request {
            DeviceRequest::Specific(id) => id.clone(),
            DeviceRequest::Default => "default".to_string(),
        };

        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(CameraError::DeviceBusy { device: label });
        }

        debug!("Simulated camera '{}' opened", label);

        Ok(Box::new(SimulatedSession {
            label,
            script: self.script.iter().cloned().collect(),
            frame_interval: self.frame_interval,
            end_after_script: self.end_after_script,
            in_use: Arc::clone(&self.in_use),
            released: false,
        }))
    }
}

struct SimulatedSession {
    label: String,
    script: VecDeque<ScanResult>,
    frame_interval: Duration,
    end_after_script: bool,
    in_use: Arc<AtomicBool>,
    released: bool,
}

impl SimulatedSession {
    fn release_camera(&mut self) {
        if !self.released {
            self.released = true;
            self.in_use.store(false, Ordering::SeqCst);
            debug!("Simulated camera '{}' released", self.label);
        }
    }
}

#[async_trait]
impl DecodeSession for SimulatedSession {
    fn device(&self) -> &str {
        &self.label
    }

    async fn next_attempt(&mut self) -> Option<ScanResult> {
        if self.released {
            return None;
        }

        tokio::time::sleep(self.frame_interval).await;

        match self.script.pop_front() {
            Some(attempt) => Some(attempt),
            None if self.end_after_script => None,
            None => {
                trace!("Simulated camera idle frame");
                Some(ScanResult::not_found())
            }
        }
    }

    async fn release(&mut self) {
        self.release_camera();
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.release_camera();
    }
}
