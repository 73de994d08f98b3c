use crate::error::CameraError;
use crate::router::{CaptureTarget, CapturedValue};
use std::fmt;

/// The single user-visible status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    /// Messages mentioning "error" are shown as errors
    pub fn new<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        let is_error = text.to_lowercase().contains("error");
        Self { text, is_error }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn capture_status(target: CaptureTarget, value: &CapturedValue) -> String {
    format!("{} scanned: {}", target.label(), value)
}

pub fn camera_error_status(err: &CameraError) -> String {
    let friendly = match err {
        CameraError::SecureContext => {
            "Camera access requires HTTPS. Please use HTTPS or localhost.".to_string()
        }
        CameraError::UnsupportedPlatform => {
            "Camera access not supported on this platform.".to_string()
        }
        CameraError::NoDevice { .. } => {
            "No camera detected. Please ensure a camera is connected and try again.".to_string()
        }
        CameraError::Initialization { details }
            if details.to_lowercase().contains("permission denied") =>
        {
            "Camera permission denied. Please allow camera access and retry.".to_string()
        }
        other => other.to_string(),
    };

    format!("Scanner error: {}", friendly)
}
