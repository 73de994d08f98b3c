use crate::error::CameraError;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A video input device reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    pub id: String,
    pub label: String,
}

impl VideoDevice {
    pub fn new<S: Into<String>>(id: S, label: S) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Which camera to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    /// A device returned by enumeration
    Specific(String),
    /// Whatever camera the platform picks when no identifier is given
    Default,
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Specific(id) => write!(f, "device '{}'", id),
            DeviceRequest::Default => f.write_str("default camera"),
        }
    }
}

/// Where live video is presented while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySurface {
    /// Platform-specific sink description, `None` for headless capture
    pub sink: Option<String>,
}

impl DisplaySurface {
    pub fn headless() -> Self {
        Self { sink: None }
    }

    pub fn window<S: Into<String>>(sink: S) -> Self {
        Self {
            sink: Some(sink.into()),
        }
    }
}

/// Why a single decode attempt produced no text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanErrorKind {
    /// No code visible in the frame
    NotFound,
    /// A code was seen but its error correction failed
    Checksum,
    /// A code was seen but could not be parsed
    Format,
    Other,
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanErrorKind::NotFound => "not found",
            ScanErrorKind::Checksum => "checksum",
            ScanErrorKind::Format => "format",
            ScanErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Text(String),
    Error { kind: ScanErrorKind, message: String },
}

impl ScanResult {
    pub fn not_found() -> Self {
        ScanResult::Error {
            kind: ScanErrorKind::NotFound,
            message: "No code found in frame".to_string(),
        }
    }
}

/// Media capture capability of the host
#[async_trait]
pub trait CameraPlatform: Send + Sync {
    /// Whether camera access is permitted in this context
    fn is_secure_context(&self) -> bool;

    /// Whether the platform can capture video at all
    fn supports_media_capture(&self) -> bool;

    /// List video input devices in platform order
    async fn enumerate_devices(&self) -> Result<Vec<VideoDevice>, CameraError>;

    /// Acquire a camera and begin continuous decoding onto `surface`
    async fn open(
        &self,
        request: &DeviceRequest,
        surface: &DisplaySurface,
    ) -> Result<Box<dyn DecodeSession>, CameraError>;
}

/// An exclusively held camera producing decode attempts
#[async_trait]
pub trait DecodeSession: Send {
    /// Label of the device backing this session
    fn device(&self) -> &str;

    /// Wait for the next decode attempt; `None` once the camera is gone
    async fn next_attempt(&mut self) -> Option<ScanResult>;

    /// Release the camera. Must be safe to call more than once.
    async fn release(&mut self);
}

/// Secure origins are `https` URLs or loopback hosts
pub fn is_secure_origin(origin: &str) -> bool {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if url.scheme() == "https" {
        return true;
    }

    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_origins() {
        assert!(is_secure_origin("https://scanner.example.com"));
        assert!(is_secure_origin("http://localhost:3000"));
        assert!(is_secure_origin("http://127.0.0.1:3000"));
        assert!(is_secure_origin("http://127.10.0.1"));
        assert!(is_secure_origin("http://[::1]:8080"));
    }

    #[test]
    fn test_insecure_origins() {
        assert!(!is_secure_origin("http://192.168.1.20:3000"));
        assert!(!is_secure_origin("http://scanner.example.com"));
        assert!(!is_secure_origin("not an origin"));
    }
}
