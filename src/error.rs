use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScannerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the operator can keep working after this error.
    ///
    /// Only configuration and local IO problems stop the process; every
    /// capture and submission failure degrades to a status message.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ScannerError::Camera(_) | ScannerError::Submission(_) => true,
            ScannerError::EventBus(_) => true,
            ScannerError::Component { .. } => true,
            ScannerError::Config(_)
            | ScannerError::Io(_)
            | ScannerError::Serialization(_)
            | ScannerError::Deserialization(_)
            | ScannerError::System { .. } => false,
        }
    }
}

/// Classified failures raised by the capture pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera access requires a secure context (HTTPS or localhost)")]
    SecureContext,

    #[error("Media capture is not supported on this platform")]
    UnsupportedPlatform,

    #[error("No camera found: {details}")]
    NoDevice { details: String },

    #[error("Camera {device} is busy or unavailable")]
    DeviceBusy { device: String },

    #[error("Decode error ({kind}): {details}")]
    DecodeRuntime { kind: String, details: String },

    #[error("Failed to initialize camera: {details}")]
    Initialization { details: String },
}

/// Failures of a packet submission
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("All fields must be scanned.")]
    Incomplete,

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend responded with status {status}")]
    Status { status: u16 },

    #[error("Unexpected backend response: {details}")]
    InvalidResponse { details: String },
}

impl SubmissionError {
    /// Message shown to the operator for this failure
    pub fn status_message(&self) -> String {
        match self {
            SubmissionError::Incomplete => self.to_string(),
            _ => "Error updating packet info".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ScannerError>;
