use config::{Config, ConfigError, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    pub camera: CameraConfig,
    pub submission: SubmissionConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Requested capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Requested frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Origin the capture runs under, checked for the secure-context rule
    #[serde(default = "default_camera_origin")]
    pub origin: String,

    /// GStreamer element used as the display surface
    #[serde(default = "default_display_sink")]
    pub display_sink: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubmissionConfig {
    /// Backend base URL
    #[serde(default = "default_submission_endpoint")]
    pub endpoint: String,

    /// Path of the packet update route
    #[serde(default = "default_submission_path")]
    pub path: String,

    /// Request timeout in seconds
    #[serde(default = "default_submission_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ScannerConfig {
    /// Load configuration from a file (optional) plus `SCANNER_*` environment variables
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.origin", default_camera_origin())?
            .set_default("camera.display_sink", default_display_sink())?
            .set_default("submission.endpoint", default_submission_endpoint())?
            .set_default("submission.path", default_submission_path())?
            .set_default("submission.timeout_seconds", default_submission_timeout())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // SCANNER_SUBMISSION__ENDPOINT=... overrides submission.endpoint
            .add_source(
                Environment::with_prefix("SCANNER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.submission.endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Submission endpoint must not be empty".to_string(),
            ));
        }

        if !self.submission.path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "Submission path must start with '/': {}",
                self.submission.path
            )));
        }

        if self.submission.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Submission timeout must be greater than 0".to_string(),
            ));
        }

        self.submission_url()?;

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Full URL of the packet update route
    pub fn submission_url(&self) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}{}",
            self.submission.endpoint.trim_end_matches('/'),
            self.submission.path
        );

        Url::parse(&joined).map_err(|e| {
            ConfigError::Message(format!("Invalid submission URL '{}': {}", joined, e))
        })
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                origin: default_camera_origin(),
                display_sink: default_display_sink(),
            },
            submission: SubmissionConfig {
                endpoint: default_submission_endpoint(),
                path: default_submission_path(),
                timeout_seconds: default_submission_timeout(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_camera_origin() -> String {
    "https://localhost".to_string()
}
fn default_display_sink() -> String {
    "autovideosink".to_string()
}

fn default_submission_endpoint() -> String {
    "http://localhost:3021".to_string()
}
fn default_submission_path() -> String {
    "/updatePacketInfo".to_string()
}
fn default_submission_timeout() -> u64 {
    10
}

fn default_event_bus_capacity() -> usize {
    100
}
