use super::platform::CameraPlatform;
use super::stream::DecodeStream;
use crate::error::{Result, ScannerError};
use std::sync::Arc;

/// Decode events buffered before the decode loop waits on the subscriber
const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Builder for a decode stream
pub struct DecodeStreamBuilder {
    platform: Option<Arc<dyn CameraPlatform>>,
}

impl DecodeStreamBuilder {
    pub fn new() -> Self {
        Self {
            platform: None,
        }
    }

    pub fn platform(mut self, platform: Arc<dyn CameraPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn build(self) -> Result<DecodeStream> {
        let platform = self
            .platform
            .ok_or_else(|| ScannerError::system("Camera platform must be specified"))?;

        Ok(DecodeStream::new(platform, DEFAULT_EVENT_CAPACITY))
    }
}

impl Default for DecodeStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}
