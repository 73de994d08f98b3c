mod builder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod platform;
mod resolver;
mod simulated;
mod stream;

pub use builder::DecodeStreamBuilder;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCameraPlatform;
pub use platform::{
    is_secure_origin, CameraPlatform, DecodeSession, DeviceRequest, DisplaySurface,
    ScanErrorKind, ScanResult, VideoDevice,
};
pub use resolver::DeviceResolver;
pub use simulated::{Enumeration, SimulatedPlatform};
pub use stream::{DecodeEvent, DecodeStream, StreamHandle, StreamState};
