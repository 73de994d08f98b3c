pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod keyboard_input;
pub mod payload;
pub mod router;
pub mod submission;

pub use app::{OperatorCommand, ScannerSession, ShutdownReason, StatusMessage};
pub use camera::{
    CameraPlatform, DecodeEvent, DecodeStream, DecodeStreamBuilder, DeviceRequest, DeviceResolver,
    DisplaySurface, SimulatedPlatform, StreamState,
};
pub use config::ScannerConfig;
pub use error::{CameraError, Result, ScannerError, SubmissionError};
pub use events::{EventBus, EventFilter, EventReceiver, ScannerEvent};
pub use keyboard_input::{FieldBoard, OperatorConsole};
pub use payload::{interpret, Payload};
pub use router::{CaptureTarget, CapturedValue, FieldRouter, ResetScope, SubmissionPacket};
pub use submission::{BackendResponse, HttpPacketBackend, PacketBackend, SubmissionController};

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::GstCameraPlatform;
