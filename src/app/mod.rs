mod runtime;
mod session;
mod shutdown;
mod status;
mod types;


pub use session::ScannerSession;
pub use status::{camera_error_status, capture_status, StatusMessage};
pub use types::{OperatorCommand, ShutdownReason};
