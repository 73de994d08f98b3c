use crate::router::CaptureTarget;

/// Operator actions fed into a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    SelectTarget(CaptureTarget),
    /// Move to the next target in selection order
    NextTarget,
    ResetField(CaptureTarget),
    ResetActiveField,
    ResetAll,
    Submit,
    /// Stop the camera and start it again from device resolution
    Restart,
    Quit,
}

/// Why a session loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    ConsoleClosed,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::UserRequest => f.write_str("operator quit"),
            ShutdownReason::ConsoleClosed => f.write_str("console closed"),
        }
    }
}
