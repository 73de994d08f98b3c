use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// The field the next successful scan populates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureTarget {
    PacketId,
    StartSequence,
    EndSequence,
}

impl CaptureTarget {
    pub const ALL: [CaptureTarget; 3] = [
        CaptureTarget::PacketId,
        CaptureTarget::StartSequence,
        CaptureTarget::EndSequence,
    ];

    /// Human-readable label used in status messages
    pub fn label(&self) -> &'static str {
        match self {
            CaptureTarget::PacketId => "Packet ID",
            CaptureTarget::StartSequence => "Start Sequence",
            CaptureTarget::EndSequence => "End Sequence",
        }
    }

    /// Member name looked up in structured payloads and sent to the backend
    pub fn member(&self) -> &'static str {
        match self {
            CaptureTarget::PacketId => "packet_id",
            CaptureTarget::StartSequence => "start_sequence",
            CaptureTarget::EndSequence => "end_sequence",
        }
    }

    /// Next target in selection order, wrapping around
    pub fn next(&self) -> CaptureTarget {
        match self {
            CaptureTarget::PacketId => CaptureTarget::StartSequence,
            CaptureTarget::StartSequence => CaptureTarget::EndSequence,
            CaptureTarget::EndSequence => CaptureTarget::PacketId,
        }
    }

    fn slot(&self) -> usize {
        match self {
            CaptureTarget::PacketId => 0,
            CaptureTarget::StartSequence => 1,
            CaptureTarget::EndSequence => 2,
        }
    }
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A scanned scalar held in one field slot.
///
/// Usually a string or a number; a structured payload without the expected
/// member is kept whole. Never JSON `null`, an unset slot is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapturedValue(Value);

impl CapturedValue {
    /// Wrap a JSON value, rejecting `null`
    pub fn from_json(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self(Value::String(text.into()))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<&str> for CapturedValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for CapturedValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<i64> for CapturedValue {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

/// Snapshot sent to the backend once all three fields are captured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPacket {
    pub packet_id: CapturedValue,
    pub start_sequence: CapturedValue,
    pub end_sequence: CapturedValue,
}

/// Which slots a reset clears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    All,
    Field(CaptureTarget),
}

impl From<CaptureTarget> for ResetScope {
    fn from(target: CaptureTarget) -> Self {
        ResetScope::Field(target)
    }
}

/// Three-slot store plus the currently targeted field
#[derive(Debug, Clone)]
pub struct FieldRouter {
    active: CaptureTarget,
    slots: [Option<CapturedValue>; 3],
}

impl FieldRouter {
    pub fn new() -> Self {
        Self {
            active: CaptureTarget::PacketId,
            slots: [None, None, None],
        }
    }

    pub fn set_active_target(&mut self, target: CaptureTarget) {
        if self.active != target {
            debug!("Capture target changed: {} -> {}", self.active, target);
        }
        self.active = target;
    }

    pub fn active_target(&self) -> CaptureTarget {
        self.active
    }

    /// Overwrite the slot for `target`; the last scan wins
    pub fn write(&mut self, target: CaptureTarget, value: CapturedValue) {
        debug!("{} <- {}", target, value);
        self.slots[target.slot()] = Some(value);
    }

    /// Write into the active target's slot and report which slot was written
    pub fn write_active(&mut self, value: CapturedValue) -> CaptureTarget {
        let target = self.active;
        self.write(target, value);
        target
    }

    pub fn get(&self, target: CaptureTarget) -> Option<&CapturedValue> {
        self.slots[target.slot()].as_ref()
    }

    pub fn reset<R: Into<ResetScope>>(&mut self, scope: R) {
        match scope.into() {
            ResetScope::All => {
                info!("Resetting all captured fields");
                self.slots = [None, None, None];
            }
            ResetScope::Field(target) => {
                info!("Resetting {}", target);
                self.slots[target.slot()] = None;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Targets that still have no value
    pub fn missing(&self) -> Vec<CaptureTarget> {
        CaptureTarget::ALL
            .into_iter()
            .filter(|target| self.get(*target).is_none())
            .collect()
    }

    pub fn snapshot(&self) -> Option<SubmissionPacket> {
        match &self.slots {
            [Some(packet_id), Some(start_sequence), Some(end_sequence)] => {
                Some(SubmissionPacket {
                    packet_id: packet_id.clone(),
                    start_sequence: start_sequence.clone(),
                    end_sequence: end_sequence.clone(),
                })
            }
            _ => None,
        }
    }
}

impl Default for FieldRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filled_router() -> FieldRouter {
        let mut router = FieldRouter::new();
        router.write(CaptureTarget::PacketId, "P1".into());
        router.write(CaptureTarget::StartSequence, 1i64.into());
        router.write(CaptureTarget::EndSequence, 100i64.into());
        router
    }

    #[test]
    fn test_new_router_is_empty() {
        let router = FieldRouter::new();

        assert_eq!(router.active_target(), CaptureTarget::PacketId);
        assert!(!router.is_complete());
        assert!(router.snapshot().is_none());
        assert_eq!(router.missing().len(), 3);
    }

    #[test]
    fn test_completeness_requires_every_slot() {
        let mut router = FieldRouter::new();

        router.write(CaptureTarget::PacketId, "P1".into());
        assert!(!router.is_complete());
        router.write(CaptureTarget::StartSequence, 1i64.into());
        assert!(!router.is_complete());
        router.write(CaptureTarget::EndSequence, 100i64.into());
        assert!(router.is_complete());
    }

    #[test]
    fn test_reset_all_restores_incomplete() {
        let mut router = filled_router();
        router.reset(ResetScope::All);

        assert!(!router.is_complete());
        for target in CaptureTarget::ALL {
            assert!(router.get(target).is_none());
        }
    }

    #[test]
    fn test_reset_single_field() {
        let mut router = filled_router();
        router.reset(CaptureTarget::StartSequence);

        assert!(!router.is_complete());
        assert_eq!(router.missing(), vec![CaptureTarget::StartSequence]);
        assert_eq!(router.get(CaptureTarget::PacketId), Some(&"P1".into()));
    }

    #[test]
    fn test_write_overwrites() {
        let mut router = FieldRouter::new();
        router.write(CaptureTarget::PacketId, "first".into());
        router.write(CaptureTarget::PacketId, "second".into());

        assert_eq!(router.get(CaptureTarget::PacketId), Some(&"second".into()));
    }

    #[test]
    fn test_write_active_uses_selected_target() {
        let mut router = FieldRouter::new();
        router.set_active_target(CaptureTarget::EndSequence);

        let written = router.write_active(42i64.into());

        assert_eq!(written, CaptureTarget::EndSequence);
        assert_eq!(router.get(CaptureTarget::EndSequence), Some(&42i64.into()));
        assert!(router.get(CaptureTarget::PacketId).is_none());
    }

    #[test]
    fn test_snapshot_serializes_backend_shape() {
        let packet = filled_router().snapshot().unwrap();

        assert_eq!(
            serde_json::to_value(&packet).unwrap(),
            json!({"packet_id": "P1", "start_sequence": 1, "end_sequence": 100})
        );
    }

    #[test]
    fn test_captured_value_rejects_null() {
        assert!(CapturedValue::from_json(Value::Null).is_none());
        assert_eq!(
            CapturedValue::from_json(json!(7)).map(|v| v.to_string()),
            Some("7".to_string())
        );
    }

    #[test]
    fn test_target_cycling() {
        assert_eq!(CaptureTarget::PacketId.next(), CaptureTarget::StartSequence);
        assert_eq!(CaptureTarget::StartSequence.next(), CaptureTarget::EndSequence);
        assert_eq!(CaptureTarget::EndSequence.next(), CaptureTarget::PacketId);
    }
}
