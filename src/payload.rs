//! Interpretation of decoded code text into field values.
//!
//! Decoded text is first classified into a [`Payload`]: text whose trimmed
//! form opens with `{` and parses as a JSON object is [`Payload::Structured`],
//! anything else (including malformed JSON) is [`Payload::Scalar`].
//!
//! A structured payload yields the member named after the capture target
//! (`packet_id`, `start_sequence`, `end_sequence`). When that member is
//! absent the whole record becomes the value; [`Payload::member`] gives
//! strict extraction.

use crate::router::{CaptureTarget, CapturedValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const OBJECT_OPEN: char = '{';

/// Decoded text after the parse step
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(String),
    Structured(Map<String, Value>),
}

impl Payload {
    /// Classify raw decoded text
    pub fn parse(raw: &str) -> Self {
        if !raw.trim_start().starts_with(OBJECT_OPEN) {
            return Payload::Scalar(raw.to_string());
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(record)) => Payload::Structured(record),
            Ok(other) => {
                // Not produced by text opening with a brace
                warn!("Decoded JSON is not an object, using raw text: {}", other);
                Payload::Scalar(raw.to_string())
            }
            Err(e) => {
                warn!("Non-JSON code data ({}), using raw text: {}", e, raw);
                Payload::Scalar(raw.to_string())
            }
        }
    }

    /// The non-null member for `target`, if the payload is structured and carries it
    pub fn member(&self, target: CaptureTarget) -> Option<&Value> {
        match self {
            Payload::Structured(record) => {
                record.get(target.member()).filter(|value| !value.is_null())
            }
            Payload::Scalar(_) => None,
        }
    }

    /// Field value for `target`
    pub fn into_value(self, target: CaptureTarget) -> CapturedValue {
        if let Some(value) = self.member(target).cloned().and_then(CapturedValue::from_json) {
            return value;
        }

        match self {
            Payload::Scalar(text) => CapturedValue::text(text),
            Payload::Structured(record) => {
                debug!(
                    "Structured payload has no '{}' member, keeping the whole record",
                    target.member()
                );
                CapturedValue::from_json(Value::Object(record))
                    .unwrap_or_else(|| CapturedValue::text(String::new()))
            }
        }
    }
}

/// Turn decoded text into the value for `target`
pub fn interpret(raw: &str, target: CaptureTarget) -> CapturedValue {
    Payload::parse(raw).into_value(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_is_returned_verbatim() {
        for raw in ["ABC123", "  padded  ", "[1,2,3]", "42", "", "} not json"] {
            for target in CaptureTarget::ALL {
                assert_eq!(interpret(raw, target), CapturedValue::text(raw));
            }
        }
    }

    #[test]
    fn test_expected_member_is_extracted() {
        let raw = r#"{"packet_id": "PKT-9", "start_sequence": 42, "end_sequence": 99}"#;

        assert_eq!(interpret(raw, CaptureTarget::PacketId), "PKT-9".into());
        assert_eq!(interpret(raw, CaptureTarget::StartSequence), 42i64.into());
        assert_eq!(interpret(raw, CaptureTarget::EndSequence), 99i64.into());
    }

    #[test]
    fn test_member_is_extracted_after_leading_whitespace() {
        let raw = "  \n{\"start_sequence\": 42}";
        assert_eq!(interpret(raw, CaptureTarget::StartSequence), 42i64.into());
    }

    #[test]
    fn test_missing_member_keeps_whole_record() {
        let raw = r#"{"packet_id": "PKT-9", "batch": 3}"#;
        let value = interpret(raw, CaptureTarget::EndSequence);

        assert_eq!(value.as_json(), &json!({"packet_id": "PKT-9", "batch": 3}));
    }

    #[test]
    fn test_null_member_keeps_whole_record() {
        let raw = r#"{"packet_id": null}"#;
        let value = interpret(raw, CaptureTarget::PacketId);

        assert_eq!(value.as_json(), &json!({"packet_id": null}));
    }

    #[test]
    fn test_malformed_json_falls_back_to_raw_text() {
        let raw = r#"{"packet_id": "PKT-9""#;
        assert_eq!(interpret(raw, CaptureTarget::PacketId), CapturedValue::text(raw));
    }

    #[test]
    fn test_parse_classifies_payloads() {
        assert_eq!(Payload::parse("P1"), Payload::Scalar("P1".to_string()));
        assert!(matches!(Payload::parse("{}"), Payload::Structured(record) if record.is_empty()));
    }

    #[test]
    fn test_member_lookup_is_strict() {
        let payload = Payload::parse(r#"{"end_sequence": 100}"#);

        assert_eq!(payload.member(CaptureTarget::EndSequence), Some(&json!(100)));
        assert_eq!(payload.member(CaptureTarget::PacketId), None);
        assert_eq!(Payload::parse("P1").member(CaptureTarget::PacketId), None);
    }
}
