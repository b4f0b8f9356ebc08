//! Line protocol messages exchanged with connector processes.
//!
//! Every message is a single JSON object carrying a `type` tag and one payload
//! field named after that type:
//!
//! ```json
//! {"type":"STATE","state":{"data":{"cursor":"2024-01-01"}}}
//! ```

use crate::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Record,
    State,
    Trace,
    Control,
    Log,
    Spec,
    Catalog,
    ConnectionStatus,
}

impl MessageType {
    /// All message kinds, in protocol declaration order
    pub const ALL: [MessageType; 8] = [
        MessageType::Record,
        MessageType::State,
        MessageType::Trace,
        MessageType::Control,
        MessageType::Log,
        MessageType::Spec,
        MessageType::Catalog,
        MessageType::ConnectionStatus,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Record => "RECORD",
            MessageType::State => "STATE",
            MessageType::Trace => "TRACE",
            MessageType::Control => "CONTROL",
            MessageType::Log => "LOG",
            MessageType::Spec => "SPEC",
            MessageType::Catalog => "CATALOG",
            MessageType::ConnectionStatus => "CONNECTION_STATUS",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message of the line protocol.
///
/// Payloads are kept as raw JSON values: this layer only routes messages, the
/// sync engine is responsible for interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    /// Message kind (`type` on the wire)
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<Value>,
}

impl ProtocolMessage {
    /// Create a message of the given kind with its payload in the matching field
    pub fn new(kind: MessageType, payload: Value) -> Self {
        let mut message = Self {
            kind,
            record: None,
            state: None,
            trace: None,
            control: None,
            log: None,
            spec: None,
            catalog: None,
            connection_status: None,
        };
        *message.payload_slot() = Some(payload);
        message
    }

    pub fn record(payload: Value) -> Self {
        Self::new(MessageType::Record, payload)
    }

    pub fn state(payload: Value) -> Self {
        Self::new(MessageType::State, payload)
    }

    pub fn trace(payload: Value) -> Self {
        Self::new(MessageType::Trace, payload)
    }

    pub fn control(payload: Value) -> Self {
        Self::new(MessageType::Control, payload)
    }

    pub fn log(payload: Value) -> Self {
        Self::new(MessageType::Log, payload)
    }

    /// Message kind
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Payload stored in the field matching the message kind
    pub fn payload(&self) -> Option<&Value> {
        match self.kind {
            MessageType::Record => self.record.as_ref(),
            MessageType::State => self.state.as_ref(),
            MessageType::Trace => self.trace.as_ref(),
            MessageType::Control => self.control.as_ref(),
            MessageType::Log => self.log.as_ref(),
            MessageType::Spec => self.spec.as_ref(),
            MessageType::Catalog => self.catalog.as_ref(),
            MessageType::ConnectionStatus => self.connection_status.as_ref(),
        }
    }

    fn payload_slot(&mut self) -> &mut Option<Value> {
        match self.kind {
            MessageType::Record => &mut self.record,
            MessageType::State => &mut self.state,
            MessageType::Trace => &mut self.trace,
            MessageType::Control => &mut self.control,
            MessageType::Log => &mut self.log,
            MessageType::Spec => &mut self.spec,
            MessageType::Catalog => &mut self.catalog,
            MessageType::ConnectionStatus => &mut self.connection_status,
        }
    }

    /// Serialize to a single protocol line (without the trailing newline)
    pub fn to_json_line(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::Serialize)
    }

    /// Parse one protocol line
    pub fn from_json_line(line: &str) -> ProtocolResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| ProtocolError::InvalidMessage {
            reason: e.to_string(),
            line: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_message_wire_format() {
        let message = ProtocolMessage::state(json!({"data": {"cursor": 5}}));
        let line = message.to_json_line().unwrap();

        assert_eq!(line, r#"{"type":"STATE","state":{"data":{"cursor":5}}}"#);
    }

    #[test]
    fn test_connection_status_field_name() {
        let message =
            ProtocolMessage::new(MessageType::ConnectionStatus, json!({"status": "SUCCEEDED"}));
        let line = message.to_json_line().unwrap();

        assert!(line.contains(r#""type":"CONNECTION_STATUS""#));
        assert!(line.contains(r#""connectionStatus":{"status":"SUCCEEDED"}"#));
    }

    #[test]
    fn test_parse_trace_message() {
        let message = ProtocolMessage::from_json_line(
            r#"{"type":"TRACE","trace":{"type":"ERROR","emitted_at":1.0}}"#,
        )
        .unwrap();

        assert_eq!(message.kind(), MessageType::Trace);
        assert_eq!(message.payload().unwrap()["type"], "ERROR");
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        let err = ProtocolMessage::from_json_line(r#"{"type":"BOGUS"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage { .. }));
    }

    #[test]
    fn test_parse_ignores_surrounding_whitespace() {
        let message = ProtocolMessage::from_json_line("  {\"type\":\"CONTROL\",\"control\":{}}\r\n")
            .unwrap();
        assert_eq!(message.kind(), MessageType::Control);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::ConnectionStatus.to_string(), "CONNECTION_STATUS");
        assert_eq!(MessageType::ALL.len(), 8);
    }
}
