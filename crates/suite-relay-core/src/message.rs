//! Inbound wire message shared by every transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Acknowledgement token chosen by the remote client.
///
/// Only used to correlate acks, never for ordering. Any JSON number is
/// accepted and echoed back in the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(Number),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One event instance from one remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub session_id: String,
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        session_id: impl Into<String>,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            name: name.into(),
            data,
        }
    }

    /// Event arguments carried by this message.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        event_args(&self.data)
    }

    /// Whether the payload carries a non-null `error`.
    ///
    /// Checks the data object itself, or the first argument when the
    /// data is an argument list.
    #[must_use]
    pub fn has_error_payload(&self) -> bool {
        let subject = match &self.data {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        subject
            .and_then(|v| v.get("error"))
            .is_some_and(|e| !e.is_null())
    }
}

/// Normalize a message payload into an argument list.
///
/// An array is already the list, `null` means no arguments, and anything
/// else is a single argument.
#[must_use]
pub fn event_args(data: &Value) -> Vec<Value> {
    match data {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Ack frame echoed back over a socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub id: MessageId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wire_message() {
        let msg: Message = serde_json::from_value(json!({
            "id": 7,
            "sessionId": "S1",
            "name": "testEnd",
            "data": [{ "name": "t1" }]
        }))
        .unwrap();
        assert_eq!(msg.id, MessageId::from(7));
        assert_eq!(msg.session_id, "S1");
        assert_eq!(msg.args().len(), 1);
    }

    #[test]
    fn test_missing_data_is_null() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"a-1","sessionId":"S1","name":"runEnd"}"#).unwrap();
        assert_eq!(msg.id, MessageId::Text("a-1".into()));
        assert!(msg.data.is_null());
        assert!(msg.args().is_empty());
    }

    #[test]
    fn test_error_payload_detection() {
        let bare = Message::new(1, "S1", "testEnd", json!({ "error": { "message": "boom" } }));
        assert!(bare.has_error_payload());

        let listed = Message::new(2, "S1", "testEnd", json!([{ "error": { "message": "x" } }]));
        assert!(listed.has_error_payload());

        let passing = Message::new(3, "S1", "testEnd", json!([{ "error": null }]));
        assert!(!passing.has_error_payload());

        let empty = Message::new(4, "S1", "testEnd", Value::Null);
        assert!(!empty.has_error_payload());
    }

    #[test]
    fn test_any_json_number_is_an_id() {
        for raw in ["-3", "1.5", "18446744073709551615"] {
            let text = format!(r#"{{"id":{raw},"sessionId":"S1","name":"runStart"}}"#);
            let msg: Message = serde_json::from_str(&text).unwrap();
            assert!(matches!(msg.id, MessageId::Number(_)));
            let ack = serde_json::to_string(&Ack { id: msg.id }).unwrap();
            assert_eq!(ack, format!(r#"{{"id":{raw}}}"#));
        }
    }

    #[test]
    fn test_ack_echoes_id() {
        let ack = Ack { id: MessageId::Text("m-9".into()) };
        assert_eq!(serde_json::to_string(&ack).unwrap(), r#"{"id":"m-9"}"#);
    }
}
