//! Inbound payload decoding shared by both transports.

use serde::Deserialize;
use suite_relay_core::Message;

/// Payload decode error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
    #[error("Message frame is not UTF-8")]
    NotUtf8,
}

/// Batch entries may be message objects or JSON-encoded message strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchItem {
    Message(Message),
    Encoded(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Single(Message),
    Batch(Vec<BatchItem>),
}

/// Decode a single message frame.
///
/// # Errors
/// Returns error if the frame is not a message object.
pub fn decode_message(frame: &str) -> Result<Message, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

/// Decode a request body holding one message or a batch of them.
///
/// # Errors
/// Returns error if the body or any batch entry is malformed.
pub fn decode_body(body: &[u8]) -> Result<Vec<Message>, ProtocolError> {
    match serde_json::from_slice(body)? {
        Inbound::Single(message) => Ok(vec![message]),
        Inbound::Batch(items) => items
            .into_iter()
            .map(|item| match item {
                BatchItem::Message(message) => Ok(message),
                BatchItem::Encoded(text) => decode_message(&text),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suite_relay_core::MessageId;

    #[test]
    fn test_single_body() {
        let messages =
            decode_body(br#"{"id":1,"sessionId":"S1","name":"runStart"}"#).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name, "runStart");
    }

    #[test]
    fn test_mixed_batch_keeps_order() {
        let body = br#"[
            {"id":1,"sessionId":"S1","name":"testStart","data":[{"name":"t1"}]},
            "{\"id\":2,\"sessionId\":\"S1\",\"name\":\"testEnd\"}"
        ]"#;
        let messages = decode_body(body).unwrap();
        assert_eq!(messages[0].id, MessageId::from(1));
        assert_eq!(messages[1].name, "testEnd");
    }

    #[test]
    fn test_malformed_body() {
        assert!(decode_body(b"{not json").is_err());
        assert!(decode_body(br#"{"id":1,"name":"runEnd"}"#).is_err());
        assert!(decode_body(br#"["not a message"]"#).is_err());
    }
}
