//! Inbound message envelope handed to handlers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::domain::Topic;
use crate::error::HandlerError;

/// A decoded inbound frame.
///
/// The router only guarantees the payload is well-formed JSON. Its shape is
/// for the consuming state machine to check, via [`InboundMessage::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the frame arrived on.
    pub topic: Topic,
    /// Parsed JSON body.
    pub payload: serde_json::Value,
    /// Local arrival time.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(topic: Topic, payload: serde_json::Value) -> Self {
        Self {
            topic,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Decodes the payload into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the payload does not have the expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        T::deserialize(&self.payload).map_err(HandlerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;

    #[test]
    fn decode_reports_shape_errors() {
        let msg = InboundMessage::new(Topic::from("/topic/chat/1"), serde_json::json!([1, 2]));
        let result = msg.decode::<ChatMessage>();
        tokio_test::assert_err!(result);
    }

    #[test]
    fn decode_typed_payload() {
        let msg = InboundMessage::new(
            Topic::from("/topic/chat/1"),
            serde_json::json!({"sender": "amy", "content": "hello"}),
        );
        let decoded = msg.decode::<ChatMessage>().map(|m| m.sender);
        assert_eq!(decoded, Ok("amy".to_string()));
    }
}
