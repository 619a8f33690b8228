use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic kind of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Informational, no reply expected.
    Info,
    /// A proposal put to the group.
    Proposal,
    /// A vote on an open proposal.
    Vote,
    /// An acknowledgement (mesh pattern).
    Ack,
    /// A participant's result report.
    Result,
    /// A request that expects a response.
    Request,
}

/// A message exchanged between participants of a collaboration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Unique identifier.
    pub id: Uuid,
    /// Sending participant.
    pub sender: Uuid,
    /// Receiving participant; `None` marks a broadcast source.
    pub recipient: Option<Uuid>,
    /// Message payload.
    pub content: serde_json::Value,
    /// Semantic kind.
    pub kind: MessageKind,
    /// UTC timestamp of submission.
    pub timestamp: DateTime<Utc>,
    /// Whether the sender expects a response.
    #[serde(default)]
    pub requires_response: bool,
    /// Seconds to wait for the response before giving up.
    pub response_timeout_secs: Option<f64>,
    /// Per-session delivery sequence, assigned by the router.
    pub seq: u64,
}

impl SessionMessage {
    /// Create a message; the router fills in `recipient` copies and `seq`.
    pub fn new(
        sender: Uuid,
        content: serde_json::Value,
        kind: MessageKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient: None,
            content,
            kind,
            timestamp: now,
            requires_response: false,
            response_timeout_secs: None,
            seq: 0,
        }
    }

    /// Address the message to a single recipient.
    pub fn to(mut self, recipient: Uuid) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Mark the message as expecting a response within `timeout_secs`.
    pub fn expecting_response(mut self, timeout_secs: f64) -> Self {
        self.requires_response = true;
        self.response_timeout_secs = Some(timeout_secs);
        self
    }

    /// Whether this message is a broadcast (no single recipient).
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_detection() {
        let sender = Uuid::new_v4();
        let msg = SessionMessage::new(
            sender,
            serde_json::json!({"note": "hello"}),
            MessageKind::Info,
            Utc::now(),
        );
        assert!(msg.is_broadcast());

        let direct = msg.to(Uuid::new_v4());
        assert!(!direct.is_broadcast());
    }

    #[test]
    fn test_expecting_response_sets_timeout() {
        let msg = SessionMessage::new(
            Uuid::new_v4(),
            serde_json::Value::Null,
            MessageKind::Request,
            Utc::now(),
        )
        .expecting_response(5.0);
        assert!(msg.requires_response);
        assert_eq!(msg.response_timeout_secs, Some(5.0));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let msg = SessionMessage::new(
            Uuid::new_v4(),
            serde_json::json!({"vote": "approve"}),
            MessageKind::Vote,
            Utc::now(),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: SessionMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, MessageKind::Vote);
        assert_eq!(parsed.content["vote"], "approve");
    }
}
