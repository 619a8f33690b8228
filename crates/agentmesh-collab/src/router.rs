use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_core::{Clock, MeshError, MeshResult, MessageKind, SessionMessage};
use tracing::debug;
use uuid::Uuid;

/// Per-session message routing with mailbox delivery.
///
/// Each participant has one mailbox; appends happen under the session lock,
/// so messages for a given (sender, recipient) pair arrive in submission
/// order. A broadcast delivers an individually addressed copy to every other
/// participant.
pub struct MessageRouter {
    participants: Vec<Uuid>,
    mailboxes: HashMap<Uuid, Vec<SessionMessage>>,
    next_seq: u64,
    clock: Arc<dyn Clock>,
    response_timeout_secs: f64,
}

impl MessageRouter {
    /// Create a router for a fixed participant set. `response_timeout_secs`
    /// is stamped onto request-kind messages.
    pub fn new(participants: Vec<Uuid>, clock: Arc<dyn Clock>, response_timeout_secs: f64) -> Self {
        let mailboxes = participants.iter().map(|p| (*p, Vec::new())).collect();
        Self {
            participants,
            mailboxes,
            next_seq: 0,
            clock,
            response_timeout_secs,
        }
    }

    /// Deliver a message. Returns the ids it was delivered to.
    ///
    /// `recipient = None` broadcasts to every participant except the sender.
    /// Senders and recipients outside the participant set are rejected.
    pub fn send(
        &mut self,
        sender: Uuid,
        content: serde_json::Value,
        kind: MessageKind,
        recipient: Option<Uuid>,
    ) -> MeshResult<Vec<Uuid>> {
        if !self.participants.contains(&sender) {
            return Err(MeshError::Validation(format!(
                "sender {sender} is not a session participant"
            )));
        }

        let targets: Vec<Uuid> = match recipient {
            Some(to) => {
                if !self.participants.contains(&to) {
                    return Err(MeshError::Validation(format!(
                        "recipient {to} is not a session participant"
                    )));
                }
                vec![to]
            }
            None => self
                .participants
                .iter()
                .copied()
                .filter(|p| *p != sender)
                .collect(),
        };

        let now = self.clock.now();
        for to in &targets {
            let mut msg = SessionMessage::new(sender, content.clone(), kind, now).to(*to);
            if kind == MessageKind::Request {
                msg = msg.expecting_response(self.response_timeout_secs);
            }
            msg.seq = self.next_seq;
            self.next_seq += 1;
            if let Some(mailbox) = self.mailboxes.get_mut(to) {
                mailbox.push(msg);
            }
        }
        debug!(sender = %sender, delivered = targets.len(), ?kind, "message routed");
        Ok(targets)
    }

    /// Read a participant's mailbox without consuming it.
    pub fn inbox(&self, participant: Uuid) -> MeshResult<&[SessionMessage]> {
        self.mailboxes
            .get(&participant)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                MeshError::NotFound(format!("participant {participant} has no mailbox"))
            })
    }

    /// Take everything out of a participant's mailbox.
    pub fn take_inbox(&mut self, participant: Uuid) -> MeshResult<Vec<SessionMessage>> {
        self.mailboxes
            .get_mut(&participant)
            .map(std::mem::take)
            .ok_or_else(|| {
                MeshError::NotFound(format!("participant {participant} has no mailbox"))
            })
    }

    /// Total messages delivered so far.
    pub fn delivered_count(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use agentmesh_core::SystemClock;

    fn router(n: usize) -> (MessageRouter, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        (
            MessageRouter::new(ids.clone(), Arc::new(SystemClock), 30.0),
            ids,
        )
    }

    #[test]
    fn test_direct_delivery() {
        let (mut r, ids) = router(2);
        let delivered = r
            .send(
                ids[0],
                serde_json::json!({"n": 1}),
                MessageKind::Info,
                Some(ids[1]),
            )
            .unwrap();
        assert_eq!(delivered, vec![ids[1]]);
        assert_eq!(r.inbox(ids[1]).unwrap().len(), 1);
        assert!(r.inbox(ids[0]).unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let (mut r, ids) = router(3);
        let delivered = r
            .send(ids[0], serde_json::Value::Null, MessageKind::Info, None)
            .unwrap();
        assert_eq!(delivered.len(), 2);
        assert!(r.inbox(ids[0]).unwrap().is_empty());
        assert_eq!(r.inbox(ids[1]).unwrap().len(), 1);
        assert_eq!(r.inbox(ids[2]).unwrap().len(), 1);
        // Each copy is individually addressed.
        assert_eq!(r.inbox(ids[1]).unwrap()[0].recipient, Some(ids[1]));
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let (mut r, _ids) = router(2);
        let result = r.send(
            Uuid::new_v4(),
            serde_json::Value::Null,
            MessageKind::Info,
            None,
        );
        assert!(matches!(result, Err(MeshError::Validation(_))));
    }

    #[test]
    fn test_unknown_recipient_rejected() {
        let (mut r, ids) = router(2);
        let result = r.send(
            ids[0],
            serde_json::Value::Null,
            MessageKind::Info,
            Some(Uuid::new_v4()),
        );
        assert!(matches!(result, Err(MeshError::Validation(_))));
    }

    #[test]
    fn test_pairwise_order_preserved() {
        let (mut r, ids) = router(2);
        for n in 0..5 {
            r.send(
                ids[0],
                serde_json::json!({"n": n}),
                MessageKind::Info,
                Some(ids[1]),
            )
            .unwrap();
        }
        let inbox = r.inbox(ids[1]).unwrap();
        for (i, msg) in inbox.iter().enumerate() {
            assert_eq!(msg.content["n"], i as u64);
        }
        // Sequence numbers are strictly increasing.
        assert!(inbox.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_request_messages_expect_responses() {
        let (mut r, ids) = router(2);
        r.send(
            ids[0],
            serde_json::json!({"q": "status?"}),
            MessageKind::Request,
            Some(ids[1]),
        )
        .unwrap();
        let msg = &r.inbox(ids[1]).unwrap()[0];
        assert!(msg.requires_response);
        assert_eq!(msg.response_timeout_secs, Some(30.0));
    }

    #[test]
    fn test_take_inbox_drains() {
        let (mut r, ids) = router(2);
        r.send(ids[0], serde_json::Value::Null, MessageKind::Ack, Some(ids[1]))
            .unwrap();
        let taken = r.take_inbox(ids[1]).unwrap();
        assert_eq!(taken.len(), 1);
        assert!(r.inbox(ids[1]).unwrap().is_empty());
    }
}
