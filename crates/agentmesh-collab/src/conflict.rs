use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{majority_vote, DecisionOutcome};

/// A conflict brought to the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictRequest {
    /// Several participants want the same resource at once.
    ResourceContention {
        /// The contended resource.
        resource: String,
        /// Requesting participants, in request order.
        requesters: Vec<Uuid>,
        /// Scheduling window to divide, in seconds.
        #[serde(default = "default_window")]
        window_secs: f64,
    },
    /// Participants disagree on a decision.
    DecisionDisagreement {
        /// The cast votes, in submission order.
        votes: Vec<(String, String)>,
    },
}

fn default_window() -> f64 {
    60.0
}

/// One participant's turn in a time-shared allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Who holds the resource during the slot.
    pub participant: Uuid,
    /// Offset from the window start, in seconds.
    pub start_offset_secs: f64,
    /// Slot length in seconds.
    pub duration_secs: f64,
}

/// The resolver's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum Resolution {
    /// Round-robin time sharing over the contended resource.
    TimeShare {
        /// The contended resource.
        resource: String,
        /// Slots in request order.
        slots: Vec<TimeSlot>,
        /// Total window that was divided.
        window_secs: f64,
    },
    /// A majority-vote recommendation for the disagreement.
    Recommendation {
        /// The recommended outcome.
        outcome: DecisionOutcome,
    },
}

/// Resolve a conflict.
///
/// Resource contention gets round-robin time slices in request order;
/// a decision disagreement gets a majority-vote recommendation.
pub fn resolve(request: ConflictRequest) -> Resolution {
    match request {
        ConflictRequest::ResourceContention {
            resource,
            requesters,
            window_secs,
        } => {
            let n = requesters.len().max(1);
            let slice = window_secs / n as f64;
            let slots = requesters
                .into_iter()
                .enumerate()
                .map(|(i, participant)| TimeSlot {
                    participant,
                    start_offset_secs: slice * i as f64,
                    duration_secs: slice,
                })
                .collect();
            Resolution::TimeShare {
                resource,
                slots,
                window_secs,
            }
        }
        ConflictRequest::DecisionDisagreement { votes } => Resolution::Recommendation {
            outcome: majority_vote(&votes),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_divides_window_in_request_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let resolution = resolve(ConflictRequest::ResourceContention {
            resource: "gpu-0".into(),
            requesters: vec![a, b, c],
            window_secs: 90.0,
        });

        let Resolution::TimeShare { resource, slots, window_secs } = resolution else {
            panic!("expected a time share");
        };
        assert_eq!(resource, "gpu-0");
        assert_eq!(window_secs, 90.0);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].participant, a);
        assert_eq!(slots[1].participant, b);
        assert_eq!(slots[2].participant, c);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.duration_secs, 30.0);
            assert_eq!(slot.start_offset_secs, 30.0 * i as f64);
        }
    }

    #[test]
    fn test_disagreement_returns_majority_recommendation() {
        let resolution = resolve(ConflictRequest::DecisionDisagreement {
            votes: vec![
                ("a".into(), "merge".into()),
                ("b".into(), "merge".into()),
                ("c".into(), "split".into()),
            ],
        });

        let Resolution::Recommendation { outcome } = resolution else {
            panic!("expected a recommendation");
        };
        assert_eq!(outcome.decision.as_deref(), Some("merge"));
        assert_eq!(outcome.margin(), Some((2.0, 3.0)));
    }

    #[test]
    fn test_contention_request_deserializes_with_default_window() {
        let json = serde_json::json!({
            "type": "resource_contention",
            "resource": "db",
            "requesters": [Uuid::new_v4()],
        });
        let request: ConflictRequest = serde_json::from_value(json).unwrap();
        let ConflictRequest::ResourceContention { window_secs, .. } = request else {
            panic!("wrong variant");
        };
        assert_eq!(window_secs, 60.0);
    }
}
