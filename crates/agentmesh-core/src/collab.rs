use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Topology governing a collaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollabPattern {
    /// Sequential hand-off; each stage feeds the next.
    Pipeline,
    /// Concurrent fan-out with merged fan-in.
    Parallel,
    /// Star topology; a leader aggregates subordinate reports.
    Hierarchical,
    /// Full point-to-point; success requires every participant's ack.
    Mesh,
    /// Proposal plus vote round; success requires unanimity.
    Consensus,
}

impl std::fmt::Display for CollabPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollabPattern::Pipeline => write!(f, "pipeline"),
            CollabPattern::Parallel => write!(f, "parallel"),
            CollabPattern::Hierarchical => write!(f, "hierarchical"),
            CollabPattern::Mesh => write!(f, "mesh"),
            CollabPattern::Consensus => write!(f, "consensus"),
        }
    }
}

/// Messaging protocol used inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollabProtocol {
    /// Point-to-point addressed messages.
    Direct,
    /// Every message fans out to all other participants.
    Broadcast,
    /// Topic-based publish/subscribe.
    PubSub,
    /// Request/response pairs with timeouts.
    ReqResp,
}

/// Lifecycle status of a collaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created but not yet running.
    Created,
    /// Pattern execution in flight.
    Active,
    /// All stages/participants reported.
    Completed,
    /// Critical failure or deadline exceeded.
    Aborted,
}

/// How participant work is sequenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One participant at a time.
    Sequential,
    /// All participants at once.
    Parallel,
}

/// How participants talk to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    /// Everyone hears everything.
    Broadcast,
    /// Messages flow through a coordinator.
    Hierarchical,
}

/// How group decisions are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// Unanimity required.
    Consensus,
    /// The coordinator decides.
    CoordinatorLed,
}

/// How resource conflicts are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Put it to a vote.
    Voting,
    /// A mediator allocates.
    Mediator,
}

/// Coordination strategy derived from the participant set and task.
/// See [`crate::collab`] consumers for the derivation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Work sequencing.
    pub execution: ExecutionMode,
    /// Messaging shape.
    pub communication: CommunicationStyle,
    /// Group decision style.
    pub decision_making: DecisionMode,
    /// Conflict settlement style.
    pub conflict_resolution: ResolutionMode,
}

/// A multi-agent execution context bound to one coordination pattern.
///
/// The participant set is fixed at creation; there is deliberately no way to
/// mutate it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    /// Unique identifier.
    pub id: Uuid,
    /// The task this session executes.
    pub task_id: Uuid,
    participants: Vec<Uuid>,
    /// Coordination topology.
    pub pattern: CollabPattern,
    /// Messaging protocol.
    pub protocol: CollabProtocol,
    /// Derived coordination strategy.
    pub strategy: Strategy,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Context shared across participants; retained after archiving.
    #[serde(default)]
    pub shared_context: HashMap<String, serde_json::Value>,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// When the session ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Collaboration {
    /// Create a session over a fixed participant set.
    pub fn new(
        task_id: Uuid,
        participants: Vec<Uuid>,
        pattern: CollabPattern,
        protocol: CollabProtocol,
        strategy: Strategy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            participants,
            pattern,
            protocol,
            strategy,
            status: SessionStatus::Created,
            shared_context: HashMap::new(),
            created_at: now,
            ended_at: None,
        }
    }

    /// The immutable participant set.
    pub fn participants(&self) -> &[Uuid] {
        &self.participants
    }

    /// Whether `agent_id` is one of the participants.
    pub fn is_participant(&self, agent_id: Uuid) -> bool {
        self.participants.contains(&agent_id)
    }
}
