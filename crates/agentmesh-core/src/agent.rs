use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::{MeshError, MeshResult};

/// Lower bound for an agent's performance score.
pub const MIN_PERFORMANCE: f64 = 0.1;
/// Upper bound for an agent's performance score.
pub const MAX_PERFORMANCE: f64 = 2.0;
/// Score every agent starts with.
pub const DEFAULT_PERFORMANCE: f64 = 1.0;

/// A named skill an agent declares at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name, matched against task requirements.
    pub name: String,
    /// Proficiency in [0, 1].
    pub proficiency: f64,
    /// Relative cost of exercising this capability.
    #[serde(default)]
    pub cost: f64,
    /// Typical wall-clock seconds for one invocation.
    #[serde(default)]
    pub estimated_secs: f64,
}

impl Capability {
    /// Create a capability with the given name and proficiency.
    pub fn new(name: impl Into<String>, proficiency: f64) -> Self {
        Self {
            name: name.into(),
            proficiency,
            cost: 0.0,
            estimated_secs: 0.0,
        }
    }

    /// Set the relative cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Set the typical duration in seconds.
    pub fn with_estimated_secs(mut self, secs: f64) -> Self {
        self.estimated_secs = secs;
        self
    }
}

/// Lifecycle status of a registered agent.
///
/// The status field doubles as the assignment lock: it is only mutated via
/// compare-and-set inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Available for assignment.
    Idle,
    /// Executing a single-agent task.
    Busy,
    /// Participating in a collaboration session.
    Coordinating,
    /// Failed; sticky until an explicit recover call.
    Error,
    /// Administratively out of rotation.
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Coordinating => write!(f, "coordinating"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A registered worker agent.
///
/// Owned exclusively by the agent registry; `current_task` is `Some` exactly
/// when the status is `Busy` or `Coordinating`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Free-form agent type tag (e.g. "research", "codegen").
    pub agent_type: String,
    /// Declared capabilities.
    pub capabilities: Vec<Capability>,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Rolling performance score, clamped between [`MIN_PERFORMANCE`] and
    /// [`MAX_PERFORMANCE`].
    pub performance_score: f64,
    /// Online mean of completion time in seconds (0.0 until first completion).
    pub avg_completion_secs: f64,
    /// Number of completions folded into the mean.
    pub completed_tasks: u64,
    /// Task the agent is currently working on, if any.
    pub current_task: Option<Uuid>,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// UTC timestamp of registration.
    pub registered_at: DateTime<Utc>,
    /// Registration sequence number, used for deterministic tie-breaks.
    pub seq: u64,
}

impl Agent {
    /// The set of capability names this agent declares.
    pub fn capability_names(&self) -> HashSet<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether this agent declares every capability in `requirements`.
    pub fn covers(&self, requirements: &[String]) -> bool {
        let names = self.capability_names();
        requirements.iter().all(|r| names.contains(r.as_str()))
    }

    /// Mean proficiency over the capabilities matching `requirements`.
    /// Returns 0.0 when none match.
    pub fn avg_proficiency(&self, requirements: &[String]) -> f64 {
        let matching: Vec<f64> = self
            .capabilities
            .iter()
            .filter(|c| requirements.iter().any(|r| r == &c.name))
            .map(|c| c.proficiency)
            .collect();
        if matching.is_empty() {
            return 0.0;
        }
        matching.iter().sum::<f64>() / matching.len() as f64
    }

    /// Whether the agent is available for assignment.
    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

/// Registration config for a new agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Human-readable name.
    pub name: String,
    /// Free-form agent type tag.
    pub agent_type: String,
    /// Declared capabilities; must be non-empty.
    pub capabilities: Vec<Capability>,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentConfig {
    /// Create a config with the given name and type.
    pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            capabilities: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Add a capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate the config: name, type, and at least one capability are
    /// required, and every proficiency must lie in [0, 1].
    pub fn validate(&self) -> MeshResult<()> {
        if self.name.trim().is_empty() {
            return Err(MeshError::Validation("agent name is required".into()));
        }
        if self.agent_type.trim().is_empty() {
            return Err(MeshError::Validation("agent type is required".into()));
        }
        if self.capabilities.is_empty() {
            return Err(MeshError::Validation(
                "at least one capability is required".into(),
            ));
        }
        for cap in &self.capabilities {
            if cap.name.trim().is_empty() {
                return Err(MeshError::Validation("capability name is required".into()));
            }
            if !(0.0..=1.0).contains(&cap.proficiency) {
                return Err(MeshError::Validation(format!(
                    "capability '{}' proficiency {} outside [0, 1]",
                    cap.name, cap.proficiency
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn agent_with_caps(caps: Vec<Capability>) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: "worker".into(),
            agent_type: "research".into(),
            capabilities: caps,
            status: AgentStatus::Idle,
            performance_score: DEFAULT_PERFORMANCE,
            avg_completion_secs: 0.0,
            completed_tasks: 0,
            current_task: None,
            metadata: HashMap::new(),
            registered_at: Utc::now(),
            seq: 0,
        }
    }

    #[test]
    fn test_covers_superset() {
        let agent = agent_with_caps(vec![
            Capability::new("search", 0.9),
            Capability::new("summarize", 0.7),
        ]);
        assert!(agent.covers(&["search".to_string()]));
        assert!(agent.covers(&["search".to_string(), "summarize".to_string()]));
        assert!(!agent.covers(&["translate".to_string()]));
    }

    #[test]
    fn test_avg_proficiency_only_matching() {
        let agent = agent_with_caps(vec![
            Capability::new("search", 0.8),
            Capability::new("summarize", 0.4),
        ]);
        let avg = agent.avg_proficiency(&["search".to_string()]);
        assert!((avg - 0.8).abs() < f64::EPSILON);

        let both = agent.avg_proficiency(&["search".to_string(), "summarize".to_string()]);
        assert!((both - 0.6).abs() < f64::EPSILON);

        assert_eq!(agent.avg_proficiency(&["translate".to_string()]), 0.0);
    }

    #[test]
    fn test_config_validation_rejects_missing_fields() {
        assert!(AgentConfig::new("", "research").validate().is_err());
        assert!(AgentConfig::new("worker", "").validate().is_err());
        assert!(AgentConfig::new("worker", "research").validate().is_err());

        let ok = AgentConfig::new("worker", "research")
            .with_capability(Capability::new("search", 0.9));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_proficiency() {
        let cfg = AgentConfig::new("worker", "research")
            .with_capability(Capability::new("search", 1.5));
        assert!(cfg.validate().is_err());

        let cfg = AgentConfig::new("worker", "research")
            .with_capability(Capability::new("search", -0.1));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AgentStatus::Coordinating).unwrap();
        assert_eq!(json, "\"coordinating\"");
        let parsed: AgentStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, AgentStatus::Coordinating);
    }
}
