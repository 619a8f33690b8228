use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{MeshError, MeshResult};

/// Urgency of a task. The ordering is semantic: `Critical` and above force
/// collaborative execution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Normal priority.
    #[default]
    Medium,
    /// Elevated priority.
    High,
    /// Urgent; always dispatched to a collaboration.
    Critical,
    /// Highest urgency.
    Emergency,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Critical => write!(f, "critical"),
            TaskPriority::Emergency => write!(f, "emergency"),
        }
    }
}

/// Status of a task in the coordination lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or a suitable agent.
    Queued,
    /// An agent or collaboration has been committed to it.
    Scheduled,
    /// Execution is in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed {
        /// Why the task failed.
        reason: String,
    },
    /// Withdrawn before or during execution.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (the task moves to the history index).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed { .. } | TaskStatus::Cancelled
        )
    }

    /// Stable status name, independent of variant payloads.
    pub fn name(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Submission config for a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-form task type tag.
    pub task_type: String,
    /// Human-readable description.
    pub description: String,
    /// Urgency; defaults to `Medium`.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Capability names a handling agent must declare.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Opaque input payload handed to the executor.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Tasks that must complete before this one may be scheduled.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Hard deadline for the whole task, if any.
    pub deadline: Option<DateTime<Utc>>,
    /// Expected wall-clock seconds; also bounds the execution wait.
    #[serde(default = "default_estimate")]
    pub estimated_secs: f64,
    /// When false, a failure of this step inside a pipeline is logged and
    /// skipped instead of aborting the remaining stages.
    #[serde(default = "default_critical")]
    pub critical: bool,
}

fn default_estimate() -> f64 {
    60.0
}

fn default_critical() -> bool {
    true
}

impl TaskSpec {
    /// Create a spec with the given type and description.
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            priority: TaskPriority::default(),
            requirements: Vec::new(),
            input: serde_json::Value::Null,
            dependencies: Vec::new(),
            deadline: None,
            estimated_secs: default_estimate(),
            critical: default_critical(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a required capability name.
    pub fn require(mut self, capability: impl Into<String>) -> Self {
        self.requirements.push(capability.into());
        self
    }

    /// Set the input payload.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Set the hard deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the expected duration in seconds.
    pub fn with_estimated_secs(mut self, secs: f64) -> Self {
        self.estimated_secs = secs;
        self
    }

    /// Mark this step as non-critical inside pipelines.
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Validate the spec: type, description, and a positive estimate are
    /// required.
    pub fn validate(&self) -> MeshResult<()> {
        if self.task_type.trim().is_empty() {
            return Err(MeshError::Validation("task type is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(MeshError::Validation("task description is required".into()));
        }
        if self.estimated_secs <= 0.0 {
            return Err(MeshError::Validation(format!(
                "estimated duration must be positive, got {}",
                self.estimated_secs
            )));
        }
        Ok(())
    }
}

/// A unit of work owned by the task store.
///
/// Tasks are never deleted: once terminal they move from the store's active
/// index into its history index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// Free-form task type tag.
    pub task_type: String,
    /// Human-readable description.
    pub description: String,
    /// Urgency.
    pub priority: TaskPriority,
    /// Capability names a handling agent must declare.
    pub requirements: Vec<String>,
    /// Opaque input payload.
    pub input: serde_json::Value,
    /// Tasks that must complete first.
    pub dependencies: Vec<Uuid>,
    /// Hard deadline, if any.
    pub deadline: Option<DateTime<Utc>>,
    /// Expected wall-clock seconds.
    pub estimated_secs: f64,
    /// Pipeline fail-fast flag.
    pub critical: bool,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// UTC timestamp of submission.
    pub created_at: DateTime<Utc>,
    /// When execution began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Output payload, set on completion.
    pub output: Option<serde_json::Value>,
}

impl Task {
    /// Materialize a task from a validated spec at the given time.
    pub fn from_spec(spec: TaskSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: spec.task_type,
            description: spec.description,
            priority: spec.priority,
            requirements: spec.requirements,
            input: spec.input,
            dependencies: spec.dependencies,
            deadline: spec.deadline,
            estimated_secs: spec.estimated_secs,
            critical: spec.critical,
            status: TaskStatus::Queued,
            created_at: now,
            started_at: None,
            completed_at: None,
            output: None,
        }
    }

    /// Whether every dependency id appears in `completed`.
    pub fn is_ready(&self, completed: &HashSet<Uuid>) -> bool {
        self.status == TaskStatus::Queued
            && self.dependencies.iter().all(|d| completed.contains(d))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::High < TaskPriority::Critical);
        assert!(TaskPriority::Critical < TaskPriority::Emergency);
        assert!(TaskPriority::High >= TaskPriority::High);
    }

    #[test]
    fn test_spec_validation() {
        assert!(TaskSpec::new("", "do it").validate().is_err());
        assert!(TaskSpec::new("research", "").validate().is_err());
        assert!(TaskSpec::new("research", "do it")
            .with_estimated_secs(0.0)
            .validate()
            .is_err());
        assert!(TaskSpec::new("research", "do it").validate().is_ok());
    }

    #[test]
    fn test_from_spec_starts_queued() {
        let now = Utc::now();
        let task = Task::from_spec(TaskSpec::new("research", "find sources"), now);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.created_at, now);
        assert!(task.output.is_none());
        assert!(task.critical);
    }

    #[test]
    fn test_is_ready_tracks_dependencies() {
        let dep = Uuid::new_v4();
        let task = Task::from_spec(
            TaskSpec::new("research", "dependent").with_dependencies(vec![dep]),
            Utc::now(),
        );
        assert!(!task.is_ready(&HashSet::new()));
        let mut done = HashSet::new();
        done.insert(dep);
        assert!(task.is_ready(&done));
    }

    #[test]
    fn test_is_ready_false_when_not_queued() {
        let mut task = Task::from_spec(TaskSpec::new("research", "running"), Utc::now());
        task.status = TaskStatus::Running;
        assert!(!task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed { reason: "x".into() }.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Scheduled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serialization_roundtrip() {
        let status = TaskStatus::Failed {
            reason: "agent removed".into(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("agent removed"));
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
