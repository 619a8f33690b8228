use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use agentmesh_core::{Clock, MeshError, MeshResult, Task, TaskSpec, TaskStatus};
use tracing::debug;
use uuid::Uuid;

/// Owns task records, the pending queue, and the dependency graph.
///
/// The store is a plain synchronous structure; the coordinator wraps it in a
/// `tokio::sync::RwLock` and owns all concurrency around it. Dependencies
/// must reference already-submitted tasks, which makes dependency cycles
/// impossible by construction.
pub struct TaskStore {
    active: HashMap<Uuid, Task>,
    history: HashMap<Uuid, Task>,
    queue: Vec<Uuid>,
    completed: HashSet<Uuid>,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            active: HashMap::new(),
            history: HashMap::new(),
            queue: Vec::new(),
            completed: HashSet::new(),
            clock,
        }
    }

    /// Validate and insert a new task. It starts Queued and joins the
    /// pending queue.
    pub fn insert(&mut self, spec: TaskSpec) -> MeshResult<Uuid> {
        spec.validate()?;
        for dep in &spec.dependencies {
            if !self.active.contains_key(dep) && !self.history.contains_key(dep) {
                return Err(MeshError::Validation(format!(
                    "dependency {dep} references an unknown task"
                )));
            }
        }
        let task = Task::from_spec(spec, self.clock.now());
        let id = task.id;
        self.active.insert(id, task);
        self.queue.push(id);
        Ok(id)
    }

    /// Look up a task in either index.
    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.active.get(&id).or_else(|| self.history.get(&id))
    }

    /// Clone a task out of either index.
    pub fn get_cloned(&self, id: Uuid) -> MeshResult<Task> {
        self.get(id)
            .cloned()
            .ok_or_else(|| MeshError::NotFound(format!("task {id}")))
    }

    /// Queued tasks whose dependencies are all completed, in priority order
    /// (highest first), then submission order.
    pub fn ready_queued(&self) -> Vec<Uuid> {
        let mut ready: Vec<&Task> = self
            .queue
            .iter()
            .filter_map(|id| self.active.get(id))
            .filter(|t| t.is_ready(&self.completed))
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        ready.into_iter().map(|t| t.id).collect()
    }

    /// Commit a queued task to execution. Fails `Conflict` unless the task is
    /// Queued with every dependency Completed — the gating invariant lives
    /// here, not in the caller.
    pub fn mark_scheduled(&mut self, id: Uuid) -> MeshResult<()> {
        let completed = &self.completed;
        let task = self
            .active
            .get(&id)
            .ok_or_else(|| MeshError::NotFound(format!("task {id}")))?;
        if task.status != TaskStatus::Queued {
            return Err(MeshError::Conflict(format!(
                "task {id} is {}, not queued",
                task.status.name()
            )));
        }
        if !task.is_ready(completed) {
            return Err(MeshError::Conflict(format!(
                "task {id} has incomplete dependencies"
            )));
        }
        if let Some(task) = self.active.get_mut(&id) {
            task.status = TaskStatus::Scheduled;
        }
        self.queue.retain(|qid| *qid != id);
        debug!(task_id = %id, "task scheduled");
        Ok(())
    }

    /// Scheduled → Running.
    pub fn mark_running(&mut self, id: Uuid) -> MeshResult<()> {
        let now = self.clock.now();
        let task = self
            .active
            .get_mut(&id)
            .ok_or_else(|| MeshError::NotFound(format!("task {id}")))?;
        if task.status != TaskStatus::Scheduled {
            return Err(MeshError::Conflict(format!(
                "task {id} is {}, not scheduled",
                task.status.name()
            )));
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        Ok(())
    }

    /// Finish a task successfully and move it to history.
    pub fn complete(&mut self, id: Uuid, output: serde_json::Value) -> MeshResult<()> {
        let now = self.clock.now();
        let mut task = self
            .active
            .remove(&id)
            .ok_or_else(|| MeshError::NotFound(format!("active task {id}")))?;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.output = Some(output);
        self.completed.insert(id);
        self.history.insert(id, task);
        Ok(())
    }

    /// Finish a task unsuccessfully and move it to history. Valid from any
    /// non-terminal status (a queued task dies when its agent is removed).
    pub fn fail(&mut self, id: Uuid, reason: impl Into<String>) -> MeshResult<()> {
        let now = self.clock.now();
        let mut task = self
            .active
            .remove(&id)
            .ok_or_else(|| MeshError::NotFound(format!("active task {id}")))?;
        task.status = TaskStatus::Failed {
            reason: reason.into(),
        };
        task.completed_at = Some(now);
        self.queue.retain(|qid| *qid != id);
        self.history.insert(id, task);
        Ok(())
    }

    /// Withdraw a task and move it to history.
    pub fn mark_cancelled(&mut self, id: Uuid) -> MeshResult<()> {
        let now = self.clock.now();
        let mut task = self
            .active
            .remove(&id)
            .ok_or_else(|| MeshError::NotFound(format!("active task {id}")))?;
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(now);
        self.queue.retain(|qid| *qid != id);
        self.history.insert(id, task);
        Ok(())
    }

    /// Whether the task is still in the pending queue.
    pub fn is_queued(&self, id: Uuid) -> bool {
        self.queue.contains(&id)
    }

    /// Number of tasks waiting in the pending queue.
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Whether every dependency of the task has completed.
    pub fn dependencies_met(&self, id: Uuid) -> MeshResult<bool> {
        let task = self
            .get(id)
            .ok_or_else(|| MeshError::NotFound(format!("task {id}")))?;
        Ok(task.dependencies.iter().all(|d| self.completed.contains(d)))
    }

    /// Task counts keyed by status name, across both indexes. Deterministic
    /// iteration order.
    pub fn counts_by_status(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in self.active.values().chain(self.history.values()) {
            *counts.entry(task.status.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of non-terminal tasks.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of terminal tasks.
    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    /// Completed-task count (the dependency-satisfaction set).
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }
}
