use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use agentmesh_collab::conflict::{self, ConflictRequest, Resolution};
use agentmesh_collab::decision::{DecisionMethod, DecisionOutcome};
use agentmesh_collab::manager::{SessionManager, WorkspaceAction, WorkspaceReply};
use agentmesh_collab::patterns::PatternReport;
use agentmesh_collab::strategy::derive_strategy;
use agentmesh_core::{
    Agent, AgentConfig, AgentStatus, CancelHandle, Clock, CollabPattern, CollabProtocol,
    Collaboration, Event, EventSink, ExecContext, ExecutionMode, Executor, MeshError, MeshResult,
    MessageKind, NullSink, SessionStatus, SystemClock, Task, TaskPriority, TaskSpec, TaskStatus,
};
use agentmesh_registry::AgentRegistry;
use agentmesh_tasks::TaskStore;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::status::SystemStatus;

/// The coordination engine: submission, dispatch, and the public operation
/// surface.
///
/// Owns the agent registry, the task store, and the session manager, and
/// delegates actual work to the external [`Executor`]. Execution runs on
/// spawned tasks; the pending queue drains whenever a task reaches a
/// terminal state, never by polling. Constructors hand out an `Arc` because
/// the engine spawns work that must outlive the calling stack frame.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    store: Arc<RwLock<TaskStore>>,
    sessions: Arc<SessionManager>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    config: CoordinatorConfig,
    running: RwLock<HashMap<Uuid, CancelHandle>>,
    weak: Weak<Coordinator>,
}

enum CollabDone {
    Report(MeshResult<PatternReport>),
    Timeout,
    Cancelled,
}

impl Coordinator {
    /// Create a coordinator with the system clock and no telemetry sink.
    pub fn new(executor: Arc<dyn Executor>) -> Arc<Self> {
        Self::with_instrumentation(executor, Arc::new(SystemClock), Arc::new(NullSink))
    }

    /// Create a coordinator with an injected clock and event sink.
    pub fn with_instrumentation(
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Self::with_config(executor, CoordinatorConfig::default(), clock, events)
    }

    /// Create a fully configured coordinator.
    pub fn with_config(
        executor: Arc<dyn Executor>,
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            registry: Arc::new(AgentRegistry::new(Arc::clone(&clock), Arc::clone(&events))),
            store: Arc::new(RwLock::new(TaskStore::new(Arc::clone(&clock)))),
            sessions: Arc::new(
                SessionManager::new(Arc::clone(&clock), Arc::clone(&events))
                    .with_response_timeout_secs(config.default_response_timeout_secs),
            ),
            executor,
            clock,
            events,
            config,
            running: RwLock::new(HashMap::new()),
            weak: weak.clone(),
        })
    }

    // --- Agent operations ---

    /// Register a new agent. Its arrival may unblock queued tasks, so the
    /// queue is re-evaluated.
    pub async fn register_agent(&self, cfg: AgentConfig) -> MeshResult<Uuid> {
        let id = self.registry.register(cfg).await?;
        self.process_queue().await;
        Ok(id)
    }

    /// Remove an agent; its active task (if any) fails with "agent removed".
    pub async fn unregister_agent(&self, id: Uuid) -> MeshResult<()> {
        let orphan = self.registry.unregister(id).await?;
        if let Some(task_id) = orphan {
            // Fail the task before signalling, so the execution loop's
            // cancellation path finds it already settled.
            if self
                .store
                .write()
                .await
                .fail(task_id, "agent removed")
                .is_ok()
            {
                self.events.emit(&Event::TaskFailed {
                    task_id,
                    reason: "agent removed".into(),
                });
            }
            if let Some(handle) = self.running.write().await.remove(&task_id) {
                handle.cancel();
            }
        }
        Ok(())
    }

    /// Explicitly recover an errored agent, then re-evaluate the queue.
    pub async fn recover_agent(&self, id: Uuid) -> MeshResult<()> {
        self.registry.recover(id).await?;
        self.process_queue().await;
        Ok(())
    }

    /// Snapshot one agent.
    pub async fn get_agent(&self, id: Uuid) -> MeshResult<Agent> {
        self.registry.get(id).await
    }

    /// Snapshot all agents in registration order.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.list().await
    }

    // --- Task operations ---

    /// Submit a task. Returns its id plus `Scheduled` when it was dispatched
    /// immediately, `Queued` otherwise. An unplaceable task is not an error;
    /// it waits in the queue.
    pub async fn submit_task(&self, spec: TaskSpec) -> MeshResult<(Uuid, TaskStatus)> {
        let task_id = {
            let mut store = self.store.write().await;
            if store.queued_count() >= self.config.max_queued_tasks {
                return Err(MeshError::Validation(format!(
                    "pending queue is full ({} tasks)",
                    self.config.max_queued_tasks
                )));
            }
            store.insert(spec)?
        };
        self.events.emit(&Event::TaskSubmitted { task_id });

        let dispatched = self.try_dispatch(task_id).await;
        let status = if dispatched {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Queued
        };
        Ok((task_id, status))
    }

    /// Snapshot one task, active or historical.
    pub async fn get_task(&self, id: Uuid) -> MeshResult<Task> {
        self.store.read().await.get_cloned(id)
    }

    /// Cancel a task. A queued task is withdrawn immediately; a dispatched
    /// one is signalled cooperatively and becomes Cancelled once its
    /// execution acknowledges.
    pub async fn cancel_task(&self, task_id: Uuid) -> MeshResult<()> {
        let was_queued = {
            let mut store = self.store.write().await;
            if store.is_queued(task_id) {
                store.mark_cancelled(task_id)?;
                true
            } else {
                false
            }
        };
        if was_queued {
            self.events.emit(&Event::TaskCancelled { task_id });
            return Ok(());
        }

        if let Some(handle) = self.running.read().await.get(&task_id) {
            handle.cancel();
            return Ok(());
        }

        let task = self.store.read().await.get_cloned(task_id)?;
        Err(MeshError::Conflict(format!(
            "task {task_id} is {} and cannot be cancelled",
            task.status.name()
        )))
    }

    // --- Dispatch ---

    /// Attempt to place a queued task. Returns whether it was dispatched.
    async fn try_dispatch(&self, task_id: Uuid) -> bool {
        let task = {
            let store = self.store.read().await;
            match store.get_cloned(task_id) {
                Ok(t) if t.status == TaskStatus::Queued => {
                    match store.dependencies_met(task_id) {
                        Ok(true) => t,
                        _ => return false,
                    }
                }
                _ => return false,
            }
        };

        let candidates = self.registry.find_suitable(&task).await;
        if candidates.is_empty() {
            debug!(task_id = %task_id, "no suitable agent, task remains queued");
            self.events.emit(&Event::TaskQueued { task_id });
            return false;
        }

        let collaborative = task.requirements.len() > self.config.collab_requirement_threshold
            || task.priority >= TaskPriority::Critical;
        if collaborative {
            self.dispatch_collaborative(&task, &candidates).await
        } else {
            self.dispatch_single(&task, &candidates).await
        }
    }

    async fn dispatch_single(&self, task: &Task, candidates: &[(Uuid, f64)]) -> bool {
        let task_id = task.id;
        for (agent_id, _score) in candidates {
            // CAS on the agent status; a racing dispatcher simply loses here.
            if self.registry.try_assign(task_id, *agent_id).await.is_err() {
                continue;
            }
            if let Err(e) = self.store.write().await.mark_scheduled(task_id) {
                // The task side was taken by another dispatcher.
                debug!(task_id = %task_id, error = %e, "lost the task-side race");
                let _ = self.registry.release(*agent_id).await;
                return false;
            }
            self.events.emit(&Event::TaskScheduled {
                task_id,
                agent_ids: vec![*agent_id],
            });
            info!(task_id = %task_id, agent_id = %agent_id, "task assigned");

            let (ctx, handle) = ExecContext::new();
            let ctx = match task.deadline {
                Some(d) => ctx.with_deadline(d),
                None => ctx,
            };
            self.running.write().await.insert(task_id, handle);

            let weak = self.weak.clone();
            let agent_id = *agent_id;
            tokio::spawn(async move {
                if let Some(this) = weak.upgrade() {
                    this.run_single(task_id, agent_id, ctx).await;
                }
            });
            return true;
        }
        self.events.emit(&Event::TaskQueued { task_id });
        false
    }

    async fn dispatch_collaborative(&self, task: &Task, candidates: &[(Uuid, f64)]) -> bool {
        let task_id = task.id;
        let mut claimed: Vec<Uuid> = Vec::new();
        for (agent_id, _score) in candidates {
            if claimed.len() >= self.config.collab_team_size {
                break;
            }
            if self
                .registry
                .begin_coordination(task_id, *agent_id)
                .await
                .is_ok()
            {
                claimed.push(*agent_id);
            }
        }
        if claimed.is_empty() {
            self.events.emit(&Event::TaskQueued { task_id });
            return false;
        }

        if let Err(e) = self.store.write().await.mark_scheduled(task_id) {
            debug!(task_id = %task_id, error = %e, "lost the task-side race");
            for id in &claimed {
                let _ = self.registry.release(*id).await;
            }
            return false;
        }

        let mut agents = Vec::new();
        for id in &claimed {
            if let Ok(agent) = self.registry.get(*id).await {
                agents.push(agent);
            }
        }

        let strategy = derive_strategy(&agents, task);
        let pattern = if strategy.execution == ExecutionMode::Parallel {
            CollabPattern::Parallel
        } else {
            CollabPattern::Pipeline
        };
        let protocol = if agents.len() <= 3 {
            CollabProtocol::Broadcast
        } else {
            CollabProtocol::Direct
        };

        let session_id = match self.sessions.create(task, &agents, pattern, protocol).await {
            Ok(id) => id,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "session creation failed");
                for id in &claimed {
                    let _ = self.registry.release(*id).await;
                }
                let _ = self.store.write().await.fail(task_id, e.to_string());
                self.events.emit(&Event::TaskFailed {
                    task_id,
                    reason: e.to_string(),
                });
                return false;
            }
        };

        self.events.emit(&Event::TaskScheduled {
            task_id,
            agent_ids: claimed.clone(),
        });
        info!(task_id = %task_id, session_id = %session_id, team = claimed.len(), "task dispatched to collaboration");

        let (ctx, handle) = ExecContext::new();
        let ctx = match task.deadline {
            Some(d) => ctx.with_deadline(d),
            None => ctx,
        };
        self.running.write().await.insert(task_id, handle);

        let weak = self.weak.clone();
        tokio::spawn(async move {
            if let Some(this) = weak.upgrade() {
                this.run_collaboration(task_id, session_id, agents, ctx).await;
            }
        });
        true
    }

    // --- Execution ---

    async fn run_single(&self, task_id: Uuid, agent_id: Uuid, mut ctx: ExecContext) {
        if let Err(e) = self.store.write().await.mark_running(task_id) {
            debug!(task_id = %task_id, error = %e, "task vanished before execution");
            let _ = self.registry.release(agent_id).await;
            self.running.write().await.remove(&task_id);
            return;
        }
        let (task, agent) = match (
            self.store.read().await.get_cloned(task_id),
            self.registry.get(agent_id).await,
        ) {
            (Ok(t), Ok(a)) => (t, a),
            _ => {
                self.running.write().await.remove(&task_id);
                return;
            }
        };

        let started = self.clock.now();
        let budget = Duration::from_secs_f64(task.estimated_secs.max(0.001));
        let exec_ctx = ctx.clone();

        let outcome = tokio::select! {
            _ = ctx.cancelled() => None,
            res = tokio::time::timeout(budget, self.executor.execute(exec_ctx, &task, &agent)) => Some(res),
        };
        self.running.write().await.remove(&task_id);

        match outcome {
            None => {
                info!(task_id = %task_id, "task cancelled during execution");
                let _ = self.registry.release(agent_id).await;
                if self.store.write().await.mark_cancelled(task_id).is_ok() {
                    self.events.emit(&Event::TaskCancelled { task_id });
                }
            }
            Some(Ok(Ok(output))) => {
                let elapsed = (self.clock.now() - started).num_milliseconds() as f64 / 1000.0;
                let _ = self
                    .registry
                    .record_success(agent_id, elapsed, task.estimated_secs)
                    .await;
                let _ = self.registry.release(agent_id).await;
                if self.store.write().await.complete(task_id, output).is_ok() {
                    self.events.emit(&Event::TaskCompleted { task_id });
                }
                info!(task_id = %task_id, elapsed_secs = elapsed, "task completed");
                self.process_queue().await;
            }
            Some(Ok(Err(e))) => {
                self.fail_execution(task_id, agent_id, e.to_string()).await;
            }
            Some(Err(_)) => {
                let reason = format!(
                    "execution exceeded its {:.1}s budget",
                    task.estimated_secs
                );
                self.fail_execution(task_id, agent_id, reason).await;
            }
        }
    }

    /// Executor failure path: the agent goes into the sticky error state and
    /// the task fails. No retry; that policy belongs to the executor.
    async fn fail_execution(&self, task_id: Uuid, agent_id: Uuid, reason: String) {
        error!(task_id = %task_id, agent_id = %agent_id, reason = %reason, "task failed");
        let _ = self.registry.mark_error(agent_id).await;
        if self.store.write().await.fail(task_id, reason.clone()).is_ok() {
            self.events.emit(&Event::TaskFailed { task_id, reason });
        }
        self.process_queue().await;
    }

    async fn run_collaboration(
        &self,
        task_id: Uuid,
        session_id: Uuid,
        agents: Vec<Agent>,
        mut ctx: ExecContext,
    ) {
        if let Err(e) = self.store.write().await.mark_running(task_id) {
            debug!(task_id = %task_id, error = %e, "task vanished before collaboration");
            for agent in &agents {
                let _ = self.registry.release(agent.id).await;
            }
            let _ = self.sessions.end(session_id, SessionStatus::Aborted).await;
            self.running.write().await.remove(&task_id);
            return;
        }
        let task = match self.store.read().await.get_cloned(task_id) {
            Ok(t) => t,
            Err(_) => {
                self.running.write().await.remove(&task_id);
                return;
            }
        };

        let started = self.clock.now();
        let exec_ctx = ctx.clone();
        let run = self
            .sessions
            .run(session_id, &task, &agents, self.executor.as_ref(), &exec_ctx);
        tokio::pin!(run);

        let done = match task.deadline {
            Some(deadline) => {
                let remaining = (deadline - self.clock.now()).to_std().unwrap_or_default();
                tokio::select! {
                    _ = ctx.cancelled() => CollabDone::Cancelled,
                    res = tokio::time::timeout(remaining, &mut run) => match res {
                        Ok(report) => CollabDone::Report(report),
                        Err(_) => CollabDone::Timeout,
                    },
                }
            }
            None => tokio::select! {
                _ = ctx.cancelled() => CollabDone::Cancelled,
                report = &mut run => CollabDone::Report(report),
            },
        };
        self.running.write().await.remove(&task_id);

        match done {
            CollabDone::Cancelled => {
                info!(task_id = %task_id, session_id = %session_id, "collaboration cancelled");
                let _ = self.sessions.end(session_id, SessionStatus::Aborted).await;
                for agent in &agents {
                    let _ = self.registry.release(agent.id).await;
                }
                if self.store.write().await.mark_cancelled(task_id).is_ok() {
                    self.events.emit(&Event::TaskCancelled { task_id });
                }
            }
            CollabDone::Timeout => {
                // Deadline expiry is reported, never fatal: the agents are
                // returned to the pool rather than blamed.
                warn!(task_id = %task_id, session_id = %session_id, "collaboration deadline exceeded");
                let _ = self.sessions.end(session_id, SessionStatus::Aborted).await;
                for agent in &agents {
                    let _ = self.registry.release(agent.id).await;
                }
                let reason = "collaboration deadline exceeded".to_string();
                if self.store.write().await.fail(task_id, reason.clone()).is_ok() {
                    self.events.emit(&Event::TaskFailed { task_id, reason });
                }
                self.process_queue().await;
            }
            CollabDone::Report(Err(e)) => {
                error!(task_id = %task_id, session_id = %session_id, error = %e, "collaboration failed to run");
                let _ = self.sessions.end(session_id, SessionStatus::Aborted).await;
                for agent in &agents {
                    let _ = self.registry.release(agent.id).await;
                }
                if self.store.write().await.fail(task_id, e.to_string()).is_ok() {
                    self.events.emit(&Event::TaskFailed {
                        task_id,
                        reason: e.to_string(),
                    });
                }
                self.process_queue().await;
            }
            CollabDone::Report(Ok(report)) => {
                let elapsed = (self.clock.now() - started).num_milliseconds() as f64 / 1000.0;
                let slice_estimate = task.estimated_secs / agents.len().max(1) as f64;
                for agent in &agents {
                    let participated = report.results.iter().find(|r| r.agent_id == agent.id);
                    match participated {
                        Some(result) if !result.success => {
                            let _ = self.registry.mark_error(agent.id).await;
                        }
                        Some(_) => {
                            let _ = self
                                .registry
                                .record_success(agent.id, elapsed, slice_estimate)
                                .await;
                            let _ = self.registry.release(agent.id).await;
                        }
                        // Stages skipped by a fail-fast abort carry no blame.
                        None => {
                            let _ = self.registry.release(agent.id).await;
                        }
                    }
                }

                if report.success {
                    info!(task_id = %task_id, session_id = %session_id, "collaboration completed");
                    if self
                        .store
                        .write()
                        .await
                        .complete(task_id, report.merged_output.clone())
                        .is_ok()
                    {
                        self.events.emit(&Event::TaskCompleted { task_id });
                    }
                } else {
                    let reason = format!(
                        "collaboration finished with {}/{} successful participants",
                        report.success_count, report.total
                    );
                    warn!(task_id = %task_id, session_id = %session_id, %reason, "collaboration unsuccessful");
                    if self.store.write().await.fail(task_id, reason.clone()).is_ok() {
                        self.events.emit(&Event::TaskFailed { task_id, reason });
                    }
                }
                self.process_queue().await;
            }
        }
    }

    /// Re-evaluate the pending queue. Triggered by terminal task events and
    /// agent arrivals/recoveries — never a spin loop.
    async fn process_queue(&self) {
        let ready = self.store.read().await.ready_queued();
        for task_id in ready {
            self.try_dispatch(task_id).await;
        }
    }

    // --- Collaboration surface ---

    /// Create a session explicitly over named participants. Each participant
    /// is claimed (Idle → Coordinating); any claim failing rolls the rest
    /// back.
    pub async fn create_collaboration_session(
        &self,
        task_id: Uuid,
        participant_ids: &[Uuid],
        pattern: CollabPattern,
        protocol: CollabProtocol,
    ) -> MeshResult<Uuid> {
        let task = self.store.read().await.get_cloned(task_id)?;
        let mut claimed: Vec<Uuid> = Vec::new();
        for id in participant_ids {
            if let Err(e) = self.registry.begin_coordination(task_id, *id).await {
                for c in &claimed {
                    let _ = self.registry.release(*c).await;
                }
                return Err(e);
            }
            claimed.push(*id);
        }

        let mut agents = Vec::new();
        for id in &claimed {
            agents.push(self.registry.get(*id).await?);
        }
        match self.sessions.create(&task, &agents, pattern, protocol).await {
            Ok(session_id) => Ok(session_id),
            Err(e) => {
                for c in &claimed {
                    let _ = self.registry.release(*c).await;
                }
                Err(e)
            }
        }
    }

    /// Snapshot a session, live or archived.
    pub async fn get_session(&self, session_id: Uuid) -> MeshResult<Collaboration> {
        self.sessions.get(session_id).await
    }

    /// Deliver a message inside a live session.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        sender: Uuid,
        content: serde_json::Value,
        kind: MessageKind,
        recipient: Option<Uuid>,
    ) -> MeshResult<Vec<Uuid>> {
        self.sessions
            .send_message(session_id, sender, content, kind, recipient)
            .await
    }

    /// Apply a workspace action inside a live session.
    pub async fn manage_workspace(
        &self,
        session_id: Uuid,
        actor: Uuid,
        action: WorkspaceAction,
    ) -> MeshResult<WorkspaceReply> {
        self.sessions.workspace_action(session_id, actor, action).await
    }

    /// Resolve a conflict. Stateless; sessions record the outcome themselves
    /// when they care.
    pub fn resolve_conflict(&self, request: ConflictRequest) -> Resolution {
        conflict::resolve(request)
    }

    /// Put a question to a session's group and record it in the ledger.
    #[allow(clippy::too_many_arguments)]
    pub async fn make_group_decision(
        &self,
        session_id: Uuid,
        proposer: Uuid,
        description: String,
        options: Vec<String>,
        method: DecisionMethod,
        votes: Vec<(Uuid, String)>,
        weights: HashMap<String, f64>,
    ) -> MeshResult<DecisionOutcome> {
        let reply = self
            .sessions
            .workspace_action(
                session_id,
                proposer,
                WorkspaceAction::MakeDecision {
                    description,
                    options,
                    method,
                    votes,
                    weights,
                },
            )
            .await?;
        match reply {
            WorkspaceReply::Decision(outcome) => Ok(outcome),
            _ => Err(MeshError::Validation("unexpected workspace reply".into())),
        }
    }

    /// End a session as Completed, releasing any participants still
    /// coordinating on its task.
    pub async fn end_session(&self, session_id: Uuid) -> MeshResult<Collaboration> {
        let collab = self.sessions.end(session_id, SessionStatus::Completed).await?;
        for pid in collab.participants() {
            if let Ok(agent) = self.registry.get(*pid).await {
                if agent.status == AgentStatus::Coordinating
                    && agent.current_task == Some(collab.task_id)
                {
                    let _ = self.registry.release(*pid).await;
                }
            }
        }
        Ok(collab)
    }

    // --- Introspection ---

    /// Aggregate counts over the whole system.
    pub async fn get_system_status(&self) -> SystemStatus {
        let agents_by_status = self.registry.counts_by_status().await;
        let average_performance = self.registry.average_performance().await;
        let tasks_by_status = self.store.read().await.counts_by_status();

        let completed = tasks_by_status.get("completed").copied().unwrap_or(0);
        let failed = tasks_by_status.get("failed").copied().unwrap_or(0);
        let finished = completed + failed;
        let system_efficiency = if finished == 0 {
            1.0
        } else {
            completed as f64 / finished as f64
        };

        SystemStatus {
            agents_by_status,
            tasks_by_status,
            live_collaborations: self.sessions.live_count().await,
            total_collaborations: self.sessions.total_count().await,
            average_performance,
            system_efficiency,
        }
    }
}
