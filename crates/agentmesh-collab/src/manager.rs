use std::collections::HashMap;
use std::sync::Arc;

use agentmesh_core::{
    Agent, Clock, CollabPattern, CollabProtocol, Collaboration, Event, EventSink, ExecContext,
    Executor, MeshError, MeshResult, MessageKind, SessionMessage, SessionStatus, Task,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::decision::{self, DecisionMethod, DecisionOutcome};
use crate::patterns::{self, PatternReport};
use crate::router::MessageRouter;
use crate::strategy::derive_strategy;
use crate::workspace::{AccessLevel, DecisionRecord, Workspace, WorkspaceView};

/// Live state of one collaboration session: the record itself, the message
/// router, and the shared workspace. Router and workspace exist only while
/// the session is live; archiving releases them.
pub struct SessionState {
    collab: Mutex<Collaboration>,
    router: Mutex<MessageRouter>,
    workspace: Mutex<Workspace>,
    notify: tokio::sync::Notify,
}

impl SessionState {
    /// Snapshot the collaboration record.
    pub fn snapshot(&self) -> Collaboration {
        self.collab.lock().clone()
    }
}

/// A workspace operation requested by a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkspaceAction {
    /// Create a document.
    AddDocument {
        /// Document name.
        name: String,
        /// Initial content.
        content: serde_json::Value,
    },
    /// Replace a document's content, carrying the version that was read.
    UpdateDocument {
        /// Document name.
        name: String,
        /// New content.
        content: serde_json::Value,
        /// The version the writer read.
        version: u64,
    },
    /// Publish a shared-data entry.
    ShareData {
        /// Entry key.
        key: String,
        /// Entry value.
        value: serde_json::Value,
        /// Visibility tag.
        #[serde(default)]
        access: AccessLevel,
    },
    /// Put a question to the group and record the outcome in the ledger.
    MakeDecision {
        /// What is being decided.
        description: String,
        /// The options on the ballot.
        options: Vec<String>,
        /// Decision algorithm.
        method: DecisionMethod,
        /// Cast votes, in submission order.
        votes: Vec<(Uuid, String)>,
        /// Voter weights (weighted vote only), keyed by voter id.
        #[serde(default)]
        weights: HashMap<String, f64>,
    },
    /// Snapshot the whole workspace.
    GetWorkspace,
}

/// Result of a [`WorkspaceAction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum WorkspaceReply {
    /// A document was created or updated.
    DocumentVersion {
        /// Document name.
        name: String,
        /// Its new version.
        version: u64,
    },
    /// A shared entry was published.
    Shared {
        /// The entry key.
        key: String,
    },
    /// A decision was recorded.
    Decision(DecisionOutcome),
    /// The full workspace snapshot.
    Workspace(WorkspaceView),
}

/// Owns live collaboration sessions and the archive of ended ones.
pub struct SessionManager {
    live: RwLock<HashMap<Uuid, Arc<SessionState>>>,
    archive: RwLock<HashMap<Uuid, Collaboration>>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    response_timeout_secs: f64,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new(clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            archive: RwLock::new(HashMap::new()),
            clock,
            events,
            response_timeout_secs: 30.0,
        }
    }

    /// Override the timeout stamped onto request-kind messages.
    pub fn with_response_timeout_secs(mut self, secs: f64) -> Self {
        self.response_timeout_secs = secs;
        self
    }

    /// Create a session over a fixed participant set. The strategy is
    /// derived from the participants and task.
    pub async fn create(
        &self,
        task: &Task,
        participants: &[Agent],
        pattern: CollabPattern,
        protocol: CollabProtocol,
    ) -> MeshResult<Uuid> {
        if participants.is_empty() {
            return Err(MeshError::Validation(
                "a collaboration needs at least one participant".into(),
            ));
        }
        let strategy = derive_strategy(participants, task);
        let ids: Vec<Uuid> = participants.iter().map(|a| a.id).collect();
        let collab = Collaboration::new(
            task.id,
            ids.clone(),
            pattern,
            protocol,
            strategy,
            self.clock.now(),
        );
        let session_id = collab.id;

        let state = Arc::new(SessionState {
            collab: Mutex::new(collab),
            router: Mutex::new(MessageRouter::new(
                ids,
                Arc::clone(&self.clock),
                self.response_timeout_secs,
            )),
            workspace: Mutex::new(Workspace::new()),
            notify: tokio::sync::Notify::new(),
        });
        self.live.write().await.insert(session_id, state);

        info!(session_id = %session_id, task_id = %task.id, %pattern, "collaboration session created");
        self.events.emit(&Event::SessionCreated {
            session_id,
            task_id: task.id,
            pattern,
        });
        Ok(session_id)
    }

    /// Snapshot a session record, live or archived.
    pub async fn get(&self, session_id: Uuid) -> MeshResult<Collaboration> {
        if let Some(state) = self.live.read().await.get(&session_id) {
            return Ok(state.snapshot());
        }
        self.archive
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| MeshError::NotFound(format!("session {session_id}")))
    }

    async fn live_state(&self, session_id: Uuid) -> MeshResult<Arc<SessionState>> {
        if let Some(state) = self.live.read().await.get(&session_id) {
            return Ok(Arc::clone(state));
        }
        if self.archive.read().await.contains_key(&session_id) {
            return Err(MeshError::Conflict(format!(
                "session {session_id} is archived"
            )));
        }
        Err(MeshError::NotFound(format!("session {session_id}")))
    }

    /// Deliver a message inside a live session. Returns the recipients.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        sender: Uuid,
        content: serde_json::Value,
        kind: MessageKind,
        recipient: Option<Uuid>,
    ) -> MeshResult<Vec<Uuid>> {
        let state = self.live_state(session_id).await?;
        let delivered = state.router.lock().send(sender, content, kind, recipient)?;
        state.notify.notify_waiters();
        Ok(delivered)
    }

    /// Wait until `participant` has a message of `kind`, or fail with
    /// `DeadlineExceeded` after `timeout_secs`. Expiry is reported, never
    /// fatal: the session keeps running.
    pub async fn await_message(
        &self,
        session_id: Uuid,
        participant: Uuid,
        kind: MessageKind,
        timeout_secs: f64,
    ) -> MeshResult<SessionMessage> {
        let state = self.live_state(session_id).await?;
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs_f64(timeout_secs.max(0.0));
        loop {
            {
                let router = state.router.lock();
                if let Some(msg) = router
                    .inbox(participant)?
                    .iter()
                    .rev()
                    .find(|m| m.kind == kind)
                {
                    return Ok(msg.clone());
                }
            }
            let notified = state.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(MeshError::DeadlineExceeded(format!(
                    "no {kind:?} message for {participant} within {timeout_secs}s"
                )));
            }
        }
    }

    /// Read a participant's mailbox.
    pub async fn inbox(
        &self,
        session_id: Uuid,
        participant: Uuid,
    ) -> MeshResult<Vec<SessionMessage>> {
        let state = self.live_state(session_id).await?;
        let router = state.router.lock();
        Ok(router.inbox(participant)?.to_vec())
    }

    /// Apply a workspace action as `actor`, who must be a participant.
    pub async fn workspace_action(
        &self,
        session_id: Uuid,
        actor: Uuid,
        action: WorkspaceAction,
    ) -> MeshResult<WorkspaceReply> {
        let state = self.live_state(session_id).await?;
        if !state.collab.lock().is_participant(actor) {
            return Err(MeshError::Validation(format!(
                "agent {actor} is not a session participant"
            )));
        }
        let now = self.clock.now();
        let mut workspace = state.workspace.lock();
        match action {
            WorkspaceAction::AddDocument { name, content } => {
                let version = workspace.add_document(name.clone(), content, actor, now)?;
                Ok(WorkspaceReply::DocumentVersion { name, version })
            }
            WorkspaceAction::UpdateDocument {
                name,
                content,
                version,
            } => {
                let version = workspace.update_document(&name, content, version, actor, now)?;
                Ok(WorkspaceReply::DocumentVersion { name, version })
            }
            WorkspaceAction::ShareData { key, value, access } => {
                workspace.share(key.clone(), value, access, actor, now);
                Ok(WorkspaceReply::Shared { key })
            }
            WorkspaceAction::MakeDecision {
                description,
                options,
                method,
                votes,
                weights,
            } => {
                let labelled: Vec<(String, String)> = votes
                    .iter()
                    .map(|(voter, option)| (voter.to_string(), option.clone()))
                    .collect();
                let outcome = match method {
                    DecisionMethod::MajorityVote => decision::majority_vote(&labelled),
                    DecisionMethod::Consensus => decision::consensus(&labelled),
                    DecisionMethod::WeightedVote => decision::weighted_vote(&labelled, &weights),
                };
                workspace.record_decision(DecisionRecord {
                    id: Uuid::new_v4(),
                    description,
                    options,
                    proposer: actor,
                    votes,
                    outcome: outcome.clone(),
                    decided_at: now,
                });
                Ok(WorkspaceReply::Decision(outcome))
            }
            WorkspaceAction::GetWorkspace => Ok(WorkspaceReply::Workspace(workspace.snapshot())),
        }
    }

    /// Run the session's pattern to completion and archive it.
    ///
    /// The session must still be Created. Completion reflects the pattern
    /// report: a pipeline cut short by a critical failure aborts the
    /// session, every other full round completes it (even when the round
    /// itself did not succeed, e.g. a split consensus).
    pub async fn run(
        &self,
        session_id: Uuid,
        task: &Task,
        participants: &[Agent],
        executor: &dyn Executor,
        ctx: &ExecContext,
    ) -> MeshResult<PatternReport> {
        let state = self.live_state(session_id).await?;
        let pattern = {
            let mut collab = state.collab.lock();
            if collab.status != SessionStatus::Created {
                return Err(MeshError::Conflict(format!(
                    "session {session_id} already started"
                )));
            }
            collab.status = SessionStatus::Active;
            collab.pattern
        };

        let report =
            patterns::run(pattern, task, participants, &state.router, executor, ctx).await;

        {
            let mut collab = state.collab.lock();
            collab
                .shared_context
                .insert("report".into(), serde_json::to_value(&report)?);
        }

        let aborted = pattern == CollabPattern::Pipeline && report.results.len() < report.total;
        let status = if aborted {
            SessionStatus::Aborted
        } else {
            SessionStatus::Completed
        };
        self.end(session_id, status).await?;
        Ok(report)
    }

    /// End a live session: set its terminal status, retain the record (and
    /// shared context) in the archive, release the router and workspace.
    pub async fn end(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> MeshResult<Collaboration> {
        if !matches!(status, SessionStatus::Completed | SessionStatus::Aborted) {
            return Err(MeshError::Validation(format!(
                "cannot end a session with non-terminal status {status:?}"
            )));
        }
        let state = {
            let mut live = self.live.write().await;
            live.remove(&session_id).ok_or_else(|| {
                MeshError::NotFound(format!("live session {session_id}"))
            })?
        };
        let mut collab = state.snapshot();
        collab.status = status;
        collab.ended_at = Some(self.clock.now());
        self.archive.write().await.insert(session_id, collab.clone());

        if status == SessionStatus::Aborted {
            warn!(session_id = %session_id, "collaboration session aborted");
        } else {
            info!(session_id = %session_id, "collaboration session completed");
        }
        self.events.emit(&Event::SessionEnded { session_id, status });
        Ok(collab)
    }

    /// Number of live (not yet archived) sessions.
    pub async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }

    /// Number of sessions ever created.
    pub async fn total_count(&self) -> usize {
        self.live.read().await.len() + self.archive.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use agentmesh_core::agent::DEFAULT_PERFORMANCE;
    use agentmesh_core::{AgentStatus, Capability, NullSink, SystemClock, TaskSpec};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(SystemClock), Arc::new(NullSink))
    }

    fn agent(name: &str) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            name: name.into(),
            agent_type: "worker".into(),
            capabilities: vec![Capability::new("work", 0.8)],
            status: AgentStatus::Coordinating,
            performance_score: DEFAULT_PERFORMANCE,
            avg_completion_secs: 0.0,
            completed_tasks: 0,
            current_task: None,
            metadata: std::collections::HashMap::new(),
            registered_at: Utc::now(),
            seq: 0,
        }
    }

    fn task() -> Task {
        Task::from_spec(TaskSpec::new("work", "session probe"), Utc::now())
    }

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn execute(
            &self,
            _ctx: ExecContext,
            task: &Task,
            agent: &Agent,
        ) -> MeshResult<serde_json::Value> {
            Ok(json!({ "by": agent.name, "input": task.input }))
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let mgr = manager();
        let agents = vec![agent("a"), agent("b")];
        let t = task();
        let id = mgr
            .create(&t, &agents, CollabPattern::Parallel, CollabProtocol::Broadcast)
            .await
            .unwrap();

        let session = mgr.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Created);
        assert_eq!(session.task_id, t.id);
        assert_eq!(session.participants().len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_participants() {
        let mgr = manager();
        let result = mgr
            .create(&task(), &[], CollabPattern::Mesh, CollabProtocol::Direct)
            .await;
        assert!(matches!(result, Err(MeshError::Validation(_))));
    }

    #[tokio::test]
    async fn test_messaging_within_session() {
        let mgr = manager();
        let agents = vec![agent("a"), agent("b")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Mesh, CollabProtocol::Direct)
            .await
            .unwrap();

        mgr.send_message(
            id,
            agents[0].id,
            json!({"hello": true}),
            MessageKind::Info,
            Some(agents[1].id),
        )
        .await
        .unwrap();

        let inbox = mgr.inbox(id, agents[1].id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].content["hello"], true);

        // Outsiders are rejected.
        let outsider = mgr
            .send_message(id, Uuid::new_v4(), json!({}), MessageKind::Info, None)
            .await;
        assert!(matches!(outsider, Err(MeshError::Validation(_))));
    }

    #[tokio::test]
    async fn test_workspace_actions_and_ledger() {
        let mgr = manager();
        let agents = vec![agent("a"), agent("b")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Parallel, CollabProtocol::Broadcast)
            .await
            .unwrap();
        let actor = agents[0].id;

        let reply = mgr
            .workspace_action(
                id,
                actor,
                WorkspaceAction::AddDocument {
                    name: "notes".into(),
                    content: json!({"v": 1}),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            reply,
            WorkspaceReply::DocumentVersion { version: 1, .. }
        ));

        let reply = mgr
            .workspace_action(
                id,
                actor,
                WorkspaceAction::MakeDecision {
                    description: "ship it?".into(),
                    options: vec!["yes".into(), "no".into()],
                    method: DecisionMethod::MajorityVote,
                    votes: vec![(agents[0].id, "yes".into()), (agents[1].id, "yes".into())],
                    weights: HashMap::new(),
                },
            )
            .await
            .unwrap();
        let WorkspaceReply::Decision(outcome) = reply else {
            panic!("expected a decision");
        };
        assert_eq!(outcome.decision.as_deref(), Some("yes"));

        let WorkspaceReply::Workspace(view) = mgr
            .workspace_action(id, actor, WorkspaceAction::GetWorkspace)
            .await
            .unwrap()
        else {
            panic!("expected a workspace view");
        };
        assert_eq!(view.decisions.len(), 1);
        assert!(view.documents.contains_key("notes"));
    }

    #[tokio::test]
    async fn test_workspace_rejects_non_participant() {
        let mgr = manager();
        let agents = vec![agent("a")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Pipeline, CollabProtocol::Direct)
            .await
            .unwrap();

        let result = mgr
            .workspace_action(id, Uuid::new_v4(), WorkspaceAction::GetWorkspace)
            .await;
        assert!(matches!(result, Err(MeshError::Validation(_))));
    }

    #[tokio::test]
    async fn test_run_completes_and_archives() {
        let mgr = manager();
        let agents = vec![agent("a"), agent("b")];
        let t = task();
        let id = mgr
            .create(&t, &agents, CollabPattern::Parallel, CollabProtocol::Broadcast)
            .await
            .unwrap();

        let report = mgr
            .run(id, &t, &agents, &EchoExecutor, &ExecContext::detached())
            .await
            .unwrap();
        assert!(report.success);

        let session = mgr.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());
        assert!(session.shared_context.contains_key("report"));

        // The workspace is released with the session.
        let ws = mgr
            .workspace_action(id, agents[0].id, WorkspaceAction::GetWorkspace)
            .await;
        assert!(matches!(ws, Err(MeshError::Conflict(_))));
        assert_eq!(mgr.live_count().await, 0);
        assert_eq!(mgr.total_count().await, 1);
    }

    #[tokio::test]
    async fn test_run_twice_conflicts() {
        let mgr = manager();
        let agents = vec![agent("a")];
        let t = task();
        let id = mgr
            .create(&t, &agents, CollabPattern::Parallel, CollabProtocol::Broadcast)
            .await
            .unwrap();
        mgr.run(id, &t, &agents, &EchoExecutor, &ExecContext::detached())
            .await
            .unwrap();

        let again = mgr
            .run(id, &t, &agents, &EchoExecutor, &ExecContext::detached())
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_await_message_resolves_on_delivery() {
        let mgr = Arc::new(manager());
        let agents = vec![agent("a"), agent("b")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Mesh, CollabProtocol::Direct)
            .await
            .unwrap();

        let waiter = {
            let mgr = Arc::clone(&mgr);
            let recipient = agents[1].id;
            tokio::spawn(async move {
                mgr.await_message(id, recipient, MessageKind::Request, 5.0).await
            })
        };

        mgr.send_message(
            id,
            agents[0].id,
            json!({"q": "ready?"}),
            MessageKind::Request,
            Some(agents[1].id),
        )
        .await
        .unwrap();

        let msg = waiter.await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::Request);
        assert!(msg.requires_response);
    }

    #[tokio::test]
    async fn test_await_message_times_out() {
        let mgr = manager();
        let agents = vec![agent("a"), agent("b")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Mesh, CollabProtocol::Direct)
            .await
            .unwrap();

        let result = mgr
            .await_message(id, agents[1].id, MessageKind::Request, 0.05)
            .await;
        assert!(matches!(result, Err(MeshError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn test_end_requires_terminal_status() {
        let mgr = manager();
        let agents = vec![agent("a")];
        let id = mgr
            .create(&task(), &agents, CollabPattern::Mesh, CollabProtocol::Direct)
            .await
            .unwrap();

        let bad = mgr.end(id, SessionStatus::Active).await;
        assert!(matches!(bad, Err(MeshError::Validation(_))));

        let ended = mgr.end(id, SessionStatus::Aborted).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Aborted);
    }
}
