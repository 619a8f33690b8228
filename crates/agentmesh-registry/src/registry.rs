use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentmesh_core::agent::DEFAULT_PERFORMANCE;
use agentmesh_core::{
    Agent, AgentConfig, AgentStatus, Clock, Event, EventSink, MeshError, MeshResult, Task,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::performance::{updated_mean, updated_score};
use crate::scoring::suitability;

/// Owns all agent records and their status transitions.
///
/// Every transition that matters for scheduling (`try_assign`,
/// `begin_coordination`) is a compare-and-set inside a single write-lock
/// section, so concurrent dispatch attempts serialize on the agent status
/// rather than on any global lock.
pub struct AgentRegistry {
    agents: RwLock<HashMap<Uuid, Agent>>,
    next_seq: AtomicU64,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new(clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            clock,
            events,
        }
    }

    /// Register a new agent from a validated config.
    pub async fn register(&self, cfg: AgentConfig) -> MeshResult<Uuid> {
        cfg.validate()?;
        let agent = Agent {
            id: Uuid::new_v4(),
            name: cfg.name,
            agent_type: cfg.agent_type,
            capabilities: cfg.capabilities,
            status: AgentStatus::Idle,
            performance_score: DEFAULT_PERFORMANCE,
            avg_completion_secs: 0.0,
            completed_tasks: 0,
            current_task: None,
            metadata: cfg.metadata,
            registered_at: self.clock.now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let id = agent.id;
        let name = agent.name.clone();
        self.agents.write().await.insert(id, agent);
        info!(agent_id = %id, name = %name, "agent registered");
        self.events.emit(&Event::AgentRegistered { agent_id: id, name });
        Ok(id)
    }

    /// Remove an agent. Returns the task it was working on, if any, so the
    /// caller can fail it.
    pub async fn unregister(&self, id: Uuid) -> MeshResult<Option<Uuid>> {
        let removed = self
            .agents
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {id}")))?;
        if removed.current_task.is_some() {
            warn!(agent_id = %id, task_id = ?removed.current_task, "unregistered agent had an active task");
        }
        self.events.emit(&Event::AgentUnregistered { agent_id: id });
        Ok(removed.current_task)
    }

    /// Fetch a snapshot of one agent.
    pub async fn get(&self, id: Uuid) -> MeshResult<Agent> {
        self.agents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MeshError::NotFound(format!("agent {id}")))
    }

    /// Snapshot of all agents in registration order.
    pub async fn list(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        agents.sort_by_key(|a| a.seq);
        agents
    }

    /// Idle agents covering every requirement of `task`, ranked by descending
    /// suitability. Ties resolve by registration order.
    pub async fn find_suitable(&self, task: &Task) -> Vec<(Uuid, f64)> {
        let agents = self.agents.read().await;
        let mut ranked: Vec<(Uuid, f64, u64)> = agents
            .values()
            .filter(|a| a.is_idle() && a.covers(&task.requirements))
            .map(|a| (a.id, suitability(a, task), a.seq))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
        ranked.into_iter().map(|(id, score, _)| (id, score)).collect()
    }

    /// Atomic Idle→Busy transition claiming the agent for `task_id`.
    pub async fn try_assign(&self, task_id: Uuid, agent_id: Uuid) -> MeshResult<()> {
        self.cas_claim(task_id, agent_id, AgentStatus::Busy).await
    }

    /// Atomic Idle→Coordinating transition claiming the agent for a
    /// collaboration on `task_id`.
    pub async fn begin_coordination(&self, task_id: Uuid, agent_id: Uuid) -> MeshResult<()> {
        self.cas_claim(task_id, agent_id, AgentStatus::Coordinating).await
    }

    async fn cas_claim(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        target: AgentStatus,
    ) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        if agent.status != AgentStatus::Idle {
            return Err(MeshError::Conflict(format!(
                "agent {agent_id} is {} at assignment time",
                agent.status
            )));
        }
        agent.status = target;
        agent.current_task = Some(task_id);
        debug!(agent_id = %agent_id, task_id = %task_id, status = %target, "agent claimed");
        Ok(())
    }

    /// Return a working agent to the idle pool.
    pub async fn release(&self, agent_id: Uuid) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        match agent.status {
            AgentStatus::Busy | AgentStatus::Coordinating => {
                agent.status = AgentStatus::Idle;
                agent.current_task = None;
                Ok(())
            }
            other => Err(MeshError::Conflict(format!(
                "agent {agent_id} is {other}, not working"
            ))),
        }
    }

    /// Put an agent into the sticky error state.
    pub async fn mark_error(&self, agent_id: Uuid) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        agent.status = AgentStatus::Error;
        agent.current_task = None;
        warn!(agent_id = %agent_id, "agent marked as errored");
        Ok(())
    }

    /// Explicit Error→Idle transition. The only way out of the error state:
    /// a persistently failing agent is never silently retried.
    pub async fn recover(&self, agent_id: Uuid) -> MeshResult<()> {
        {
            let mut agents = self.agents.write().await;
            let agent = agents
                .get_mut(&agent_id)
                .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
            if agent.status != AgentStatus::Error {
                return Err(MeshError::Conflict(format!(
                    "agent {agent_id} is {}, not errored",
                    agent.status
                )));
            }
            agent.status = AgentStatus::Idle;
        }
        info!(agent_id = %agent_id, "agent recovered");
        self.events.emit(&Event::AgentRecovered { agent_id });
        Ok(())
    }

    /// Take an idle agent out of rotation.
    pub async fn set_offline(&self, agent_id: Uuid) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        if agent.status != AgentStatus::Idle {
            return Err(MeshError::Conflict(format!(
                "agent {agent_id} is {}, only idle agents can go offline",
                agent.status
            )));
        }
        agent.status = AgentStatus::Offline;
        Ok(())
    }

    /// Bring an offline agent back into rotation.
    pub async fn set_online(&self, agent_id: Uuid) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        if agent.status != AgentStatus::Offline {
            return Err(MeshError::Conflict(format!(
                "agent {agent_id} is {}, not offline",
                agent.status
            )));
        }
        agent.status = AgentStatus::Idle;
        Ok(())
    }

    /// Fold a successful execution into the agent's running statistics.
    pub async fn record_success(
        &self,
        agent_id: Uuid,
        elapsed_secs: f64,
        estimated_secs: f64,
    ) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("agent {agent_id}")))?;
        agent.completed_tasks += 1;
        agent.avg_completion_secs =
            updated_mean(agent.avg_completion_secs, agent.completed_tasks, elapsed_secs);
        agent.performance_score =
            updated_score(agent.performance_score, estimated_secs, elapsed_secs);
        debug!(
            agent_id = %agent_id,
            score = agent.performance_score,
            avg_secs = agent.avg_completion_secs,
            "performance recorded"
        );
        Ok(())
    }

    /// Agent counts keyed by status name. Deterministic iteration order.
    pub async fn counts_by_status(&self) -> BTreeMap<String, usize> {
        let agents = self.agents.read().await;
        let mut counts = BTreeMap::new();
        for agent in agents.values() {
            *counts.entry(agent.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Mean performance score across all agents, or the default when empty.
    pub async fn average_performance(&self) -> f64 {
        let agents = self.agents.read().await;
        if agents.is_empty() {
            return DEFAULT_PERFORMANCE;
        }
        agents.values().map(|a| a.performance_score).sum::<f64>() / agents.len() as f64
    }

    /// Number of registered agents.
    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }
}
