use std::collections::BTreeMap;
use std::time::Duration;

use agentmesh_core::{
    Agent, CollabPattern, ExecContext, Executor, MeshError, MeshResult, MessageKind, Task,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::decision;
use crate::router::MessageRouter;

/// One participant's contribution to a pattern run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParticipantResult {
    /// The participant.
    pub agent_id: Uuid,
    /// Whether its step succeeded.
    pub success: bool,
    /// Step output, when successful.
    pub output: Option<serde_json::Value>,
    /// Step error, when failed.
    pub error: Option<String>,
}

/// Outcome of running one coordination pattern to completion.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PatternReport {
    /// The topology that ran.
    pub pattern: CollabPattern,
    /// Per-participant results, in participant order. Stages skipped by a
    /// fail-fast abort are absent.
    pub results: Vec<ParticipantResult>,
    /// Number of successful steps.
    pub success_count: usize,
    /// Number of participants.
    pub total: usize,
    /// Pattern-level success (each topology defines its own conjunction).
    pub success: bool,
    /// Pattern-specific merged output.
    pub merged_output: serde_json::Value,
    /// Distinct options in play when a consensus round failed.
    #[serde(default)]
    pub conflicting_options: Vec<String>,
}

/// Split a task into `n` equal-effort slices, each tagged with its index.
///
/// Used when a collaboration has no explicit subtasks: every participant
/// receives one slice carrying the original input.
pub fn distribute(task: &Task, n: usize) -> Vec<Task> {
    let n = n.max(1);
    (0..n)
        .map(|i| {
            let mut slice = task.clone();
            slice.id = Uuid::new_v4();
            slice.description = format!("{} (slice {}/{})", task.description, i + 1, n);
            slice.estimated_secs = task.estimated_secs / n as f64;
            slice.input = json!({
                "slice_index": i,
                "slice_count": n,
                "input": task.input,
            });
            slice
        })
        .collect()
}

/// Run one pattern over the session's participants.
pub async fn run(
    pattern: CollabPattern,
    task: &Task,
    participants: &[Agent],
    router: &Mutex<MessageRouter>,
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    if participants.is_empty() {
        return PatternReport {
            pattern,
            results: Vec::new(),
            success_count: 0,
            total: 0,
            success: false,
            merged_output: serde_json::Value::Null,
            conflicting_options: Vec::new(),
        };
    }
    match pattern {
        CollabPattern::Pipeline => pipeline(task, participants, executor, ctx).await,
        CollabPattern::Parallel => parallel(task, participants, executor, ctx).await,
        CollabPattern::Hierarchical => {
            hierarchical(task, participants, router, executor, ctx).await
        }
        CollabPattern::Mesh => mesh(task, participants, router, executor, ctx).await,
        CollabPattern::Consensus => consensus(task, participants, router, executor, ctx).await,
    }
}

/// Execute one step, bounded by the slice's estimated duration.
async fn run_step(
    executor: &dyn Executor,
    ctx: &ExecContext,
    slice: &Task,
    agent: &Agent,
) -> MeshResult<serde_json::Value> {
    let budget = Duration::from_secs_f64(slice.estimated_secs.max(0.001));
    match tokio::time::timeout(budget, executor.execute(ctx.clone(), slice, agent)).await {
        Ok(result) => result,
        Err(_) => Err(MeshError::DeadlineExceeded(format!(
            "step '{}' exceeded its {:.1}s budget",
            slice.description, slice.estimated_secs
        ))),
    }
}

/// Sequential hand-off: each stage's output becomes the next stage's input.
/// A failed critical stage aborts the remainder; non-critical failures are
/// logged and the carry value passes through unchanged.
async fn pipeline(
    task: &Task,
    participants: &[Agent],
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    let n = participants.len();
    let mut results = Vec::new();
    let mut carry = task.input.clone();
    let mut aborted = false;

    for (i, agent) in participants.iter().enumerate() {
        let mut stage = task.clone();
        stage.id = Uuid::new_v4();
        stage.description = format!("{} (stage {}/{})", task.description, i + 1, n);
        stage.estimated_secs = task.estimated_secs / n as f64;
        stage.input = json!({
            "stage": i,
            "input": carry,
        });

        match run_step(executor, ctx, &stage, agent).await {
            Ok(output) => {
                carry = output.clone();
                results.push(ParticipantResult {
                    agent_id: agent.id,
                    success: true,
                    output: Some(output),
                    error: None,
                });
            }
            Err(e) => {
                results.push(ParticipantResult {
                    agent_id: agent.id,
                    success: false,
                    output: None,
                    error: Some(e.to_string()),
                });
                if task.critical {
                    warn!(stage = i, error = %e, "critical pipeline stage failed, aborting");
                    aborted = true;
                    break;
                }
                warn!(stage = i, error = %e, "non-critical pipeline stage failed, continuing");
            }
        }
    }

    let success_count = results.iter().filter(|r| r.success).count();
    PatternReport {
        pattern: CollabPattern::Pipeline,
        results,
        success_count,
        total: n,
        success: !aborted && success_count > 0,
        merged_output: json!({ "final": carry }),
        conflicting_options: Vec::new(),
    }
}

/// Concurrent fan-out; outputs merge under per-participant keys so colliding
/// output names cannot silently overwrite each other.
async fn parallel(
    task: &Task,
    participants: &[Agent],
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    let slices = distribute(task, participants.len());
    let steps = participants.iter().zip(slices.iter()).map(|(agent, slice)| {
        let ctx = ctx.clone();
        async move { (agent.id, run_step(executor, &ctx, slice, agent).await) }
    });

    let outcomes = futures_util::future::join_all(steps).await;

    let mut results = Vec::new();
    let mut merged = BTreeMap::new();
    for (agent_id, outcome) in outcomes {
        match outcome {
            Ok(output) => {
                merged.insert(agent_id.to_string(), output.clone());
                results.push(ParticipantResult {
                    agent_id,
                    success: true,
                    output: Some(output),
                    error: None,
                });
            }
            Err(e) => results.push(ParticipantResult {
                agent_id,
                success: false,
                output: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let success_count = results.iter().filter(|r| r.success).count();
    PatternReport {
        pattern: CollabPattern::Parallel,
        results,
        success_count,
        total: participants.len(),
        success: success_count > 0,
        merged_output: json!({ "outputs": merged }),
        conflicting_options: Vec::new(),
    }
}

/// Star topology: subordinates work and report to the first participant,
/// which alone emits the aggregated result. A lone participant executes the
/// task directly.
async fn hierarchical(
    task: &Task,
    participants: &[Agent],
    router: &Mutex<MessageRouter>,
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    let leader = &participants[0];
    let subordinates = &participants[1..];

    if subordinates.is_empty() {
        let outcome = run_step(executor, ctx, task, leader).await;
        let (success, output, error) = match outcome {
            Ok(o) => (true, Some(o), None),
            Err(e) => (false, None, Some(e.to_string())),
        };
        let merged = json!({ "leader": leader.id, "reports": output });
        return PatternReport {
            pattern: CollabPattern::Hierarchical,
            results: vec![ParticipantResult {
                agent_id: leader.id,
                success,
                output,
                error,
            }],
            success_count: usize::from(success),
            total: 1,
            success,
            merged_output: merged,
            conflicting_options: Vec::new(),
        };
    }

    let slices = distribute(task, subordinates.len());
    let steps = subordinates.iter().zip(slices.iter()).map(|(agent, slice)| {
        let ctx = ctx.clone();
        async move { (agent.id, run_step(executor, &ctx, slice, agent).await) }
    });
    let outcomes = futures_util::future::join_all(steps).await;

    let mut results = Vec::new();
    for (agent_id, outcome) in &outcomes {
        match outcome {
            Ok(output) => {
                // Report back to the leader over the session channel.
                if let Err(e) = router.lock().send(
                    *agent_id,
                    output.clone(),
                    MessageKind::Result,
                    Some(leader.id),
                ) {
                    warn!(subordinate = %agent_id, error = %e, "failed to report to leader");
                }
                results.push(ParticipantResult {
                    agent_id: *agent_id,
                    success: true,
                    output: Some(output.clone()),
                    error: None,
                });
            }
            Err(e) => results.push(ParticipantResult {
                agent_id: *agent_id,
                success: false,
                output: None,
                error: Some(e.to_string()),
            }),
        }
    }

    // Only the leader sees the reports; it aggregates them into the final
    // output.
    let reports: BTreeMap<String, serde_json::Value> = {
        let router = router.lock();
        router
            .inbox(leader.id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.kind == MessageKind::Result)
                    .map(|m| (m.sender.to_string(), m.content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    };
    let success_count = results.iter().filter(|r| r.success).count();
    let aggregate = json!({ "leader": leader.id, "reports": reports });
    // The leader's aggregation step always runs; empty reports reflect on
    // the subordinates, not on it.
    results.push(ParticipantResult {
        agent_id: leader.id,
        success: true,
        output: Some(aggregate.clone()),
        error: None,
    });

    PatternReport {
        pattern: CollabPattern::Hierarchical,
        results,
        success_count,
        total: participants.len(),
        success: success_count > 0,
        merged_output: aggregate,
        conflicting_options: Vec::new(),
    }
}

/// Full point-to-point: every participant works its slice and broadcasts an
/// acknowledgement. Success is the conjunction of all acks.
async fn mesh(
    task: &Task,
    participants: &[Agent],
    router: &Mutex<MessageRouter>,
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    let slices = distribute(task, participants.len());
    let steps = participants.iter().zip(slices.iter()).map(|(agent, slice)| {
        let ctx = ctx.clone();
        async move { (agent.id, run_step(executor, &ctx, slice, agent).await) }
    });
    let outcomes = futures_util::future::join_all(steps).await;

    let mut results = Vec::new();
    let mut merged = BTreeMap::new();
    let mut acks = 0usize;
    for (agent_id, outcome) in outcomes {
        match outcome {
            Ok(output) => {
                if let Err(e) = router.lock().send(
                    agent_id,
                    json!({ "ack": true }),
                    MessageKind::Ack,
                    None,
                ) {
                    warn!(participant = %agent_id, error = %e, "mesh ack broadcast failed");
                } else {
                    acks += 1;
                }
                merged.insert(agent_id.to_string(), output.clone());
                results.push(ParticipantResult {
                    agent_id,
                    success: true,
                    output: Some(output),
                    error: None,
                });
            }
            Err(e) => results.push(ParticipantResult {
                agent_id,
                success: false,
                output: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let success_count = results.iter().filter(|r| r.success).count();
    debug!(acks, total = participants.len(), "mesh round finished");
    PatternReport {
        pattern: CollabPattern::Mesh,
        results,
        success_count,
        total: participants.len(),
        success: acks == participants.len(),
        merged_output: json!({ "outputs": merged, "acks": acks }),
        conflicting_options: Vec::new(),
    }
}

/// Proposal plus one vote round. Success requires every participant to vote
/// and all votes to name the same option; otherwise the conflicting option
/// set is reported and nothing is committed.
async fn consensus(
    task: &Task,
    participants: &[Agent],
    router: &Mutex<MessageRouter>,
    executor: &dyn Executor,
    ctx: &ExecContext,
) -> PatternReport {
    let proposer = &participants[0];
    if participants.len() > 1 {
        if let Err(e) =
            router
                .lock()
                .send(proposer.id, task.input.clone(), MessageKind::Proposal, None)
        {
            warn!(error = %e, "consensus proposal broadcast failed");
        }
    }

    let slices = distribute(task, participants.len());
    let steps = participants.iter().zip(slices.iter()).map(|(agent, slice)| {
        let ctx = ctx.clone();
        let mut ballot = slice.clone();
        ballot.input = json!({
            "proposal": task.input,
            "slice_index": slice.input["slice_index"],
        });
        async move { (agent.id, run_step(executor, &ctx, &ballot, agent).await) }
    });
    let outcomes = futures_util::future::join_all(steps).await;

    let mut results = Vec::new();
    let mut votes: Vec<(String, String)> = Vec::new();
    let mut abstentions = 0usize;
    for (agent_id, outcome) in outcomes {
        match outcome {
            Ok(output) => {
                let vote = output
                    .get("vote")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| output.to_string());
                if agent_id != proposer.id {
                    if let Err(e) = router.lock().send(
                        agent_id,
                        json!({ "vote": vote }),
                        MessageKind::Vote,
                        Some(proposer.id),
                    ) {
                        warn!(voter = %agent_id, error = %e, "vote delivery failed");
                    }
                }
                votes.push((agent_id.to_string(), vote));
                results.push(ParticipantResult {
                    agent_id,
                    success: true,
                    output: Some(output),
                    error: None,
                });
            }
            Err(e) => {
                abstentions += 1;
                results.push(ParticipantResult {
                    agent_id,
                    success: false,
                    output: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let outcome = decision::consensus(&votes);
    // A participant that failed to vote blocks unanimity.
    let success = outcome.success && abstentions == 0;
    let success_count = results.iter().filter(|r| r.success).count();
    PatternReport {
        pattern: CollabPattern::Consensus,
        results,
        success_count,
        total: participants.len(),
        success,
        merged_output: json!({
            "decision": outcome.decision,
            "tally": outcome.tally,
        }),
        conflicting_options: outcome.conflicting,
    }
}
