use agentmesh_core::agent::MAX_PERFORMANCE;
use agentmesh_core::{Agent, Task};

/// Suitability of `agent` for `task`, clamped to [0, 1].
///
/// Weighted blend of four signals: normalized performance score (0.4), mean
/// proficiency over the matching capabilities (0.3), a duration-fit factor
/// (0.2), and current idleness (0.1). An agent with no completion history
/// gets a neutral duration factor of 1.0.
pub fn suitability(agent: &Agent, task: &Task) -> f64 {
    let performance = (agent.performance_score / MAX_PERFORMANCE).clamp(0.0, 1.0);
    let proficiency = agent.avg_proficiency(&task.requirements);
    let duration_fit = if agent.completed_tasks == 0 || agent.avg_completion_secs <= 0.0 {
        1.0
    } else {
        (task.estimated_secs / agent.avg_completion_secs).min(2.0) / 2.0
    };
    let idle = if agent.is_idle() { 1.0 } else { 0.0 };

    (0.4 * performance + 0.3 * proficiency + 0.2 * duration_fit + 0.1 * idle).clamp(0.0, 1.0)
}
