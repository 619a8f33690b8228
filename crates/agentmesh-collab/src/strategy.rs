use std::collections::HashSet;

use agentmesh_core::{
    Agent, CommunicationStyle, DecisionMode, ExecutionMode, ResolutionMode, Strategy, Task,
    TaskPriority,
};

/// Derive the coordination strategy for a session.
///
/// A pure function of the participant set and the task:
/// - execution is parallel when the participants' combined capability set is
///   at least as wide as the requirement list, sequential otherwise;
/// - small groups (≤ 3) broadcast, larger ones route through a coordinator;
/// - high-priority work decides by consensus, the rest is coordinator-led;
/// - odd-sized groups vote on conflicts, even-sized ones use a mediator.
pub fn derive_strategy(participants: &[Agent], task: &Task) -> Strategy {
    let combined: HashSet<&str> = participants
        .iter()
        .flat_map(|a| a.capabilities.iter().map(|c| c.name.as_str()))
        .collect();

    Strategy {
        execution: if combined.len() >= task.requirements.len() {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        },
        communication: if participants.len() <= 3 {
            CommunicationStyle::Broadcast
        } else {
            CommunicationStyle::Hierarchical
        },
        decision_making: if task.priority >= TaskPriority::High {
            DecisionMode::Consensus
        } else {
            DecisionMode::CoordinatorLed
        },
        conflict_resolution: if participants.len() % 2 == 1 {
            ResolutionMode::Voting
        } else {
            ResolutionMode::Mediator
        },
    }
}
