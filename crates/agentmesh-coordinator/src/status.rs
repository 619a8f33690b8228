use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate snapshot of the whole system.
///
/// All maps are ordered so that two snapshots taken with no intervening
/// mutation serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Agent counts keyed by status name.
    pub agents_by_status: BTreeMap<String, usize>,
    /// Task counts keyed by status name, across active and history indexes.
    pub tasks_by_status: BTreeMap<String, usize>,
    /// Collaboration sessions not yet archived.
    pub live_collaborations: usize,
    /// Collaboration sessions ever created.
    pub total_collaborations: usize,
    /// Mean performance score across registered agents.
    pub average_performance: f64,
    /// Completed over finished (completed + failed); 1.0 before anything
    /// finishes.
    pub system_efficiency: f64,
}
