use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Group decision algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    /// Plurality wins.
    MajorityVote,
    /// Unanimity or nothing.
    Consensus,
    /// Plurality by voter weight.
    WeightedVote,
}

/// Outcome of a group decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// Algorithm used.
    pub method: DecisionMethod,
    /// Whether a decision was reached.
    pub success: bool,
    /// The winning option, when one was reached.
    pub decision: Option<String>,
    /// Per-option tally (vote counts, or summed weights).
    pub tally: BTreeMap<String, f64>,
    /// Distinct options in play when consensus failed, sorted.
    #[serde(default)]
    pub conflicting: Vec<String>,
}

impl DecisionOutcome {
    /// Winning share as (winning tally, total tally), when decided.
    pub fn margin(&self) -> Option<(f64, f64)> {
        let decision = self.decision.as_ref()?;
        let winning = *self.tally.get(decision)?;
        let total: f64 = self.tally.values().sum();
        Some((winning, total))
    }
}

/// Plurality vote over an ordered list of (voter, option) pairs.
///
/// A tie goes to the option whose first vote was submitted earliest — the
/// input order is semantic, which is why votes arrive as a list and not a
/// map.
pub fn majority_vote(votes: &[(String, String)]) -> DecisionOutcome {
    let mut tally: BTreeMap<String, f64> = BTreeMap::new();
    for (_, option) in votes {
        *tally.entry(option.clone()).or_insert(0.0) += 1.0;
    }

    let decision = pick_winner(&tally, |option| first_vote_index(votes, option));

    DecisionOutcome {
        method: DecisionMethod::MajorityVote,
        success: decision.is_some(),
        decision,
        tally,
        conflicting: Vec::new(),
    }
}

/// Unanimity check: succeeds only when every cast vote names the same option.
pub fn consensus(votes: &[(String, String)]) -> DecisionOutcome {
    let mut tally: BTreeMap<String, f64> = BTreeMap::new();
    for (_, option) in votes {
        *tally.entry(option.clone()).or_insert(0.0) += 1.0;
    }
    let distinct: BTreeSet<&String> = votes.iter().map(|(_, o)| o).collect();

    if distinct.len() == 1 && !votes.is_empty() {
        DecisionOutcome {
            method: DecisionMethod::Consensus,
            success: true,
            decision: votes.first().map(|(_, o)| o.clone()),
            tally,
            conflicting: Vec::new(),
        }
    } else {
        DecisionOutcome {
            method: DecisionMethod::Consensus,
            success: false,
            decision: None,
            tally,
            conflicting: distinct.into_iter().cloned().collect(),
        }
    }
}

/// Weight-summed vote. A voter missing from `weights` counts as 1.0.
///
/// A tie goes to the lexicographically smallest option label.
pub fn weighted_vote(
    votes: &[(String, String)],
    weights: &HashMap<String, f64>,
) -> DecisionOutcome {
    let mut tally: BTreeMap<String, f64> = BTreeMap::new();
    for (voter, option) in votes {
        let weight = weights.get(voter).copied().unwrap_or(1.0);
        *tally.entry(option.clone()).or_insert(0.0) += weight;
    }

    // BTreeMap iteration is lexicographic, so taking the first max wins ties
    // by smallest label.
    let decision = pick_winner(&tally, |_| 0);

    DecisionOutcome {
        method: DecisionMethod::WeightedVote,
        success: decision.is_some(),
        decision,
        tally,
        conflicting: Vec::new(),
    }
}

/// Highest tally wins; `tiebreak` ranks equal tallies (lower rank wins).
fn pick_winner(tally: &BTreeMap<String, f64>, tiebreak: impl Fn(&str) -> usize) -> Option<String> {
    let mut best: Option<(&String, f64, usize)> = None;
    for (option, count) in tally {
        let rank = tiebreak(option);
        let better = match best {
            None => true,
            Some((_, best_count, best_rank)) => {
                *count > best_count || (*count == best_count && rank < best_rank)
            }
        };
        if better {
            best = Some((option, *count, rank));
        }
    }
    best.map(|(option, _, _)| option.clone())
}

fn first_vote_index(votes: &[(String, String)], option: &str) -> usize {
    votes
        .iter()
        .position(|(_, o)| o == option)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn votes(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(v, o)| (v.to_string(), o.to_string()))
            .collect()
    }

    #[test]
    fn test_majority_simple() {
        let outcome = majority_vote(&votes(&[("a", "x"), ("b", "x"), ("c", "y")]));
        assert!(outcome.success);
        assert_eq!(outcome.decision.as_deref(), Some("x"));
        assert_eq!(outcome.tally.get("x"), Some(&2.0));
        assert_eq!(outcome.tally.get("y"), Some(&1.0));
        assert_eq!(outcome.margin(), Some((2.0, 3.0)));
    }

    #[test]
    fn test_majority_tie_goes_to_first_submitted() {
        let outcome = majority_vote(&votes(&[("a", "y"), ("b", "x"), ("c", "x"), ("d", "y")]));
        // Two votes each; "y" was submitted first.
        assert_eq!(outcome.decision.as_deref(), Some("y"));
    }

    #[test]
    fn test_majority_empty_votes_fails() {
        let outcome = majority_vote(&[]);
        assert!(!outcome.success);
        assert!(outcome.decision.is_none());
    }

    #[test]
    fn test_consensus_unanimous() {
        let outcome = consensus(&votes(&[("a", "x"), ("b", "x")]));
        assert!(outcome.success);
        assert_eq!(outcome.decision.as_deref(), Some("x"));
        assert!(outcome.conflicting.is_empty());
    }

    #[test]
    fn test_consensus_split_reports_conflicting_options() {
        let outcome = consensus(&votes(&[("a", "x"), ("b", "y")]));
        assert!(!outcome.success);
        assert!(outcome.decision.is_none());
        assert_eq!(outcome.conflicting, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_consensus_empty_fails() {
        assert!(!consensus(&[]).success);
    }

    #[test]
    fn test_weighted_vote_sums_weights() {
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 3.0);
        let outcome = weighted_vote(&votes(&[("a", "x"), ("b", "y"), ("c", "y")]), &weights);
        assert_eq!(outcome.decision.as_deref(), Some("x"));
        assert_eq!(outcome.tally.get("x"), Some(&3.0));
        assert_eq!(outcome.tally.get("y"), Some(&2.0));
    }

    #[test]
    fn test_weighted_vote_defaults_missing_weight_to_one() {
        let outcome = weighted_vote(&votes(&[("a", "x"), ("b", "y")]), &HashMap::new());
        // Equal weight; lexicographic tie-break picks "x".
        assert_eq!(outcome.decision.as_deref(), Some("x"));
    }

    #[test]
    fn test_weighted_tie_breaks_lexicographically() {
        let outcome = weighted_vote(&votes(&[("a", "zeta"), ("b", "alpha")]), &HashMap::new());
        assert_eq!(outcome.decision.as_deref(), Some("alpha"));
    }
}
