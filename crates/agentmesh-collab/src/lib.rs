//! Collaboration sessions: the five coordination patterns, per-session
//! messaging, the shared workspace, and the conflict/decision machinery.
//!
//! A session binds an immutable participant set to one topology
//! (pipeline, parallel, hierarchical, mesh, consensus) and runs it over the
//! external [`agentmesh_core::Executor`]. Sessions move
//! Created → Active → {Completed, Aborted}; on end they are archived with
//! their shared context while the router and workspace are released.
//!
//! # Main types
//!
//! - [`SessionManager`] — Owns live sessions and the archive.
//! - [`MessageRouter`] — Per-session mailboxes with order guarantees.
//! - [`Workspace`] — Versioned documents, shared data, decision ledger.
//! - [`patterns`] — Execution of the five topologies.
//! - [`decision`] — Majority / consensus / weighted group votes.
//! - [`conflict`] — Resource-contention and disagreement resolution.

/// Conflict resolution.
pub mod conflict;
/// Group decision algorithms.
pub mod decision;
/// Session lifecycle and ownership.
pub mod manager;
/// The five coordination patterns.
pub mod patterns;
/// Per-session message routing.
pub mod router;
/// Strategy derivation.
pub mod strategy;
/// Per-session shared state.
pub mod workspace;

pub use conflict::{ConflictRequest, Resolution, TimeSlot};
pub use decision::{consensus, majority_vote, weighted_vote, DecisionMethod, DecisionOutcome};
pub use manager::{SessionManager, SessionState, WorkspaceAction, WorkspaceReply};
pub use patterns::{distribute, ParticipantResult, PatternReport};
pub use router::MessageRouter;
pub use strategy::derive_strategy;
pub use workspace::{AccessLevel, DecisionRecord, Document, SharedEntry, Workspace, WorkspaceView};
