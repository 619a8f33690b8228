//! Agent registry: record ownership, availability, and suitability ranking.
//!
//! The registry is the single owner of agent records. Status transitions are
//! compare-and-set operations executed inside one write-lock section, which
//! makes the status field the assignment lock: two schedulers racing for the
//! same idle agent cannot both win.
//!
//! # Main types
//!
//! - [`AgentRegistry`] — Owns agent records and status transitions.
//! - [`scoring::suitability`] — Pure (agent, task) → score in [0, 1].
//! - [`performance`] — Online mean and clamped score updates.

/// Performance feedback math.
pub mod performance;
/// The registry itself.
pub mod registry;
/// Suitability scoring.
pub mod scoring;

pub use registry::AgentRegistry;
pub use scoring::suitability;
