//! Task store: record ownership, the pending queue, and dependency gating.
//!
//! Tasks are never deleted. A task lives in the active index until it reaches
//! a terminal status, then moves to the history index, where completed ids
//! keep satisfying the dependency checks of later tasks.
//!
//! # Main types
//!
//! - [`TaskStore`] — Owns task records, the pending queue, and the
//!   dependency graph.

/// The task store.
pub mod store;

pub use store::TaskStore;
