//! The coordination engine's top-level crate: scheduling, dispatch, and the
//! public operation surface.
//!
//! A [`Coordinator`] owns the agent registry, the task store, and the
//! session manager, and drives work through the external
//! [`agentmesh_core::Executor`]. Submission decides between single-agent and
//! collaborative execution; completions feed the performance recorder and
//! drain the pending queue.
//!
//! # Main types
//!
//! - [`Coordinator`] — Submission, dispatch, cancellation, and the exposed
//!   operations.
//! - [`CoordinatorConfig`] — TOML-loadable tuning knobs.
//! - [`SystemStatus`] — Deterministic aggregate snapshot.
//! - [`telemetry::init_tracing`] — Tracing subscriber setup.

/// Coordinator configuration.
pub mod config;
/// The coordinator itself.
pub mod coordinator;
/// Aggregate status snapshot.
pub mod status;
/// Tracing initialization.
pub mod telemetry;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use status::SystemStatus;
