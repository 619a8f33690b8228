//! Core types and error definitions for the Agentmesh coordination engine.
//!
//! This crate provides the foundational types shared across all Agentmesh
//! crates: the domain model (agents, tasks, collaborations, messages), the
//! unified error enum, and the external seams through which the engine
//! consumes its collaborators (executor, clock, telemetry sink).
//!
//! # Main types
//!
//! - [`MeshError`] — Unified error enum for all Agentmesh subsystems.
//! - [`MeshResult`] — Convenience alias for `Result<T, MeshError>`.
//! - [`Agent`] / [`Capability`] — Worker agent records and declared skills.
//! - [`Task`] / [`TaskSpec`] — Units of work with requirements and dependencies.
//! - [`Collaboration`] — Multi-agent execution context bound to one pattern.
//! - [`Executor`] — External collaborator that performs the actual work.
//! - [`Clock`] — Injectable time source for deterministic tests.
//! - [`EventSink`] — Optional lifecycle telemetry hook.

/// Worker agent records, capabilities, and status.
pub mod agent;
/// Collaboration records, patterns, and derived strategies.
pub mod collab;
/// Injectable time source.
pub mod clock;
/// Lifecycle telemetry events and sinks.
pub mod event;
/// The executor seam through which actual work is performed.
pub mod executor;
/// Inter-participant session messages.
pub mod message;
/// Task records, priorities, and submission specs.
pub mod task;

pub use agent::{Agent, AgentConfig, AgentStatus, Capability};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collab::{
    Collaboration, CollabPattern, CollabProtocol, CommunicationStyle, DecisionMode, ExecutionMode,
    ResolutionMode, SessionStatus, Strategy,
};
pub use event::{Event, EventSink, MemorySink, NullSink, TracingSink};
pub use executor::{CancelHandle, ExecContext, Executor};
pub use message::{MessageKind, SessionMessage};
pub use task::{Task, TaskPriority, TaskSpec, TaskStatus};

/// Top-level error type for the Agentmesh engine.
///
/// Each variant corresponds to a failure class that can cross a subsystem
/// boundary. "No suitable agent" is deliberately absent: a task that cannot
/// be placed simply remains queued.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A malformed registration or submission config.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An unknown agent, task, session, or document.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A compare-and-set or optimistic-concurrency failure.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A wrapped failure from the external executor.
    #[error("Executor error: {0}")]
    Executor(String),

    /// A step or wait outran its time budget.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MeshError`].
pub type MeshResult<T> = Result<T, MeshError>;
