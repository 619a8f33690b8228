use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::agent::Agent;
use crate::task::Task;
use crate::MeshResult;

/// Execution context handed to the [`Executor`] with every call.
///
/// Carries the step deadline and a cooperative cancellation signal. The
/// executor is expected to poll [`ExecContext::cancelled`] (or check
/// [`ExecContext::is_cancelled`]) at its own suspension points.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Hard deadline for this step, if any.
    pub deadline: Option<DateTime<Utc>>,
    cancel: watch::Receiver<bool>,
    // Keeps the sender of a detached context alive so the receiver never
    // observes a closed channel.
    _keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl ExecContext {
    /// Create a context plus the handle that cancels it.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: rx,
                _keepalive: None,
            },
            CancelHandle { tx },
        )
    }

    /// A context that can never be cancelled. For fire-and-forget steps and
    /// tests.
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel: rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Attach a deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the handle
    /// is gone without having cancelled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.cancel.borrow() {
                return;
            }
            if self.cancel.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancels the [`ExecContext`] it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// External collaborator that performs the actual work of a task step.
///
/// The engine never knows what "work" means; it measures elapsed time around
/// this call and interprets the result. Retry policy, if any, belongs behind
/// this trait, not in the core.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one step of `task` as `agent`, returning the step output.
    async fn execute(
        &self,
        ctx: ExecContext,
        task: &Task,
        agent: &Agent,
    ) -> MeshResult<serde_json::Value>;
}
