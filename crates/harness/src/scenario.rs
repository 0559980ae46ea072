//! Scenario traits and the worker state machine.

use async_trait::async_trait;
use serde::Serialize;
use store::StoreClient;

use crate::{Anomaly, Result, ScenarioEnv, WorkerContext};

/// What a worker does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run another step unless cancellation was signalled.
    Continue,
    /// The scenario reached its natural end.
    Completed,
}

/// Per-worker unit of work.
///
/// The runner calls [`step`](Self::step) repeatedly and checks for
/// cancellation between calls, never during one. A step is one or more
/// logical operations that must not be interrupted half way.
#[async_trait]
pub trait Scenario<S: StoreClient + 'static>: Send {
    async fn step(&mut self, ctx: &mut WorkerContext<S>) -> Result<StepOutcome>;
}

/// Describes one run: shared fixtures, per-worker scenarios and the
/// post-conditions checked once every worker has stopped.
#[async_trait]
pub trait Workload<S: StoreClient + 'static>: Send + Sync {
    type Scenario: Scenario<S> + 'static;

    fn name(&self) -> &'static str;

    /// Writes fixtures shared by all workers. Runs before any worker starts.
    async fn prepare(&self, _env: &ScenarioEnv<S>) -> Result<()> {
        Ok(())
    }

    fn scenario(&self, worker_id: usize) -> Self::Scenario;

    /// Checks run-wide post-conditions after every worker has stopped.
    async fn verify(&self, _env: &ScenarioEnv<S>, _workers: usize) -> Result<Vec<Anomaly>> {
        Ok(Vec::new())
    }
}

/// Lifecycle of one worker.
///
/// State transitions:
/// ```text
/// Init ──┬──► Running ──┬──► Completed
///        │              ├──► Stopped
///        │              ├──► Failed
///        │              └──► Terminated
///        └──► Failed
/// ```
///
/// A worker leaves `Init` once its user record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub enum WorkerState {
    /// Writing the worker's user record.
    #[default]
    Init,

    /// Steps are being executed.
    Running,

    /// Cancellation was observed between steps (terminal state).
    Stopped,

    /// The scenario ran to its natural end (terminal state).
    Completed,

    /// A step returned an error (terminal state).
    Failed,

    /// The worker outlived the grace period and was aborted (terminal state).
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerState::Init | WorkerState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Init => "Init",
            WorkerState::Running => "Running",
            WorkerState::Stopped => "Stopped",
            WorkerState::Completed => "Completed",
            WorkerState::Failed => "Failed",
            WorkerState::Terminated => "Terminated",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
