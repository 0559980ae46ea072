//! Scenario runner: spawns workers, signals cancellation and merges reports.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use store::StoreClient;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::context::record_anomaly;
use crate::{
    Scenario, ScenarioEnv, ScenarioReport, StepOutcome, WorkerContext, WorkerFailure, WorkerState,
    Workload,
};

/// How long stopped workers get to finish their current step.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(800);

struct WorkerExit {
    worker_id: usize,
    state: WorkerState,
    failure: Option<WorkerFailure>,
}

/// Runs a [`Workload`] across concurrent workers.
///
/// Each worker is an independent task driving its own [`Scenario`] in program
/// order. Workers share nothing but the store.
pub struct ScenarioRunner<S: StoreClient> {
    env: ScenarioEnv<S>,
    grace_period: Duration,
}

impl<S> ScenarioRunner<S>
where
    S: StoreClient + Clone + 'static,
{
    pub fn new(env: ScenarioEnv<S>) -> Self {
        Self {
            env,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn env(&self) -> &ScenarioEnv<S> {
        &self.env
    }

    /// Runs `workers` workers to natural completion.
    ///
    /// There is no cancellation: a scenario that never completes keeps this
    /// call from returning.
    #[tracing::instrument(skip(self, workload), fields(scenario = workload.name()))]
    pub async fn run_fixed<W>(&self, workload: W, workers: usize) -> ScenarioReport
    where
        W: Workload<S>,
    {
        self.run(workload, workers, None::<std::future::Pending<()>>)
            .await
    }

    /// Runs `workers` workers for `duration`, then stops them.
    ///
    /// The duration is measured from the moment workers start, so preparation
    /// does not eat into it. Returns within `duration` plus the grace period
    /// plus the time to prepare and verify the workload.
    #[tracing::instrument(skip(self, workload), fields(scenario = workload.name()))]
    pub async fn run_for_duration<W>(
        &self,
        workload: W,
        workers: usize,
        duration: Duration,
    ) -> ScenarioReport
    where
        W: Workload<S>,
    {
        // The sleep is created on first poll, after every worker has been spawned.
        let deadline = async move { tokio::time::sleep(duration).await };
        self.run(workload, workers, Some(deadline)).await
    }

    /// Runs `workers` workers until `shutdown` resolves, then stops them.
    pub async fn run_until<W, F>(&self, workload: W, workers: usize, shutdown: F) -> ScenarioReport
    where
        W: Workload<S>,
        F: Future<Output = ()>,
    {
        self.run(workload, workers, Some(shutdown)).await
    }

    async fn run<W, F>(&self, workload: W, workers: usize, shutdown: Option<F>) -> ScenarioReport
    where
        W: Workload<S>,
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut report = ScenarioReport::new(workload.name(), workers);

        if let Err(e) = workload.prepare(&self.env).await {
            tracing::error!(error = %e, "workload preparation failed");
            report.failures.push(WorkerFailure::new(None, &e));
            report.elapsed = started.elapsed();
            return report;
        }

        let (anomaly_tx, mut anomaly_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancellable = shutdown.is_some();
        let operations = Arc::new(AtomicU64::new(0));

        let mut handles: Vec<(usize, JoinHandle<WorkerExit>)> = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let ctx = WorkerContext::new(
                worker_id,
                self.env.clone(),
                anomaly_tx.clone(),
                cancellable.then(|| cancel_rx.clone()),
            );
            let scenario = workload.scenario(worker_id);
            let operations = Arc::clone(&operations);
            handles.push((
                worker_id,
                tokio::spawn(drive(workload.name(), scenario, ctx, operations)),
            ));
        }
        drop(anomaly_tx);
        tracing::info!(workers, "workers started");

        let exits = match shutdown {
            None => self.join(handles, None).await,
            Some(shutdown) => {
                shutdown.await;
                tracing::info!("signalling workers to stop");
                // `cancel_rx` is still alive here, so the send cannot fail.
                let _ = cancel_tx.send(true);
                self.join(handles, Some(Instant::now() + self.grace_period))
                    .await
            }
        };

        for exit in exits {
            if exit.state == WorkerState::Terminated {
                report.forced_terminations += 1;
            }
            if let Some(failure) = exit.failure {
                report.failures.push(failure);
            }
            tracing::debug!(worker_id = exit.worker_id, state = %exit.state, "worker exited");
        }

        while let Ok(anomaly) = anomaly_rx.try_recv() {
            report.anomalies.push(anomaly);
        }

        match workload.verify(&self.env, workers).await {
            Ok(anomalies) => {
                for anomaly in anomalies {
                    record_anomaly(&anomaly);
                    report.anomalies.push(anomaly);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "workload verification failed");
                report.failures.push(WorkerFailure::new(None, &e));
            }
        }

        report.operations = operations.load(Ordering::Relaxed);
        report.elapsed = started.elapsed();
        tracing::info!(
            operations = report.operations,
            anomalies = report.anomalies.len(),
            failures = report.failures.len(),
            forced_terminations = report.forced_terminations,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scenario run complete"
        );
        report
    }

    /// Joins every worker, aborting those still running at `deadline`.
    async fn join(
        &self,
        handles: Vec<(usize, JoinHandle<WorkerExit>)>,
        deadline: Option<Instant>,
    ) -> Vec<WorkerExit> {
        let mut exits = Vec::with_capacity(handles.len());
        for (worker_id, mut handle) in handles {
            let joined = match deadline {
                None => Some((&mut handle).await),
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await.ok(),
            };

            let exit = match joined {
                Some(Ok(exit)) => exit,
                Some(Err(e)) => {
                    tracing::error!(worker_id, error = %e, "worker task panicked");
                    WorkerExit {
                        worker_id,
                        state: WorkerState::Failed,
                        failure: Some(WorkerFailure::panicked(worker_id)),
                    }
                }
                None => {
                    tracing::warn!(worker_id, "worker outlived grace period, aborting");
                    handle.abort();
                    // Wait for the abort so the worker's anomaly sender is dropped.
                    let _ = handle.await;
                    WorkerExit {
                        worker_id,
                        state: WorkerState::Terminated,
                        failure: None,
                    }
                }
            };
            exits.push(exit);
        }
        exits
    }
}

/// Registers the worker's user, then drives its scenario through
/// `Init -> Running -> (Stopped | Completed | Failed)`.
async fn drive<S, Sc>(
    scenario_name: &'static str,
    mut scenario: Sc,
    mut ctx: WorkerContext<S>,
    operations: Arc<AtomicU64>,
) -> WorkerExit
where
    S: StoreClient + Clone + 'static,
    Sc: Scenario<S> + 'static,
{
    let worker_id = ctx.worker_id();
    metrics::counter!("scenario_workers_started_total", "scenario" => scenario_name).increment(1);

    // Leaving `Init`.
    let mut failure = None;
    let mut state = match ctx.register_user().await {
        Ok(()) => WorkerState::Running,
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "worker could not register its user");
            failure = Some(WorkerFailure::new(Some(worker_id), &e));
            WorkerState::Failed
        }
    };

    while !state.is_terminal() {
        if ctx.is_cancelled() {
            state = WorkerState::Stopped;
            break;
        }

        operations.fetch_add(1, Ordering::Relaxed);
        match scenario.step(&mut ctx).await {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::Completed) => state = WorkerState::Completed,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "worker failed");
                failure = Some(WorkerFailure::new(Some(worker_id), &e));
                state = WorkerState::Failed;
            }
        }
    }

    tracing::debug!(worker_id, %state, "worker finished");
    WorkerExit {
        worker_id,
        state,
        failure,
    }
}
