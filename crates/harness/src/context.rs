//! What a worker is handed: the coordinator, counters, consistency policy and
//! somewhere to put anomalies.

use std::sync::Arc;
use std::time::Duration;

use catalog::{Entity, ViewCatalog};
use common::ActorId;
use coordinator::{ConsistencyPolicy, CounterAggregate, FanoutCoordinator};
use store::{StoreClient, ViewKey};
use tokio::sync::{mpsc, watch};

use crate::{Anomaly, AnomalyDetector, Result};

/// Dependencies shared by every worker of a run, built once at startup.
pub struct ScenarioEnv<S: StoreClient> {
    coordinator: FanoutCoordinator<S>,
    counters: CounterAggregate<S>,
    policy: ConsistencyPolicy,
}

impl<S> Clone for ScenarioEnv<S>
where
    S: StoreClient + Clone,
{
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            counters: self.counters.clone(),
            policy: self.policy,
        }
    }
}

impl<S> ScenarioEnv<S>
where
    S: StoreClient + Clone,
{
    pub fn new(store: S, catalog: Arc<ViewCatalog>, policy: ConsistencyPolicy) -> Self {
        Self {
            coordinator: FanoutCoordinator::new(store.clone(), Arc::clone(&catalog)),
            counters: CounterAggregate::new(store, catalog),
            policy,
        }
    }

    pub fn coordinator(&self) -> &FanoutCoordinator<S> {
        &self.coordinator
    }

    pub fn counters(&self) -> &CounterAggregate<S> {
        &self.counters
    }

    pub fn policy(&self) -> ConsistencyPolicy {
        self.policy
    }

    pub fn catalog(&self) -> &ViewCatalog {
        self.coordinator.catalog()
    }

    /// Partition of the named view holding rows keyed by `value`.
    pub fn view_key(&self, view: &str, value: impl ToString) -> Result<ViewKey> {
        Ok(self.catalog().view(view)?.1.key_for(value))
    }
}

/// Per-worker handle passed to every [`Scenario::step`](crate::Scenario::step).
pub struct WorkerContext<S: StoreClient> {
    worker_id: usize,
    actor: ActorId,
    env: ScenarioEnv<S>,
    detector: AnomalyDetector,
    sink: mpsc::UnboundedSender<Anomaly>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<S> WorkerContext<S>
where
    S: StoreClient + Clone,
{
    pub(crate) fn new(
        worker_id: usize,
        env: ScenarioEnv<S>,
        sink: mpsc::UnboundedSender<Anomaly>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Self {
        Self {
            worker_id,
            actor: ActorId::new(),
            env,
            detector: AnomalyDetector::for_worker(worker_id),
            sink,
            cancel,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The simulated user this worker acts as.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn env(&self) -> &ScenarioEnv<S> {
        &self.env
    }

    pub fn coordinator(&self) -> &FanoutCoordinator<S> {
        self.env.coordinator()
    }

    pub fn counters(&self) -> &CounterAggregate<S> {
        self.env.counters()
    }

    pub fn policy(&self) -> ConsistencyPolicy {
        self.env.policy()
    }

    pub fn detector(&self) -> AnomalyDetector {
        self.detector
    }

    /// Writes the record of the user this worker acts as.
    pub(crate) async fn register_user(&self) -> Result<()> {
        let user = Entity::user(self.actor, format!("Name{}", self.worker_id));
        self.coordinator().create(&user, self.policy().write).await?;
        Ok(())
    }

    /// Records the result of a check. Returns true if it was an anomaly.
    pub fn record(&self, check: Option<Anomaly>) -> bool {
        let Some(anomaly) = check else {
            return false;
        };
        record_anomaly(&anomaly);
        // The runner keeps the receiver until every worker has been joined.
        let _ = self.sink.send(anomaly);
        true
    }

    /// Whether the runner has asked workers to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleeps for `duration`, returning early if cancellation is signalled.
    pub async fn pause(&mut self, duration: Duration) {
        match self.cancel.as_mut() {
            Some(rx) => {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {}
                    _ = rx.wait_for(|cancelled| *cancelled) => {}
                }
            }
            None => tokio::time::sleep(duration).await,
        }
    }
}

pub(crate) fn record_anomaly(anomaly: &Anomaly) {
    metrics::counter!("anomalies_detected_total", "kind" => anomaly.kind.as_str()).increment(1);
    tracing::warn!(
        kind = %anomaly.kind,
        entity_id = %anomaly.entity_id,
        expected = anomaly.expected,
        observed = anomaly.observed,
        worker_id = anomaly.worker_id,
        "anomaly detected"
    );
}
