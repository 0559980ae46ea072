//! Scenario reports.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::{Anomaly, AnomalyKind, HarnessError};

/// A worker that ended with an error instead of completing or stopping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerFailure {
    /// `None` when the failure happened in the run's prepare or verify phase.
    pub worker_id: Option<usize>,
    pub error: String,
    pub connectivity: bool,
}

impl WorkerFailure {
    pub fn new(worker_id: Option<usize>, error: &HarnessError) -> Self {
        Self {
            worker_id,
            error: error.to_string(),
            connectivity: error.is_connectivity(),
        }
    }

    /// A worker task that panicked.
    pub fn panicked(worker_id: usize) -> Self {
        Self {
            worker_id: Some(worker_id),
            error: "worker panicked".to_string(),
            connectivity: false,
        }
    }
}

/// Merged result of every worker in a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub workers: usize,
    /// Scenario steps started across all workers.
    pub operations: u64,
    pub elapsed: Duration,
    pub anomalies: Vec<Anomaly>,
    pub failures: Vec<WorkerFailure>,
    /// Workers aborted after outliving the grace period.
    pub forced_terminations: usize,
}

impl ScenarioReport {
    pub fn new(scenario: impl Into<String>, workers: usize) -> Self {
        Self {
            scenario: scenario.into(),
            workers,
            ..Default::default()
        }
    }

    /// Anomaly counts per kind. Every kind is present, zero or not.
    pub fn summary(&self) -> BTreeMap<AnomalyKind, usize> {
        let mut summary: BTreeMap<AnomalyKind, usize> =
            AnomalyKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        for anomaly in &self.anomalies {
            *summary.entry(anomaly.kind).or_default() += 1;
        }
        summary
    }

    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.anomalies.iter().filter(|a| a.kind == kind).count()
    }

    /// Anomalies per operation; zero for a run without operations.
    pub fn anomaly_rate(&self) -> f64 {
        if self.operations == 0 {
            return 0.0;
        }
        self.anomalies.len() as f64 / self.operations as f64
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.failures.is_empty()
    }
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "scenario {}: {} workers, {} operations in {:.2?}",
            self.scenario, self.workers, self.operations, self.elapsed
        )?;
        writeln!(
            f,
            "anomalies: {} (rate {:.4})",
            self.anomalies.len(),
            self.anomaly_rate()
        )?;
        for (kind, count) in self.summary() {
            writeln!(f, "  {kind}: {count}")?;
        }
        writeln!(f, "failures: {}", self.failures.len())?;
        for failure in &self.failures {
            match failure.worker_id {
                Some(id) => writeln!(f, "  worker {id}: {}", failure.error)?,
                None => writeln!(f, "  run: {}", failure.error)?,
            }
        }
        write!(f, "forced terminations: {}", self.forced_terminations)
    }
}
