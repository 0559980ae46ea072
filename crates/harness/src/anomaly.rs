//! Anomaly records and the checks that produce them.

use catalog::Entity;
use chrono::{DateTime, Utc};
use common::EntityId;
use serde::Serialize;

/// Class of divergence between expected and observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A read right after a write did not see the expected number of rows.
    CountMismatch,
    /// An entity is still visible in a view after a successful delete.
    DeletionVisible,
    /// A counter disagrees with the membership rows it summarizes.
    CounterDrift,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 3] = [
        AnomalyKind::CountMismatch,
        AnomalyKind::DeletionVisible,
        AnomalyKind::CounterDrift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::CountMismatch => "count_mismatch",
            AnomalyKind::DeletionVisible => "deletion_visible",
            AnomalyKind::CounterDrift => "counter_drift",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected divergence. Anomalies are data: detecting one never stops a
/// worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub entity_id: EntityId,
    pub expected: i64,
    pub observed: i64,
    /// Worker that observed it; `None` for run-wide post-condition checks.
    pub worker_id: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {}: expected {}, observed {}",
            self.kind, self.entity_id, self.expected, self.observed
        )?;
        if let Some(worker_id) = self.worker_id {
            write!(f, " (worker {worker_id})")?;
        }
        Ok(())
    }
}

/// Compares expected post-conditions against observed reads.
///
/// Holds no state beyond the id stamped on the anomalies it produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector {
    worker_id: Option<usize>,
}

impl AnomalyDetector {
    /// A detector for run-wide checks.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_worker(worker_id: usize) -> Self {
        Self {
            worker_id: Some(worker_id),
        }
    }

    pub fn worker_id(&self) -> Option<usize> {
        self.worker_id
    }

    /// Flags a read whose length differs from the count the caller just
    /// established by its own writes.
    pub fn check_count_match(
        &self,
        entity_id: EntityId,
        expected: usize,
        observed: usize,
    ) -> Option<Anomaly> {
        (expected != observed).then(|| {
            self.anomaly(
                AnomalyKind::CountMismatch,
                entity_id,
                to_i64(expected),
                to_i64(observed),
            )
        })
    }

    /// Flags a deleted entity that still appears in `observed`.
    pub fn check_deletion_visible(
        &self,
        entity_id: EntityId,
        observed: &[Entity],
    ) -> Option<Anomaly> {
        let visible = observed.iter().filter(|e| e.id == entity_id).count();
        (visible > 0)
            .then(|| self.anomaly(AnomalyKind::DeletionVisible, entity_id, 0, to_i64(visible)))
    }

    /// Flags a counter whose value differs from its membership count.
    pub fn check_counter_drift(
        &self,
        entity_id: EntityId,
        counter_value: i64,
        membership_count: usize,
    ) -> Option<Anomaly> {
        let members = to_i64(membership_count);
        (counter_value != members).then(|| {
            self.anomaly(
                AnomalyKind::CounterDrift,
                entity_id,
                members,
                counter_value,
            )
        })
    }

    fn anomaly(
        &self,
        kind: AnomalyKind,
        entity_id: EntityId,
        expected: i64,
        observed: i64,
    ) -> Anomaly {
        Anomaly {
            kind,
            entity_id,
            expected,
            observed,
            worker_id: self.worker_id,
            timestamp: Utc::now(),
        }
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
