use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Consistency, EntityId};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    ClusteringKey, FaultInjector, Result, RowQuery, StoreError, StoredRow, ViewKey,
    client::StoreClient,
};

/// Shape of the simulated cluster.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Number of replicas holding every key.
    pub replicas: usize,

    /// Delay before a write reaches the replicas that did not acknowledge it.
    /// Zero means every live replica applies the write synchronously.
    pub propagation_lag: Duration,

    /// Simulated network latency paid by every operation.
    pub operation_latency: Duration,
}

impl ReplicationConfig {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            ..Default::default()
        }
    }

    pub fn with_propagation_lag(mut self, lag: Duration) -> Self {
        self.propagation_lag = lag;
        self
    }

    pub fn with_operation_latency(mut self, latency: Duration) -> Self {
        self.operation_latency = latency;
        self
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replicas: 3,
            propagation_lag: Duration::ZERO,
            operation_latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Live {
        payload: serde_json::Value,
        written_at: u64,
    },
    Tombstone {
        written_at: u64,
    },
}

impl Cell {
    fn written_at(&self) -> u64 {
        match self {
            Cell::Live { written_at, .. } | Cell::Tombstone { written_at } => *written_at,
        }
    }
}

/// Counter state on one replica: every delta is kept under its own id so that
/// replicas merge by union instead of double counting.
#[derive(Debug, Clone, Default)]
struct CounterCell {
    deltas: HashMap<u64, (i64, u64)>,
    cleared_at: u64,
}

impl CounterCell {
    fn merge(&mut self, other: &CounterCell) {
        for (id, delta) in &other.deltas {
            self.deltas.entry(*id).or_insert(*delta);
        }
        self.cleared_at = self.cleared_at.max(other.cleared_at);
    }

    fn value(&self) -> i64 {
        self.deltas
            .values()
            .filter(|(_, written_at)| *written_at > self.cleared_at)
            .map(|(delta, _)| delta)
            .sum()
    }
}

#[derive(Debug, Clone)]
enum Mutation {
    Row {
        key: ViewKey,
        clustering: ClusteringKey,
        cell: Cell,
    },
    CounterDelta {
        counter: EntityId,
        delta_id: u64,
        delta: i64,
        written_at: u64,
    },
    CounterClear {
        counter: EntityId,
        written_at: u64,
    },
}

#[derive(Debug, Default)]
struct Replica {
    partitions: HashMap<ViewKey, BTreeMap<ClusteringKey, Cell>>,
    counters: HashMap<EntityId, CounterCell>,
}

impl Replica {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Row {
                key,
                clustering,
                cell,
            } => {
                let partition = self.partitions.entry(key.clone()).or_default();
                // Last write wins, tombstones included.
                match partition.get(clustering) {
                    Some(existing) if existing.written_at() > cell.written_at() => {}
                    _ => {
                        partition.insert(*clustering, cell.clone());
                    }
                }
            }
            Mutation::CounterDelta {
                counter,
                delta_id,
                delta,
                written_at,
            } => {
                self.counters
                    .entry(*counter)
                    .or_default()
                    .deltas
                    .insert(*delta_id, (*delta, *written_at));
            }
            Mutation::CounterClear {
                counter,
                written_at,
            } => {
                let cell = self.counters.entry(*counter).or_default();
                cell.cleared_at = cell.cleared_at.max(*written_at);
            }
        }
    }
}

/// A write that has not yet reached one replica.
#[derive(Debug)]
struct Hint {
    replica: usize,
    due: Instant,
    mutation: Mutation,
}

#[derive(Debug)]
struct ClusterState {
    replicas: Vec<Replica>,
    hints: Vec<Hint>,
}

impl ClusterState {
    fn new(replicas: usize) -> Self {
        Self {
            replicas: (0..replicas).map(|_| Replica::default()).collect(),
            hints: Vec::new(),
        }
    }

    /// Applies every hint that is due and whose replica is up.
    fn deliver_hints(&mut self, now: Option<Instant>, faults: &FaultInjector) {
        let hints = std::mem::take(&mut self.hints);
        for hint in hints {
            let due = now.is_none_or(|now| hint.due <= now);
            if due && !faults.is_down(hint.replica) {
                self.replicas[hint.replica].apply(&hint.mutation);
            } else {
                self.hints.push(hint);
            }
        }
    }
}

/// In-memory replicated store for tests and local stress runs.
///
/// Every key lives on `replicas` replicas. A write at level `L` is applied
/// synchronously to `L.required(replicas)` live replicas picked round-robin and
/// reaches the rest after the configured propagation lag. A read at level `L`
/// consults `L.required(replicas)` live replicas, again round-robin, and merges
/// their answers by write timestamp. Quorum reads therefore always observe
/// quorum writes while single-replica reads can miss them.
#[derive(Debug, Clone)]
pub struct InMemoryStoreClient {
    state: Arc<Mutex<ClusterState>>,
    clock: Arc<AtomicU64>,
    cursor: Arc<AtomicUsize>,
    config: ReplicationConfig,
    faults: FaultInjector,
}

impl InMemoryStoreClient {
    /// Creates a store with three synchronously replicated replicas.
    pub fn new() -> Self {
        Self::with_config(ReplicationConfig::default())
    }

    pub fn with_config(config: ReplicationConfig) -> Self {
        Self::with_faults(config, FaultInjector::new())
    }

    pub fn with_faults(config: ReplicationConfig, faults: FaultInjector) -> Self {
        let replicas = config.replicas.max(1);
        Self {
            state: Arc::new(Mutex::new(ClusterState::new(replicas))),
            clock: Arc::new(AtomicU64::new(0)),
            cursor: Arc::new(AtomicUsize::new(0)),
            config: ReplicationConfig { replicas, ..config },
            faults,
        }
    }

    /// Returns the fault switchboard shared with this store.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Number of writes still waiting to reach some replica.
    pub async fn pending_hints(&self) -> usize {
        self.state.lock().await.hints.len()
    }

    /// Delivers every pending hint to its replica, ignoring the lag.
    pub async fn deliver_all_hints(&self) {
        self.state.lock().await.deliver_hints(None, &self.faults);
    }

    /// Number of live rows the given replica holds for a partition.
    pub async fn replica_partition_len(&self, replica: usize, key: &ViewKey) -> usize {
        let state = self.state.lock().await;
        state
            .replicas
            .get(replica)
            .and_then(|r| r.partitions.get(key))
            .map(|p| {
                p.values()
                    .filter(|c| matches!(c, Cell::Live { .. }))
                    .count()
            })
            .unwrap_or(0)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn simulate_latency(&self) {
        if !self.config.operation_latency.is_zero() {
            tokio::time::sleep(self.config.operation_latency).await;
        }
    }

    /// Picks `required` live replicas starting at the round-robin cursor.
    fn pick_replicas(&self, operation: &'static str, required: usize) -> Result<Vec<usize>> {
        let n = self.config.replicas;
        self.faults.check_available(operation, required, n)?;

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let chosen: Vec<usize> = (0..n)
            .map(|offset| (start + offset) % n)
            .filter(|r| !self.faults.is_down(*r))
            .take(required)
            .collect();

        if chosen.len() < required {
            return Err(StoreError::Unavailable {
                required,
                alive: chosen.len(),
            });
        }
        Ok(chosen)
    }

    async fn write(
        &self,
        operation: &'static str,
        target: &str,
        mutation: Mutation,
        consistency: Consistency,
    ) -> Result<()> {
        self.simulate_latency().await;

        let required = consistency.required(self.config.replicas);
        let chosen = self.pick_replicas(operation, required)?;
        self.faults.check_write(target)?;

        let now = Instant::now();
        let lag = self.config.propagation_lag;
        let mut state = self.state.lock().await;
        state.deliver_hints(Some(now), &self.faults);

        for replica in 0..self.config.replicas {
            let synchronous = chosen.contains(&replica)
                || (lag.is_zero() && !self.faults.is_down(replica));
            if synchronous {
                state.replicas[replica].apply(&mutation);
            } else {
                state.hints.push(Hint {
                    replica,
                    due: now + lag,
                    mutation: mutation.clone(),
                });
            }
        }

        metrics::counter!("store_writes_total", "consistency" => consistency.as_str())
            .increment(1);
        Ok(())
    }
}

impl Default for InMemoryStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for InMemoryStoreClient {
    async fn put(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        payload: serde_json::Value,
        consistency: Consistency,
    ) -> Result<()> {
        let mutation = Mutation::Row {
            key: key.clone(),
            clustering,
            cell: Cell::Live {
                payload,
                written_at: self.tick(),
            },
        };
        self.write("put", &key.view, mutation, consistency).await
    }

    async fn get(
        &self,
        key: &ViewKey,
        query: RowQuery,
        consistency: Consistency,
    ) -> Result<Vec<StoredRow>> {
        self.simulate_latency().await;

        let required = consistency.required(self.config.replicas);
        let chosen = self.pick_replicas("get", required)?;

        let mut merged: BTreeMap<ClusteringKey, Cell> = BTreeMap::new();
        {
            let mut state = self.state.lock().await;
            state.deliver_hints(Some(Instant::now()), &self.faults);

            for replica in chosen {
                let Some(partition) = state.replicas[replica].partitions.get(key) else {
                    continue;
                };
                for (clustering, cell) in partition {
                    if let Some(clustering_filter) = query.clustering
                        && clustering_filter != *clustering
                    {
                        continue;
                    }
                    match merged.get(clustering) {
                        Some(existing) if existing.written_at() >= cell.written_at() => {}
                        _ => {
                            merged.insert(*clustering, cell.clone());
                        }
                    }
                }
            }
        }

        let mut rows: Vec<StoredRow> = merged
            .into_iter()
            .filter_map(|(clustering, cell)| match cell {
                Cell::Live { payload, .. } => Some(StoredRow::new(clustering, payload)),
                Cell::Tombstone { .. } => None,
            })
            .collect();

        query.order.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn delete(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        consistency: Consistency,
    ) -> Result<()> {
        let mutation = Mutation::Row {
            key: key.clone(),
            clustering,
            cell: Cell::Tombstone {
                written_at: self.tick(),
            },
        };
        self.write("delete", &key.view, mutation, consistency).await
    }

    async fn counter_delta(
        &self,
        counter: EntityId,
        delta: i64,
        consistency: Consistency,
    ) -> Result<()> {
        let written_at = self.tick();
        let mutation = Mutation::CounterDelta {
            counter,
            delta_id: written_at,
            delta,
            written_at,
        };
        self.write("counter_delta", "counters", mutation, consistency)
            .await
    }

    async fn read_counter(&self, counter: EntityId, consistency: Consistency) -> Result<i64> {
        self.simulate_latency().await;

        let required = consistency.required(self.config.replicas);
        let chosen = self.pick_replicas("read_counter", required)?;

        let mut state = self.state.lock().await;
        state.deliver_hints(Some(Instant::now()), &self.faults);

        let mut merged = CounterCell::default();
        for replica in chosen {
            if let Some(cell) = state.replicas[replica].counters.get(&counter) {
                merged.merge(cell);
            }
        }
        Ok(merged.value())
    }

    async fn delete_counter(&self, counter: EntityId, consistency: Consistency) -> Result<()> {
        let mutation = Mutation::CounterClear {
            counter,
            written_at: self.tick(),
        };
        self.write("delete_counter", "counters", mutation, consistency)
            .await
    }
}
