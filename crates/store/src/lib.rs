//! Capability interface to the replicated store backing every view.
//!
//! - [`StoreClient`] is the only way the rest of the system touches storage
//! - [`InMemoryStoreClient`] simulates a replicated store with tunable lag and faults
//! - [`PostgresStoreClient`] persists rows to a single PostgreSQL node

pub mod client;
pub mod error;
pub mod faults;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod row;

pub use client::{StoreClient, StoreClientExt};
pub use common::{Consistency, EntityId};
pub use error::{Result, StoreError};
pub use faults::FaultInjector;
pub use memory::{InMemoryStoreClient, ReplicationConfig};
pub use postgres::PostgresStoreClient;
pub use query::RowQuery;
pub use row::{ClusteringKey, ClusteringOrder, StoredRow, ViewKey};
