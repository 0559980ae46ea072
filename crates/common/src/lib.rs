//! Shared types for the denormalized store harness.

pub mod consistency;
pub mod types;

pub use consistency::{Consistency, ParseConsistencyError};
pub use types::{ActorId, EntityId};
