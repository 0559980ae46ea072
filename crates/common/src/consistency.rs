//! Per-operation consistency levels.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Replica-acknowledgment threshold requested for a single store operation.
///
/// The harness never inspects replica topology; it only passes the requested
/// level through to the store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// A single replica acknowledges.
    One,

    /// A majority of replicas acknowledge.
    #[default]
    Quorum,

    /// Every replica acknowledges.
    All,
}

impl Consistency {
    /// Number of replicas that must take part out of `replicas`.
    pub fn required(&self, replicas: usize) -> usize {
        match self {
            Consistency::One => replicas.min(1),
            Consistency::Quorum => replicas / 2 + 1,
            Consistency::All => replicas,
        }
    }

    /// Returns the level name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::One => "one",
            Consistency::Quorum => "quorum",
            Consistency::All => "all",
        }
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a consistency level name is not recognized.
#[derive(Debug, Clone, Error)]
#[error("Unknown consistency level: {0}")]
pub struct ParseConsistencyError(String);

impl FromStr for Consistency {
    type Err = ParseConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" | "single" | "single-replica" => Ok(Consistency::One),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            other => Err(ParseConsistencyError(other.to_string())),
        }
    }
}
