use common::Consistency;
use serde::{Deserialize, Serialize};

/// Default consistency level per operation kind.
///
/// The coordinator always takes an explicit level per call; this policy is
/// what scenarios consult when choosing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyPolicy {
    /// Level for create, edit and delete fan-outs and membership writes.
    pub write: Consistency,
    /// Level for view reads and membership checks.
    pub read: Consistency,
    /// Level for counter deltas and counter reads.
    pub counter: Consistency,
}

impl ConsistencyPolicy {
    /// The same level for every operation kind.
    pub fn uniform(consistency: Consistency) -> Self {
        Self {
            write: consistency,
            read: consistency,
            counter: consistency,
        }
    }
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self::uniform(Consistency::Quorum)
    }
}
