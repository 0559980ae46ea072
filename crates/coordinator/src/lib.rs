//! Best-effort multi-view writes over a store without multi-key atomicity.
//!
//! - [`FanoutCoordinator`] creates, edits and deletes an entity in every view
//!   of its group, reporting partial failures instead of hiding them
//! - [`CounterAggregate`] maintains membership rows and the counters that
//!   summarize them as two independent writes
//! - [`ViewSequence`] is a restartable read of one view partition

pub mod counter;
pub mod error;
pub mod fanout;
pub mod outcome;
pub mod policy;
pub mod sequence;

pub use counter::{CounterAggregate, CounterChange};
pub use error::{CoordinatorError, Result};
pub use fanout::FanoutCoordinator;
pub use outcome::{FanoutOperation, FanoutOutcome, FanoutStatus, ViewFailure};
pub use policy::ConsistencyPolicy;
pub use sequence::{EntityStream, ViewSequence};
