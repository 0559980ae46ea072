//! The scenario variants.

pub mod bulk_insert;
pub mod create_delete;
pub mod like_race;
pub mod mixed;
pub mod shared_key;

pub use bulk_insert::{BulkInsertScenario, BulkInsertWorkload};
pub use create_delete::{CreateDeleteScenario, CreateDeleteWorkload};
pub use like_race::{LikeRaceScenario, LikeRaceWorkload};
pub use mixed::{MixedScenario, MixedWorkload};
pub use shared_key::{SharedKeyScenario, SharedKeyWorkload};
