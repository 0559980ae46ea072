//! Concurrent scenario harness for the fan-out coordinator.
//!
//! A [`Workload`] describes one run: it prepares shared fixtures, builds one
//! [`Scenario`] per worker and checks run-wide post-conditions afterwards.
//! The [`ScenarioRunner`] owns scheduling and cancellation; scenarios own only
//! their per-step logic and report divergences through the
//! [`AnomalyDetector`].

pub mod anomaly;
pub mod context;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod scenarios;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyKind};
pub use context::{ScenarioEnv, WorkerContext};
pub use error::{HarnessError, Result};
pub use report::{ScenarioReport, WorkerFailure};
pub use runner::{DEFAULT_GRACE_PERIOD, ScenarioRunner};
pub use scenario::{Scenario, StepOutcome, WorkerState, Workload};
pub use scenarios::{
    BulkInsertWorkload, CreateDeleteWorkload, LikeRaceWorkload, MixedWorkload, SharedKeyWorkload,
};
