//! Stress runner wiring: configuration and scenario dispatch.
//!
//! Everything here is constructed once from [`Config`] and passed down
//! explicitly; the library crates hold no global state.

pub mod config;

use std::future::Future;
use std::sync::Arc;

use catalog::ViewCatalog;
use harness::{
    BulkInsertWorkload, CreateDeleteWorkload, LikeRaceWorkload, MixedWorkload, ScenarioEnv,
    ScenarioReport, ScenarioRunner, SharedKeyWorkload, Workload,
};
use store::{InMemoryStoreClient, ReplicationConfig, StoreClient};

pub use config::{Config, ConfigError, ReportFormat, ScenarioKind, StoreBackend};

/// Builds the in-memory replicated store described by `config`.
pub fn memory_store(config: &Config) -> InMemoryStoreClient {
    InMemoryStoreClient::with_config(
        ReplicationConfig::new(config.replicas).with_propagation_lag(config.replication_lag),
    )
}

/// Runs the configured scenario against `store`.
///
/// With `DURATION_SECS` set, or for the unbounded mixed scenario, workers are
/// stopped when the duration elapses or `shutdown` resolves, whichever comes
/// first. Otherwise every worker runs to completion.
pub async fn run_scenario<S, F>(store: S, config: &Config, shutdown: F) -> ScenarioReport
where
    S: StoreClient + Clone + 'static,
    F: Future<Output = ()>,
{
    let env = ScenarioEnv::new(store, Arc::new(ViewCatalog::standard()), config.policy);
    let runner = ScenarioRunner::new(env).with_grace_period(config.grace_period);

    match config.scenario {
        ScenarioKind::BulkInsert => {
            execute(&runner, BulkInsertWorkload::default(), config, shutdown).await
        }
        ScenarioKind::SharedKey => {
            execute(&runner, SharedKeyWorkload::default(), config, shutdown).await
        }
        ScenarioKind::LikeRace => {
            execute(&runner, LikeRaceWorkload::default(), config, shutdown).await
        }
        ScenarioKind::CreateDelete => {
            execute(&runner, CreateDeleteWorkload::default(), config, shutdown).await
        }
        ScenarioKind::Mixed => execute(&runner, MixedWorkload::default(), config, shutdown).await,
    }
}

async fn execute<S, W, F>(
    runner: &ScenarioRunner<S>,
    workload: W,
    config: &Config,
    shutdown: F,
) -> ScenarioReport
where
    S: StoreClient + Clone + 'static,
    W: Workload<S>,
    F: Future<Output = ()>,
{
    tracing::info!(
        scenario = workload.name(),
        workers = config.workers,
        duration_secs = config.duration.map(|d| d.as_secs()),
        "starting scenario"
    );

    match config.duration {
        Some(duration) => {
            let stop = async {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {}
                    () = shutdown => tracing::info!("shutdown requested, stopping early"),
                }
            };
            runner.run_until(workload, config.workers, stop).await
        }
        None if config.scenario == ScenarioKind::Mixed => {
            runner.run_until(workload, config.workers, shutdown).await
        }
        None => runner.run_fixed(workload, config.workers).await,
    }
}
