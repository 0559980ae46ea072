//! Run configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use common::Consistency;
use coordinator::ConsistencyPolicy;
use thiserror::Error;

/// A variable was set to a value that does not parse.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {var}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Which `StoreClient` implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            _ => Err(()),
        }
    }
}

/// Which scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScenarioKind {
    #[default]
    BulkInsert,
    SharedKey,
    LikeRace,
    CreateDelete,
    Mixed,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::BulkInsert => "bulk-insert",
            ScenarioKind::SharedKey => "shared-key",
            ScenarioKind::LikeRace => "like-race",
            ScenarioKind::CreateDelete => "create-delete",
            ScenarioKind::Mixed => "mixed",
        }
    }
}

impl FromStr for ScenarioKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bulk-insert" | "1" => Ok(ScenarioKind::BulkInsert),
            "shared-key" | "2" => Ok(ScenarioKind::SharedKey),
            "like-race" | "3" => Ok(ScenarioKind::LikeRace),
            "create-delete" | "4" => Ok(ScenarioKind::CreateDelete),
            "mixed" | "5" => Ok(ScenarioKind::Mixed),
            _ => Err(()),
        }
    }
}

/// How the final report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(()),
        }
    }
}

/// Stress run configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `STORE_BACKEND`: `memory` or `postgres` (default: `memory`)
/// - `DATABASE_URL`: required for the `postgres` backend
/// - `STORE_NAMESPACE`: namespace isolating this run's rows (default: `"cassdemo"`)
/// - `REPLICAS`: in-memory replica count (default: `3`)
/// - `REPLICATION_LAG_MS`: in-memory propagation lag (default: `0`)
/// - `WRITE_CONSISTENCY`, `READ_CONSISTENCY`, `COUNTER_CONSISTENCY`:
///   `one`, `quorum` or `all` (default: `quorum`)
/// - `SCENARIO`: `bulk-insert`, `shared-key`, `like-race`, `create-delete`
///   or `mixed`, or its number 1-5 (default: `bulk-insert`)
/// - `WORKERS`: concurrent workers (default: `10`)
/// - `DURATION_SECS`: stop after this long; unset runs to completion
/// - `GRACE_PERIOD_MS`: time stopped workers get before abort (default: `800`)
/// - `REPORT_FORMAT`: `text` or `json` (default: `text`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub namespace: String,
    pub replicas: usize,
    pub replication_lag: Duration,
    pub policy: ConsistencyPolicy,
    pub scenario: ScenarioKind,
    pub workers: usize,
    pub duration: Option<Duration>,
    pub grace_period: Duration,
    pub report_format: ReportFormat,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// variables it does not know.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let consistency = |var: &'static str, default: Consistency| {
            parse_or(&lookup, var, default, |v| v.parse::<Consistency>().ok())
        };

        Ok(Self {
            backend: parse_or(&lookup, "STORE_BACKEND", defaults.backend, |v| v.parse().ok())?,
            database_url: lookup("DATABASE_URL"),
            namespace: lookup("STORE_NAMESPACE").unwrap_or(defaults.namespace),
            replicas: parse_or(&lookup, "REPLICAS", defaults.replicas, |v| {
                v.parse().ok().filter(|n| *n > 0)
            })?,
            replication_lag: parse_or(&lookup, "REPLICATION_LAG_MS", defaults.replication_lag, |v| {
                v.parse().ok().map(Duration::from_millis)
            })?,
            policy: ConsistencyPolicy {
                write: consistency("WRITE_CONSISTENCY", defaults.policy.write)?,
                read: consistency("READ_CONSISTENCY", defaults.policy.read)?,
                counter: consistency("COUNTER_CONSISTENCY", defaults.policy.counter)?,
            },
            scenario: parse_or(&lookup, "SCENARIO", defaults.scenario, |v| v.parse().ok())?,
            workers: parse_or(&lookup, "WORKERS", defaults.workers, |v| {
                v.parse().ok().filter(|n| *n > 0)
            })?,
            duration: parse_or(&lookup, "DURATION_SECS", defaults.duration, |v| {
                v.parse().ok().map(|secs| Some(Duration::from_secs(secs)))
            })?,
            grace_period: parse_or(&lookup, "GRACE_PERIOD_MS", defaults.grace_period, |v| {
                v.parse().ok().map(Duration::from_millis)
            })?,
            report_format: parse_or(&lookup, "REPORT_FORMAT", defaults.report_format, |v| {
                v.parse().ok()
            })?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => parse(value.trim()).ok_or(ConfigError { var, value }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            namespace: "cassdemo".to_string(),
            replicas: 3,
            replication_lag: Duration::ZERO,
            policy: ConsistencyPolicy::default(),
            scenario: ScenarioKind::BulkInsert,
            workers: 10,
            duration: None,
            grace_period: Duration::from_millis(800),
            report_format: ReportFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.namespace, "cassdemo");
        assert_eq!(config.replicas, 3);
        assert_eq!(config.policy, ConsistencyPolicy::uniform(Consistency::Quorum));
        assert_eq!(config.scenario, ScenarioKind::BulkInsert);
        assert_eq!(config.workers, 10);
        assert_eq!(config.duration, None);
        assert_eq!(config.grace_period, Duration::from_millis(800));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.workers, 10);
        assert_eq!(config.scenario, ScenarioKind::BulkInsert);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/test"),
            ("REPLICATION_LAG_MS", "250"),
            ("READ_CONSISTENCY", "one"),
            ("COUNTER_CONSISTENCY", "ALL"),
            ("SCENARIO", "5"),
            ("WORKERS", "50"),
            ("DURATION_SECS", "10"),
            ("REPORT_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.backend, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/test"));
        assert_eq!(config.replication_lag, Duration::from_millis(250));
        assert_eq!(config.policy.write, Consistency::Quorum);
        assert_eq!(config.policy.read, Consistency::One);
        assert_eq!(config.policy.counter, Consistency::All);
        assert_eq!(config.scenario, ScenarioKind::Mixed);
        assert_eq!(config.workers, 50);
        assert_eq!(config.duration, Some(Duration::from_secs(10)));
        assert_eq!(config.report_format, ReportFormat::Json);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = Config::from_lookup(lookup(&[("WORKERS", "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError {
                var: "WORKERS",
                value: "0".to_string()
            }
        );
        assert_eq!(err.to_string(), "invalid value \"0\" for WORKERS");
    }

    #[test]
    fn test_unknown_scenario_is_rejected() {
        assert!(Config::from_lookup(lookup(&[("SCENARIO", "sixth")])).is_err());
    }

    #[test]
    fn test_scenario_names_round_trip() {
        for kind in [
            ScenarioKind::BulkInsert,
            ScenarioKind::SharedKey,
            ScenarioKind::LikeRace,
            ScenarioKind::CreateDelete,
            ScenarioKind::Mixed,
        ] {
            assert_eq!(kind.as_str().parse::<ScenarioKind>(), Ok(kind));
        }
    }
}
