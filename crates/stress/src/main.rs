//! Stress runner entry point.

use std::process::ExitCode;

use harness::ScenarioReport;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::PostgresStoreClient;
use stress::{Config, ReportFormat, StoreBackend};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, stopping workers");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, stopping workers");
        }
    }
}

fn print_report(report: &ScenarioReport, format: ReportFormat, metrics: &PrometheusHandle) {
    match format {
        ReportFormat::Text => {
            println!("{report}");
            for anomaly in &report.anomalies {
                println!("  {anomaly}");
            }
            println!();
            println!("{}", metrics.render());
        }
        ReportFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "failed to encode report"),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Build the store and run the scenario
    let report = match config.backend {
        StoreBackend::Memory => {
            tracing::info!(
                replicas = config.replicas,
                lag_ms = config.replication_lag.as_millis() as u64,
                "using in-memory replicated store"
            );
            stress::run_scenario(stress::memory_store(&config), &config, shutdown_signal()).await
        }
        StoreBackend::Postgres => {
            let Some(url) = config.database_url.as_deref() else {
                eprintln!("DATABASE_URL is required for the postgres backend");
                return ExitCode::FAILURE;
            };
            let pool = PgPoolOptions::new()
                .max_connections(u32::try_from(config.workers.max(5)).unwrap_or(u32::MAX))
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStoreClient::new(pool, config.namespace.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!(namespace = %config.namespace, "using postgres store");
            stress::run_scenario(store, &config, shutdown_signal()).await
        }
    };

    // 5. Print the report
    print_report(&report, config.report_format, &metrics_handle);

    if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
