//! Runs one supervised windowed-copy task per hot/cold table pair.
//!
//! Grounded on `cooprefr-bettersys`'s `route_quality_monitor` binary for
//! the clap + tracing_subscriber + axum::serve wiring; each table's loop
//! follows `marketprism-supervisor`'s `Supervisor::run_task` contract, with
//! `Replicator::tick`'s own bounded retry handling transient copy failures
//! before the supervisor's back-off takes over.

use clap::Parser;
use marketprism_config::{ClickHouseConfig, MarketPrismConfig};
use marketprism_health::{build_router, HealthRegistry, ReadinessCheck};
use marketprism_storage_cold::{ClickHouseReplicationState, Replicator, ALL_TABLES};
use marketprism_supervisor::{listen_for_shutdown, Supervisor, TaskError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// How often a table's task checks whether the next window has cleared
/// the safety lag. Independent of the window width itself.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// `Replicator::tick`'s own bounded retry count for a single window before
/// giving up and letting the supervisor back off the whole task.
const MAX_COPY_ATTEMPTS: u32 = 3;

/// `/ready` reports false once either side of the replication path stops
/// answering.
struct ClickHouseReadiness {
    name: &'static str,
    client: clickhouse::Client,
}

#[async_trait::async_trait]
impl ReadinessCheck for ClickHouseReadiness {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self) -> bool {
        self.client.query("SELECT 1").execute().await.is_ok()
    }
}

#[derive(Parser, Debug)]
#[command(name = "marketprism-cold-replicator")]
#[command(about = "Copies aged rows from hot to cold ClickHouse on a tumbling window")]
struct Args {
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[arg(long, default_value_t = 8082)]
    health_port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match MarketPrismConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let hot_client = clickhouse_client(&config.clickhouse, &config.clickhouse.database);
    let cold_database = cold_database_name(&config.clickhouse.database);
    let cold_client = clickhouse_client(&config.clickhouse, &cold_database);

    if let Err(e) = hot_client.query("SELECT 1").execute().await {
        error!(error = %e, "cannot reach hot clickhouse at startup");
        std::process::exit(4);
    }
    if let Err(e) = cold_client.query("SELECT 1").execute().await {
        error!(error = %e, "cannot reach cold clickhouse at startup");
        std::process::exit(4);
    }

    let readiness: Vec<Arc<dyn ReadinessCheck>> = vec![
        Arc::new(ClickHouseReadiness { name: "clickhouse_hot", client: hot_client.clone() }),
        Arc::new(ClickHouseReadiness { name: "clickhouse_cold", client: cold_client.clone() }),
    ];

    let state = Arc::new(ClickHouseReplicationState::new(cold_client.clone()));
    let replicator = Arc::new(Replicator::new(
        hot_client,
        cold_client,
        config.clickhouse.database.clone(),
        cold_database,
        state,
        config.replicator.delete_after_copy,
    ));

    let prometheus = PrometheusBuilder::new().build_recorder().handle();
    let registry = Arc::new(HealthRegistry::new());
    let shutdown_rx = listen_for_shutdown();

    let router = build_router(registry.clone(), readiness, prometheus);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.health_port));
    let health_server = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "failed to bind health endpoint");
                return;
            }
        };
        info!(%addr, "health endpoint listening");
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "health server exited");
        }
    });

    let mut tasks = Vec::new();
    for &table in ALL_TABLES {
        let task_name = format!("replicate-{table}");
        registry.register(task_name.clone());

        tasks.push(spawn_supervised_table(
            table,
            replicator.clone(),
            task_name,
            registry.clone(),
            shutdown_rx.clone(),
        ));
    }

    for task in tasks {
        let _ = task.await;
    }

    health_server.abort();
    info!("cold replicator shut down cleanly");
}

fn spawn_supervised_table(
    table: &'static str,
    replicator: Arc<Replicator>,
    task_name: String,
    registry: Arc<HealthRegistry>,
    shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let supervisor = Supervisor::new("cold-replicator");
        let log_name = task_name.clone();

        let result = supervisor
            .run_task(
                &log_name,
                {
                    let replicator = replicator.clone();
                    let task_name = task_name.clone();
                    let registry = registry.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    move || {
                        let replicator = replicator.clone();
                        let task_name = task_name.clone();
                        let registry = registry.clone();
                        let mut shutdown = shutdown_rx.clone();
                        async move {
                            let mut ticker = tokio::time::interval(POLL_INTERVAL);
                            loop {
                                tokio::select! {
                                    _ = shutdown.changed() => return Ok(()),
                                    _ = ticker.tick() => {
                                        match replicator.tick(table, chrono::Utc::now(), MAX_COPY_ATTEMPTS).await {
                                            Ok(_) => registry.heartbeat(task_name.clone()),
                                            Err(e) => return Err(TaskError::Retryable(e.to_string())),
                                        }
                                    }
                                }
                            }
                        }
                    }
                },
                shutdown_rx,
            )
            .await;

        if let Err(exit_code) = result {
            error!(table, exit_code, "replication task exited fatally");
            std::process::exit(exit_code);
        }
    })
}

fn clickhouse_client(config: &ClickHouseConfig, database: &str) -> clickhouse::Client {
    clickhouse::Client::default()
        .with_url(format!("http://{}:{}", config.host, config.port_http))
        .with_database(database)
}

/// Hot and cold tables live in two databases on the same ClickHouse
/// cluster, per `spec.md` §3's `marketprism_hot`/`marketprism_cold`
/// naming. `ReplicatorConfig` carries no separate connection details, so
/// the cold database name is derived from the configured hot one.
fn cold_database_name(hot_database: &str) -> String {
    match hot_database.strip_suffix("_hot") {
        Some(prefix) => format!("{prefix}_cold"),
        None => format!("{hot_database}_cold"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_database_name_swaps_the_hot_suffix() {
        assert_eq!(cold_database_name("marketprism_hot"), "marketprism_cold");
    }

    #[test]
    fn cold_database_name_appends_when_no_hot_suffix_present() {
        assert_eq!(cold_database_name("marketprism"), "marketprism_cold");
    }
}
