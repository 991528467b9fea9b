//! Runs one supervised JetStream consumer per canonical data type,
//! inserting batches into hot-tier ClickHouse, plus a periodic spool
//! drainer that retries batches ClickHouse previously rejected.
//!
//! Grounded on `cooprefr-bettersys`'s `route_quality_monitor` binary for
//! the clap + tracing_subscriber + axum::serve wiring.

use clap::Parser;
use marketprism_config::MarketPrismConfig;
use marketprism_health::{build_router, HealthRegistry, ReadinessCheck};
use marketprism_instrument::DataType;
use marketprism_publisher::streams::{ensure_streams, MARKET_DATA_STREAM, ORDERBOOK_SNAP_STREAM};
use marketprism_storage_hot::spool::SPOOL_DRAIN_INTERVAL;
use marketprism_storage_hot::{consumer, resolve_batch_policy, BatchPolicy, ClickHouseStore, HotStore, Spool};
use marketprism_supervisor::{listen_for_shutdown, Supervisor, TaskError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const ALL_DATA_TYPES: [DataType; 8] = [
    DataType::Trade,
    DataType::Orderbook,
    DataType::FundingRate,
    DataType::OpenInterest,
    DataType::Liquidation,
    DataType::LsrTopPosition,
    DataType::LsrAllAccount,
    DataType::VolatilityIndex,
];

/// Liveness proxy for a consumer task: since `run_consumer` blocks on its
/// own pull/flush loop and exposes no progress hook, heartbeating is a
/// plain ticker rather than being tied to an observed event, same
/// simplification as the collector's idle-connector heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// `/ready` reports false once hot-tier ClickHouse stops answering.
struct ClickHouseReadiness(Arc<ClickHouseStore>);

#[async_trait::async_trait]
impl ReadinessCheck for ClickHouseReadiness {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn check(&self) -> bool {
        self.0.ping().await
    }
}

#[derive(Parser, Debug)]
#[command(name = "marketprism-hot-consumer")]
#[command(about = "Batches canonical records off JetStream into hot-tier ClickHouse")]
struct Args {
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[arg(long, default_value_t = 8081)]
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

    let store = Arc::new(ClickHouseStore::new(
        &config.clickhouse.host,
        config.clickhouse.port_http,
        &config.clickhouse.database,
    ));

    if let Err(e) = store.check_schema().await {
        error!(error = %e, "clickhouse schema mismatch at startup");
        std::process::exit(3);
    }

    let client = match async_nats::connect(config.nats.servers.join(",")).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "cannot reach nats at startup");
            std::process::exit(4);
        }
    };
    let jetstream = async_nats::jetstream::new(client);
    if let Err(e) = ensure_streams(&jetstream).await {
        error!(error = %e, "cannot ensure jetstream streams at startup");
        std::process::exit(4);
    }

    let prometheus = PrometheusBuilder::new().build_recorder().handle();
    let registry = Arc::new(HealthRegistry::new());
    let shutdown_rx = listen_for_shutdown();

    let readiness: Vec<Arc<dyn ReadinessCheck>> = vec![Arc::new(ClickHouseReadiness(store.clone()))];
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

    let drainer = tokio::spawn(drain_spool_periodically(
        store.clone(),
        config.consumer.spool_dir.clone(),
        shutdown_rx.clone(),
    ));

    let mut tasks = Vec::new();
    for data_type in ALL_DATA_TYPES {
        let task_name = format!("consumer-{}", data_type.as_str());
        registry.register(task_name.clone());

        let stream_name = if data_type == DataType::Orderbook {
            ORDERBOOK_SNAP_STREAM
        } else {
            MARKET_DATA_STREAM
        };

        let policy = resolve_batch_policy(data_type, &config.consumer.batch_sizes, &config.consumer.flush_intervals);

        tasks.push(spawn_supervised_consumer(
            data_type,
            stream_name,
            jetstream.clone(),
            store.clone(),
            config.consumer.spool_dir.clone(),
            policy,
            task_name,
            registry.clone(),
            shutdown_rx.clone(),
        ));
    }

    for task in tasks {
        let _ = task.await;
    }

    drainer.abort();
    health_server.abort();
    info!("hot consumer shut down cleanly");
}

fn spawn_supervised_consumer(
    data_type: DataType,
    stream_name: &'static str,
    jetstream: async_nats::jetstream::Context,
    store: Arc<ClickHouseStore>,
    spool_dir: String,
    policy: BatchPolicy,
    task_name: String,
    registry: Arc<HealthRegistry>,
    shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let supervisor = Supervisor::new("hot-consumer");
        let log_name = task_name.clone();

        let result = supervisor
            .run_task(
                &log_name,
                {
                    let jetstream = jetstream.clone();
                    let store = store.clone();
                    let spool_dir = spool_dir.clone();
                    let task_name = task_name.clone();
                    let registry = registry.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    move || {
                        let jetstream = jetstream.clone();
                        let store = store.clone();
                        let spool = Spool::new(spool_dir.clone());
                        let task_name = task_name.clone();
                        let registry = registry.clone();
                        let mut shutdown_watch = shutdown_rx.clone();
                        async move {
                            let pull_consumer =
                                consumer::ensure_consumer(&jetstream, stream_name, data_type)
                                    .await
                                    .map_err(|e| TaskError::Retryable(e.to_string()))?;

                            let (tx, rx) = tokio::sync::oneshot::channel();
                            let forward_shutdown = tokio::spawn(async move {
                                let _ = shutdown_watch.changed().await;
                                let _ = tx.send(());
                            });

                            let heartbeat_registry = registry.clone();
                            let heartbeat_name = task_name.clone();
                            let heartbeat_task = tokio::spawn(async move {
                                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                                loop {
                                    ticker.tick().await;
                                    heartbeat_registry.heartbeat(heartbeat_name.clone());
                                }
                            });

                            consumer::run_consumer(pull_consumer, data_type, store, spool, policy, rx).await;

                            heartbeat_task.abort();
                            let _ = forward_shutdown.await;
                            Ok(())
                        }
                    }
                },
                shutdown_rx,
            )
            .await;

        if let Err(exit_code) = result {
            error!(data_type = %data_type, exit_code, "hot-storage consumer task exited fatally");
            std::process::exit(exit_code);
        }
    })
}

/// Periodically retries batches a consumer spooled after exhausting its
/// insert retries, per `spec.md` §7's storage error path: retry -> spool
/// -> drain.
async fn drain_spool_periodically(
    store: Arc<ClickHouseStore>,
    spool_dir: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let spool = Spool::new(spool_dir);
    let mut ticker = tokio::time::interval(SPOOL_DRAIN_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                for data_type in ALL_DATA_TYPES {
                    let batches = match spool.drain(data_type).await {
                        Ok(batches) => batches,
                        Err(e) => {
                            warn!(error = %e, data_type = %data_type, "failed to read spool file");
                            continue;
                        }
                    };

                    for batch in batches {
                        if let Err(e) = store.insert_batch(data_type, &batch).await {
                            warn!(error = %e, data_type = %data_type, "spool drain insert failed, re-spooling batch");
                            let _ = spool.append(data_type, &batch).await;
                        }
                    }
                }
            }
        }
    }
}
