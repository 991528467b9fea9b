//! Runs one supervised task per (exchange, market_type) that has at least
//! one valid subscription in the loaded config, normalizing and publishing
//! every decoded event, and serves `/health`, `/ready`, `/metrics`.
//!
//! Grounded on `cooprefr-bettersys`'s `route_quality_monitor` binary for
//! the clap + tracing_subscriber + axum::serve wiring; the supervised-task
//! loop follows `marketprism-supervisor`'s `Supervisor::run_task` contract.

use clap::Parser;
use marketprism_config::{ExchangeCollectorConfig, MarketPrismConfig};
use marketprism_data::error::DataError;
use marketprism_data::event::MarketEvent;
use marketprism_data::exchange::{AnyConnector, BinanceConnector, DeribitConnector, OkxConnector};
use marketprism_data::streams::run_connector;
use marketprism_data::subscription::Subscription;
use marketprism_health::{build_router, HealthRegistry, ReadinessCheck};
use marketprism_instrument::{DataType, ExchangeId, MarketType};
use marketprism_publisher::{Publisher, FALLBACK_DRAIN_INTERVAL};
use marketprism_supervisor::{listen_for_shutdown, Supervisor, TaskError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// `/ready` reports false once the NATS connection this collector
/// publishes through has dropped.
struct NatsReadiness(Arc<Publisher>);

#[async_trait::async_trait]
impl ReadinessCheck for NatsReadiness {
    fn name(&self) -> &str {
        "nats"
    }

    async fn check(&self) -> bool {
        self.0.is_connected().await
    }
}

#[derive(Parser, Debug)]
#[command(name = "marketprism-collector")]
#[command(about = "Runs exchange connectors and publishes canonical records to NATS JetStream")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Port the `/health`, `/ready`, `/metrics` endpoints listen on.
    #[arg(long, default_value_t = 8080)]
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

    let prometheus = PrometheusBuilder::new().build_recorder().handle();
    let registry = Arc::new(HealthRegistry::new());

    let nats_url = config.nats.servers.join(",");
    let publisher = match Publisher::connect(&nats_url, config.publisher.fallback_queue_size).await {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            error!(error = %e, "cannot reach nats at startup");
            std::process::exit(4);
        }
    };

    let shutdown_rx = listen_for_shutdown();

    let readiness: Vec<Arc<dyn ReadinessCheck>> = vec![Arc::new(NatsReadiness(publisher.clone()))];
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
    for (name, exchange_cfg) in &config.collector.exchanges {
        if !exchange_cfg.enabled {
            continue;
        }
        let Some(exchange) = ExchangeId::parse(name) else {
            warn!(exchange = name, "unknown exchange name in config, skipping");
            continue;
        };

        for market_type in [MarketType::Spot, MarketType::Perpetual, MarketType::Options] {
            let subs = probe_subscriptions(exchange, market_type, exchange_cfg);
            if subs.is_empty() {
                continue;
            }

            let task_name = format!("connector-{}-{}", exchange.as_str(), market_type.as_str());
            registry.register(task_name.clone());

            tasks.push(spawn_supervised_connector(
                exchange,
                market_type,
                subs,
                task_name,
                publisher.clone(),
                registry.clone(),
                shutdown_rx.clone(),
            ));
        }
    }

    if tasks.is_empty() {
        warn!("no exchange is enabled with at least one valid subscription, idling until shutdown");
    }

    let drainer = tokio::spawn(drain_fallback_periodically(publisher.clone(), shutdown_rx.clone()));

    for task in tasks {
        let _ = task.await;
    }

    drainer.abort();
    health_server.abort();
    info!("collector shut down cleanly");
}

/// Periodically retries records that exhausted `Publisher::publish`'s own
/// retries and landed in its in-memory fallback queue, per `spec.md` §7's
/// storage error path: retry -> spool -> drain. Mirrors the hot-consumer's
/// `drain_spool_periodically`.
async fn drain_fallback_periodically(publisher: Arc<Publisher>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(FALLBACK_DRAIN_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                let drained = publisher.drain_fallback().await;
                if drained > 0 {
                    info!(drained, "drained records from the fallback queue");
                }
            }
        }
    }
}

fn spawn_supervised_connector(
    exchange: ExchangeId,
    market_type: MarketType,
    subs: Vec<Subscription>,
    task_name: String,
    publisher: Arc<Publisher>,
    registry: Arc<HealthRegistry>,
    shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let supervisor = Supervisor::new("collector");
        let log_name = task_name.clone();

        let result = supervisor
            .run_task(
                &log_name,
                {
                    let subs = subs.clone();
                    let publisher = publisher.clone();
                    let registry = registry.clone();
                    let task_name = task_name.clone();
                    let shutdown_rx = shutdown_rx.clone();
                    move || {
                        let subs = subs.clone();
                        let publisher = publisher.clone();
                        let registry = registry.clone();
                        let task_name = task_name.clone();
                        let shutdown_rx = shutdown_rx.clone();
                        async move {
                            run_exchange_market(
                                exchange,
                                market_type,
                                subs,
                                publisher,
                                registry,
                                task_name,
                                shutdown_rx,
                            )
                            .await
                        }
                    }
                },
                shutdown_rx,
            )
            .await;

        if let Err(exit_code) = result {
            error!(%exchange, %market_type, exit_code, "connector task exited fatally");
            std::process::exit(exit_code);
        }
    })
}

/// Builds a fresh connector, re-applies the already-validated
/// subscriptions, and drives it through [`run_connector`]'s own
/// reconnect-with-backoff loop until either `shutdown` fires (clean exit)
/// or the connector reports a fatal error (retryable from the
/// supervisor's point of view — a fresh connector is built on restart).
async fn run_exchange_market(
    exchange: ExchangeId,
    market_type: MarketType,
    subs: Vec<Subscription>,
    publisher: Arc<Publisher>,
    registry: Arc<HealthRegistry>,
    task_name: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TaskError> {
    let mut connector = build_connector(exchange, market_type);
    for sub in &subs {
        if let Err(e) = connector.subscribe(sub.clone()) {
            warn!(%exchange, %market_type, error = %e, "previously valid subscription rejected, dropping it");
        }
    }

    let (tx, mut rx) = marketprism_integration::channel::bounded(1024);
    let (connector_shutdown_tx, connector_shutdown_rx) = tokio::sync::oneshot::channel();
    let connector_handle = tokio::spawn(run_connector(connector, tx, connector_shutdown_rx));

    let mut heartbeat_ticker = tokio::time::interval(Duration::from_secs(10));
    let mut fatal: Option<DataError> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                break;
            }
            _ = heartbeat_ticker.tick() => {
                registry.heartbeat(task_name.clone());
            }
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        registry.heartbeat(task_name.clone());
                        publish_event(&publisher, event).await;
                    }
                    Some(Err(e)) => {
                        fatal = Some(e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let _ = connector_shutdown_tx.send(());
    let _ = connector_handle.await;

    match fatal {
        Some(e) => Err(TaskError::Retryable(e.to_string())),
        None => Ok(()),
    }
}

async fn publish_event(publisher: &Publisher, event: MarketEvent) {
    match marketprism_normalizer::normalize(event) {
        Ok(record) => {
            if let Err(e) = publisher.publish(&record).await {
                warn!(error = %e, "failed to publish canonical record");
            }
        }
        Err(reason) => {
            metrics::counter!("marketprism_normalizer_rejected_total").increment(1);
            warn!(reason = %reason, "dropping record that failed normalization");
        }
    }
}

fn build_connector(exchange: ExchangeId, market_type: MarketType) -> AnyConnector {
    match exchange {
        ExchangeId::Binance => AnyConnector::Binance(BinanceConnector::new(market_type)),
        ExchangeId::Okx => AnyConnector::Okx(OkxConnector::new(market_type)),
        ExchangeId::Deribit => AnyConnector::Deribit(DeribitConnector::new(market_type)),
    }
}

/// Tries every configured (symbol, data_type) pair against a throwaway
/// connector for `market_type`, keeping only the combinations the
/// exchange actually supports. An exchange with no `market_type` key in
/// its config enables all three and lets `subscribe` reject the ones that
/// do not apply.
fn probe_subscriptions(
    exchange: ExchangeId,
    market_type: MarketType,
    cfg: &ExchangeCollectorConfig,
) -> Vec<Subscription> {
    let mut probe = build_connector(exchange, market_type);
    let mut subs = Vec::new();

    for symbol in &cfg.symbols {
        for data_type_name in &cfg.data_types {
            let Some(data_type) = DataType::parse(data_type_name) else {
                warn!(data_type = data_type_name, "unknown data_type in config, skipping");
                continue;
            };
            let sub = Subscription::new(market_type, symbol.as_str(), data_type);
            if probe.subscribe(sub.clone()).is_ok() {
                subs.push(sub);
            }
        }
    }

    subs
}
