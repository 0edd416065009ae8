use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use candle_aggr::aggregator::{self, Aggregator};
use candle_aggr::dispatch::{persist as persist_dispatch, push, tee};
use candle_aggr::error::AggrResult;
use candle_aggr::persist::{BarStore, SqlxBarStore};
use candle_aggr::registry::SubscriptionRegistry;
use candle_aggr::rpc::proto::aggr_server::AggrServer;
use candle_aggr::rpc::AggrService;
use candle_aggr::upstream::{BinanceAdapter, UpstreamAdapter};
use candle_aggr::Settings;

#[tokio::main]
async fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(settings.log_level);

    if let Err(err) = run(settings).await {
        tracing::error!(error = %err, "fatal error, exiting");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: i32) {
    let level = match log_level {
        ..=0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn run(settings: Settings) -> AggrResult<()> {
    let done = CancellationToken::new();
    let aggregator = Arc::new(Aggregator::new(&settings.symbols));
    let registry = Arc::new(SubscriptionRegistry::new());

    let upstream = BinanceAdapter::new();
    let done_for_errors = done.clone();
    let event_rx = upstream
        .connect(
            &settings.symbols,
            Box::new(move |err| {
                tracing::error!(error = %err, "upstream adapter reported a fatal error");
                done_for_errors.cancel();
            }),
            done.clone(),
        )
        .await?;

    let (update_rx, aggregator_handle) = aggregator::spawn(aggregator.clone(), event_rx, done.clone());

    // Each worker is already its own long-lived task (spawned by its own
    // `spawn` function); a JoinSet here just gives shutdown a single place
    // to drain them from, the same role it plays for the teacher's fetcher
    // and worker stages.
    let mut workers: JoinSet<()> = JoinSet::new();
    track(&mut workers, aggregator_handle);

    match (settings.enable_push, settings.enable_persist) {
        (true, true) => {
            let (push_rx, persist_rx, tee_handle) = tee::spawn(update_rx, done.clone());
            track(&mut workers, tee_handle);
            track(
                &mut workers,
                push::spawn(aggregator.clone(), registry.clone(), push_rx, done.clone()),
            );
            let store = connect_store(&settings.dburi).await?;
            track(
                &mut workers,
                persist_dispatch::spawn(store, aggregator.clone(), persist_rx, done.clone()),
            );
        }
        (true, false) => {
            track(
                &mut workers,
                push::spawn(aggregator.clone(), registry.clone(), update_rx, done.clone()),
            );
        }
        (false, true) => {
            let store = connect_store(&settings.dburi).await?;
            track(
                &mut workers,
                persist_dispatch::spawn(store, aggregator.clone(), update_rx, done.clone()),
            );
        }
        (false, false) => {
            tracing::warn!("neither push nor persist is enabled; updates will be discarded");
            drop(update_rx);
        }
    }

    let service = AggrService::new(aggregator, registry);
    let addr = settings
        .addr
        .parse()
        .map_err(|_| candle_aggr::error::ConfigError::InvalidAddr(settings.addr.clone()))?;

    let server_done = done.clone();
    let serve = Server::builder()
        .add_service(AggrServer::new(service))
        .serve_with_shutdown(addr, async move { server_done.cancelled().await });

    tracing::info!(%addr, "serving Candlesticks1MStream");

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with an error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            done.cancel();
        }
    }

    done.cancel();
    while workers.join_next().await.is_some() {}

    Ok(())
}

/// Folds an already-spawned worker's handle into the shutdown `JoinSet`.
fn track(workers: &mut JoinSet<()>, handle: tokio::task::JoinHandle<()>) {
    workers.spawn(async move {
        let _ = handle.await;
    });
}

async fn connect_store(dburi: &str) -> AggrResult<Arc<dyn BarStore>> {
    let store = SqlxBarStore::connect(dburi).await?;
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = ctrl_c => {}
    }
}
