//! Sidecar server
//!
//! JSON-RPC 2.0 over HTTP in front of a DuckDB columnar store: a small
//! SELECT subset with nearest-neighbour ordering, keyed writes and explicit
//! transactions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sidecar_duck::DuckSession;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

mod config;
mod error;
mod http;
mod logging;
mod methods;
mod metrics;
mod query;
mod rpc;
mod txn;
mod write;

use config::Config;
use methods::Services;
use rpc::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so it can feed config overrides
    dotenvy::dotenv().ok();

    let config_path = Config::default_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    logging::init(&config.logging);

    let session = DuckSession::open(&config.store.database, &config.store.schema)
        .with_context(|| format!("opening store {}", config.store.database))?;
    let services = Arc::new(Services::new(session, &config).context("registering metrics")?);
    let sweeper = config
        .execution
        .transaction_idle_timeout()
        .map(|max_idle| spawn_idle_sweeper(Arc::clone(&services), max_idle));
    let app = http::router(Arc::new(Dispatcher::new(Arc::clone(&services))));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(
        %addr,
        database = %config.store.database,
        schema = %config.store.schema,
        native_vector_ordering = config.execution.native_vector_ordering,
        "sidecar listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
        // Cancelled; waiting releases its handle on the services
        let _ = sweeper.await;
    }
    match Arc::try_unwrap(services) {
        Ok(services) => services.close().context("closing store")?,
        Err(services) => {
            let rolled_back = services.transactions.rollback_all();
            tracing::warn!(rolled_back, "store still in use at shutdown; session left open");
        }
    }

    Ok(())
}

/// Periodically roll back transactions their clients abandoned
fn spawn_idle_sweeper(services: Arc<Services>, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let services = Arc::clone(&services);
            match tokio::task::spawn_blocking(move || services.expire_idle_transactions(max_idle))
                .await
            {
                Ok(0) => {}
                Ok(expired) => info!(expired, "expired idle transactions"),
                Err(e) => tracing::error!(error = %e, "idle transaction sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
