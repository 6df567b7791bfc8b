use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clickstream::api;
use clickstream::config::Config;
use clickstream::enrich::Enricher;
use clickstream::pipeline::{ingest_channel, BatchAccumulator, ConsumerLoop, Validator};
use clickstream::query::AggregationQueryEngine;
use clickstream::storage::connect_store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Connect to the analytics store; exhausting the retries is fatal
    let store = connect_store(&config.database).await?;

    info!("Initializing database...");
    store.init().await?;
    info!("Database initialized successfully");

    // Lookup capabilities are built once and shared by reference
    let enricher = Arc::new(Enricher::from_config(&config.lookup)?);

    let (publisher, source) = ingest_channel(config.pipeline.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = ConsumerLoop::new(
        source,
        enricher,
        Validator::new(config.pipeline.max_code_length),
        BatchAccumulator::new(config.pipeline.batch_size, config.pipeline.flush_interval()),
        Arc::clone(&store),
        config.pipeline.poll_timeout(),
        shutdown_rx.clone(),
    );
    let consumer_task = tokio::spawn(consumer.run());

    let api_router = api::create_api_router(AggregationQueryEngine::new(Arc::clone(&store)), publisher);

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}", api_addr))?;
    info!("🚀 API server listening on http://{}", api_addr);

    let mut server_shutdown = shutdown_rx;
    let api_task = tokio::spawn(async move {
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping consumer and API server...");
    let _ = shutdown_tx.send(true);

    let (consumer_result, api_result) = tokio::join!(consumer_task, api_task);

    match consumer_result {
        Ok(stats) => info!(?stats, "Consumer finished"),
        Err(e) => error!("Consumer task failed: {}", e),
    }
    match api_result {
        Ok(Ok(())) => info!("API server stopped"),
        Ok(Err(e)) => error!("API server error: {}", e),
        Err(e) => error!("API server task failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
