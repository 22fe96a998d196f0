mod capture;
mod config;
mod dispatcher;
mod engine;
mod evaluator;
mod executor;
mod http;
mod metrics;

#[cfg(test)]
mod engine_tests;

use anyhow::Context;
use config::LanguageRegistry;
use dispatcher::Dispatcher;
use engine::{ExecutionLimits, ProcessEngine, MAX_SOURCE_CODE_BYTES};
use judge_common::config::Config;
use judge_common::redis::RedisQueue;
use metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // Initialize tracing subscriber
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Judge worker booting...");

    // Load language recipes
    let registry = LanguageRegistry::load_or_builtin(&config.languages_config).map_err(|e| {
        error!("Failed to load language recipes: {:#}", e);
        e
    })?;
    info!("Loaded language recipes for: {:?}", registry.list_languages());

    let limits = ExecutionLimits {
        run_timeout: Duration::from_secs(config.run_timeout_secs),
        max_output_bytes: config.max_output_bytes,
        max_source_bytes: MAX_SOURCE_CODE_BYTES,
    };
    info!(
        run_timeout_secs = config.run_timeout_secs,
        max_output_bytes = config.max_output_bytes,
        max_concurrent = config.max_concurrent_executions,
        "Execution limits"
    );
    let engine = Arc::new(ProcessEngine::new(
        registry,
        limits,
        config.max_concurrent_executions,
    ));

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    // Connect to Redis
    let queue = RedisQueue::connect(&config.redis_url, config.worker_id.clone())
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
    info!(worker_id = %queue.worker_id(), "Connected to Redis: {}", config.redis_url);

    let recovered = queue
        .recover_inflight()
        .await
        .context("Failed to recover in-flight deliveries")?;
    if recovered > 0 {
        warn!(recovered, "Deliveries from a previous run will be executed again");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(queue),
        Arc::clone(&engine),
        Arc::clone(&metrics),
    ));
    let consumers = dispatcher.spawn_all(shutdown_rx.clone());

    let state = Arc::new(http::AppState {
        engine,
        metrics,
        worker_id: config.worker_id.clone(),
    });
    let app = http::router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("HTTP server listening on {}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    // Setup graceful shutdown
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    warn!("Received shutdown signal, finishing in-flight jobs...");
    let _ = shutdown_tx.send(true);

    for consumer in consumers {
        if let Err(e) = consumer.await {
            error!(error = %e, "Consumer task failed");
        }
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server error"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    info!("Worker shutdown complete");
    Ok(())
}
