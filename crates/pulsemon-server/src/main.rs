use anyhow::Result;
use chrono::Utc;
use pulsemon_alert::manager::AlertManager;
use pulsemon_analysis::history::MetricHistory;
use pulsemon_storage::engine::SqliteStorageEngine;
use pulsemon_telemetry::buffer::SampleBuffer;
use pulsemon_telemetry::recorder::SampleRecorder;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use pulsemon_server::app;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::scheduler::aggregation::AggregationScheduler;
use pulsemon_server::scheduler::alerting::AlertingScheduler;
use pulsemon_server::scheduler::flush::FlushScheduler;
use pulsemon_server::scheduler::prediction::PredictionScheduler;
use pulsemon_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pulsemon-server [config.toml]    Start the monitoring server");
}

#[tokio::main]
async fn main() -> Result<()> {
    pulsemon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        other => {
            let config_path = other.unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    // Missing or invalid threshold configuration aborts startup; running
    // without thresholds would produce meaningless health states.
    let config = if Path::new(config_path).exists() {
        ServerConfig::load(config_path)?
    } else {
        tracing::warn!(config_path, "Config file not found, using defaults");
        let config = ServerConfig::default();
        config.validate()?;
        config
    };

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        sampling_rate = config.sampling.rate,
        "pulsemon-server starting"
    );

    // Build components: every piece of shared state is owned here and
    // injected, so tests can assemble the same pipeline in isolation.
    let storage = Arc::new(SqliteStorageEngine::new(Path::new(&config.data_dir))?);
    let buffer = Arc::new(SampleBuffer::new(config.sampling.flush_threshold));
    let recorder = Arc::new(SampleRecorder::new(buffer.clone(), config.sampling.rate));
    let alerts = Arc::new(Mutex::new(AlertManager::new(
        config.alerting.retention_hours,
    )));
    let history = Arc::new(RwLock::new(MetricHistory::new(config.history.window_size)));
    let (broadcast_tx, _) = broadcast::channel(256);

    let state = AppState {
        storage: storage.clone(),
        buffer: buffer.clone(),
        recorder,
        alerts,
        history,
        metric_specs: Arc::new(config.metric_specs()),
        failing: Arc::new(Mutex::new(HashSet::new())),
        broadcast: broadcast_tx,
        config: Arc::new(config.clone()),
        start_time: Utc::now(),
    };

    // HTTP/WebSocket server
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, app::build_http_app(state.clone()));

    // Independent tick schedulers, each separately abortable.
    let flusher = Arc::new(FlushScheduler::new(
        buffer.clone(),
        storage.clone(),
        config.sampling.flush_interval_secs,
    ));
    let flush_handle = {
        let flusher = flusher.clone();
        tokio::spawn(async move { flusher.run().await })
    };

    let aggregation_handle = {
        let scheduler = AggregationScheduler::new(
            storage.clone(),
            config.aggregation.interval_secs,
            config.aggregation.raw_retention_days,
            config.aggregation.aggregate_retention_days,
        );
        tokio::spawn(async move { scheduler.run().await })
    };

    let alerting_handle = {
        let scheduler = AlertingScheduler::new(
            state.clone(),
            config.alerting.interval_secs,
            config.alerting.bottleneck_lookback_secs,
        );
        tokio::spawn(async move { scheduler.run().await })
    };

    let prediction_handle = {
        let scheduler = PredictionScheduler::new(state.clone(), config.prediction.interval_secs);
        tokio::spawn(async move { scheduler.run().await })
    };

    tracing::info!(http = %http_addr, "Server started");

    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    // Stop scheduling further ticks, then drain what is still buffered so
    // no recorded sample is lost on shutdown.
    flush_handle.abort();
    aggregation_handle.abort();
    alerting_handle.abort();
    prediction_handle.abort();

    let flushed = flusher.flush_once();
    if flushed > 0 {
        tracing::info!(flushed, "Final flush completed");
    }
    tracing::info!("Server stopped");

    Ok(())
}
