// Tally Exporter - Tasmota counter daemon
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tally Exporter
//!
//! Keeps a durable, reboot-proof total for one Tasmota pulse counter and
//! exposes it over HTTP for Prometheus.
//!
//! ## Usage
//!
//! ```bash
//! # Live telemetry from the broker
//! mosquitto_sub -v -t 'tele/water_in/#' | tally-exporter --config water.json --stdin
//!
//! # Replay a recorded capture 10x faster
//! tally-exporter --config water.json --replay capture.csv --speed 10.0
//! ```

mod error;
mod ingest;
mod metrics;
mod status;
mod store;
mod worker;

#[cfg(feature = "replay")]
mod replay;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use clap::Parser;
use error::AgentError;
use ingest::{read_lines, Forwarder};
use metrics::encode_metrics;
use serde::Serialize;
use status::{CounterStatus, SharedStatus};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use store::{run_persister, JsonFileStore};
use tally::CounterConfig;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use worker::{spawn_liveness_ticker, CounterWorker};

#[cfg(feature = "replay")]
use replay::{CaptureInfo, ReplayConfig, ReplayEngine, ReplayState};

/// Depth of the worker event queue
const EVENT_QUEUE_SIZE: usize = 1024;

/// Tally counter exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Counter configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Snapshot file
    #[arg(long, default_value = "tally-state.json")]
    state: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Read `<topic> <payload>` lines from stdin
    #[arg(long)]
    stdin: bool,

    /// CSV capture to replay
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Replay speed multiplier (1.0 = real-time)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Application state shared across handlers.
struct AppState {
    status: SharedStatus,
    #[cfg(feature = "replay")]
    replay_state: Option<Arc<ReplayState>>,
    #[cfg(feature = "replay")]
    capture_info: Option<CaptureInfo>,
    start_time: std::time::Instant,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Tally Exporter v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load and validate the counter configuration.
fn load_config(path: &Path) -> Result<CounterConfig, AgentError> {
    let json = std::fs::read_to_string(path).map_err(|source| AgentError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CounterConfig::from_json(&json)?)
}

async fn run(args: Args) -> Result<(), AgentError> {
    let config = load_config(&args.config)?;
    info!(
        "Counter '{}': tele/{}/SENSOR C{}, max_valid_diff {}",
        config.name, config.short_topic, config.counter_id, config.max_valid_diff
    );

    // Restore before any telemetry is accepted
    let store = JsonFileStore::new(&args.state);
    let status = CounterStatus::shared(&config);
    let (persist_tx, persist_rx) = watch::channel(None);
    let mut worker = CounterWorker::new(&config, Arc::clone(&status), persist_tx)?;
    worker.restore(store.load_or_none()).await;
    let persister = tokio::spawn(run_persister(store, persist_rx));

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let worker_handle = tokio::spawn(worker.run(rx));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    match config.liveness_interval() {
        Some(period) => tasks.push(spawn_liveness_ticker(period, tx.clone())),
        None => info!("Liveness check disabled"),
    }

    let forwarder = Forwarder::new(&config, tx);

    // Initialize replay engine if a capture was provided
    #[cfg(feature = "replay")]
    let (replay_state, capture_info) = if let Some(csv_path) = args.replay.clone() {
        let engine = ReplayEngine::from_csv(ReplayConfig {
            csv_path,
            speed: args.speed,
        })?;
        let state = engine.state();
        let info = engine.capture_info();

        let replay_forwarder = forwarder.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = engine.run(&replay_forwarder).await {
                error!("Replay stopped: {}", e);
            }
        }));

        (Some(state), Some(info))
    } else {
        (None, None)
    };

    #[cfg(not(feature = "replay"))]
    if args.replay.is_some() {
        tracing::warn!("Replay feature not enabled, ignoring --replay argument");
    }

    if args.stdin {
        info!("Reading telemetry from stdin: {:?}", forwarder.subscriptions());
        let stdin_forwarder = forwarder.clone();
        tasks.push(tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            if let Err(e) = read_lines(reader, &stdin_forwarder).await {
                error!("Stdin ingestion stopped: {}", e);
            }
        }));
    }
    drop(forwarder);

    // Create app state
    let state = Arc::new(AppState {
        status,
        #[cfg(feature = "replay")]
        replay_state,
        #[cfg(feature = "replay")]
        capture_info,
        start_time: std::time::Instant::now(),
    });

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down");
    for task in tasks {
        task.abort();
        let _ = task.await;
    }

    // Every sender is gone now: the worker drains, then the persister flushes
    if let Ok(worker) = worker_handle.await {
        info!("{}", worker.stats().report());
    }
    let _ = persister.await;
    Ok(())
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Tally Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Tally Exporter</h1>
    <p>Reboot-proof totals for Tasmota pulse counters.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check (state restored)</div>
        <div class="endpoint"><a href="/status">/status</a> - Counter status (JSON)</div>
    </div>

    <h2>Metrics</h2>
    <ul>
        <li><code>tally_accumulated_value</code> - Accumulated total</li>
        <li><code>tally_raw_reference</code> - Raw counter used as reference</li>
        <li><code>tally_device_uptime_seconds</code> - Last reported device uptime</li>
        <li><code>tally_counter_stale</code> - 1 when no update arrived in the last interval</li>
        <li><code>tally_device_online</code> - Device availability</li>
        <li><code>tally_samples_total</code> - Samples by outcome</li>
        <li><code>tally_reboots_total</code> - Detected device reboots</li>
        <li><code>tally_payload_errors_total</code> - Undecodable payloads</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.status.read().await.initialized {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    counter: CounterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<ReplayStatus>,
}

/// Replay status information.
#[derive(Serialize)]
struct ReplayStatus {
    running: bool,
    position: usize,
    total_rows: usize,
    progress_percent: f64,
    duration_ms: u64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    #[cfg(feature = "replay")]
    let replay = state.replay_state.as_ref().map(|replay_state| {
        use std::sync::atomic::Ordering;

        let position = replay_state.position.load(Ordering::SeqCst);
        let total = replay_state.total_rows.load(Ordering::SeqCst);
        let progress = if total > 0 {
            (position as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        ReplayStatus {
            running: replay_state.running.load(Ordering::SeqCst),
            position,
            total_rows: total,
            progress_percent: progress,
            duration_ms: state
                .capture_info
                .as_ref()
                .map(|i| i.duration_ms)
                .unwrap_or(0),
        }
    });

    #[cfg(not(feature = "replay"))]
    let replay: Option<ReplayStatus> = None;

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        counter: state.status.read().await.clone(),
        replay,
    })
}
