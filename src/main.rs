//! Campus router - route picker for the campus map
//!
//! Reads map view events as JSON lines, keeps the start/end selection (or
//! follows the device position in Live mode), fetches routes from the
//! directions API at a bounded rate and writes the current route as GeoJSON.
//!
//! Module structure:
//! - `domain/` - Core value types (Coordinate, TravelProfile, RouteResult)
//! - `io/` - External interfaces (directions API, position sources, event input, output)
//! - `services/` - Logic (selection state machine, throttle, live tracker, orchestrator)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use campus_router::infra::{Config, Metrics, PositionSourceKind};
use campus_router::io::{
    read_map_events, GpsdPositionSource, MapView, OrsDirectionsClient, PositionSource,
    ReplayPositionSource, SnapshotWriter,
};
use campus_router::services::RouteFetchOrchestrator;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Campus router - rate-limited route fetching for the campus map
#[derive(Parser, Debug)]
#[command(name = "campus-router", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// JSON-lines map event input (default: stdin)
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Emit logs as JSON objects
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn position_source(config: &Config) -> anyhow::Result<Arc<dyn PositionSource>> {
    Ok(match config.position_source() {
        PositionSourceKind::Gpsd => Arc::new(GpsdPositionSource::new(config.gpsd_addr())),
        PositionSourceKind::Replay => {
            let path = config
                .replay_file()
                .context("geolocation.replay_file is required when source = \"replay\"")?;
            Arc::new(ReplayPositionSource::new(path.to_path_buf(), config.replay_interval()))
        }
    })
}

type EventInput = Box<dyn AsyncBufRead + Unpin + Send>;

async fn event_input(path: Option<&PathBuf>) -> anyhow::Result<EventInput> {
    Ok(match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!(git_hash = %env!("GIT_HASH"), "campus-router starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        directions_base_url = %config.directions_base_url(),
        throttle_ms = %config.throttle_delay().as_millis(),
        position_source = ?config.position_source(),
        high_accuracy = %config.high_accuracy(),
        landmarks = %config.landmarks().len(),
        snapshot_file = %config.snapshot_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );
    if config.directions_api_key().is_empty() {
        warn!("directions_api_key_missing");
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let client = Arc::new(OrsDirectionsClient::new(&config)?);
    let mut orchestrator =
        RouteFetchOrchestrator::new(&config, client, position_source(&config)?, metrics.clone());

    // Render snapshots to file
    let view = MapView {
        center: config.map_center(),
        zoom: config.map_zoom(),
        landmarks: config.landmarks().to_vec(),
    };
    let writer = SnapshotWriter::new(config.snapshot_file(), view);
    let snapshots = orchestrator.subscribe();
    let initial = snapshots.borrow().clone();
    if let Err(e) = writer.write(&initial) {
        warn!(file = %writer.path().display(), error = %e, "snapshot_initial_write_failed");
    }
    tokio::spawn(writer.run(snapshots, shutdown_rx.clone()));

    // Map view input
    let input = event_input(args.events.as_ref()).await?;
    let (event_tx, event_rx) = mpsc::channel(256);
    let reader_metrics = metrics.clone();
    let reader_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        read_map_events(input, event_tx, reader_metrics, reader_shutdown).await;
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = campus_router::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    info!("route_orchestrator_started");
    orchestrator.run(event_rx, shutdown_rx).await;

    metrics.report().log();
    info!("campus-router shutdown complete");
    Ok(())
}
