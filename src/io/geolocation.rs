//! Continuous device position sources
//!
//! A `PositionSource` starts a watch that pushes `PositionUpdate`s into a
//! channel until the returned `WatchHandle` is cancelled or dropped.
//!
//! Implementations:
//! - `GpsdPositionSource` - gpsd JSON protocol over TCP (`?WATCH` + TPV reports)
//! - `ReplayPositionSource` - JSON-lines trace of `{longitude, latitude}` replayed
//!   at a fixed interval

use crate::domain::types::Coordinate;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info};

/// Delay between gpsd reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Enables JSON reports on a gpsd connection
const GPSD_WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// gpsd TPV fix modes
const GPSD_MODE_2D: u8 = 2;
const GPSD_MODE_3D: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Only accept the most precise fixes the source can tell apart
    pub high_accuracy: bool,
    /// Max wait for the next position before a `Timeout` error is reported
    pub timeout: Duration,
    /// A cached fix younger than this is delivered as soon as the watch starts
    pub maximum_age: Duration,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("position access denied: {0}")]
    PermissionDenied(String),
    #[error("position source unavailable: {0}")]
    Unavailable(String),
    #[error("no position within {0:?}")]
    Timeout(Duration),
    #[error("malformed position report: {0}")]
    Malformed(String),
}

pub type PositionUpdate = Result<Coordinate, PositionError>;

impl From<std::io::Error> for PositionError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => PositionError::PermissionDenied(e.to_string()),
            _ => PositionError::Unavailable(e.to_string()),
        }
    }
}

/// Running subscription; dropping it stops the watch
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub trait PositionSource: Send + Sync {
    /// Start delivering updates to `tx`. Must be called within a tokio runtime.
    fn watch(&self, options: WatchOptions, tx: mpsc::Sender<PositionUpdate>) -> WatchHandle;
}

/// Last fix seen by a source, shared across its watches
#[derive(Debug, Clone, Default)]
pub struct FixCache {
    last: Arc<Mutex<Option<(Coordinate, Instant)>>>,
}

impl FixCache {
    pub fn store(&self, coord: Coordinate) {
        *self.last.lock() = Some((coord, Instant::now()));
    }

    /// Cached fix strictly younger than `maximum_age`
    pub fn fresh(&self, maximum_age: Duration) -> Option<Coordinate> {
        let last = *self.last.lock();
        last.filter(|(_, at)| at.elapsed() < maximum_age).map(|(coord, _)| coord)
    }
}

/// Send one update; false once the subscriber is gone
async fn emit(tx: &mpsc::Sender<PositionUpdate>, update: PositionUpdate) -> bool {
    tx.send(update).await.is_ok()
}

#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Extract a fix from one gpsd JSON line.
/// Non-TPV reports and TPV reports without a usable fix yield `None`.
fn parse_gpsd_line(line: &str, high_accuracy: bool) -> Option<PositionUpdate> {
    let report: GpsdReport = match serde_json::from_str(line) {
        Ok(report) => report,
        Err(e) => return Some(Err(PositionError::Malformed(e.to_string()))),
    };
    if report.class != "TPV" {
        return None;
    }
    let required_mode = if high_accuracy { GPSD_MODE_3D } else { GPSD_MODE_2D };
    if report.mode < required_mode {
        return None;
    }
    match (report.lon, report.lat) {
        (Some(lon), Some(lat)) => Some(Ok(Coordinate::new(lon, lat))),
        _ => None,
    }
}

/// gpsd client
pub struct GpsdPositionSource {
    addr: String,
    cache: FixCache,
}

impl GpsdPositionSource {
    pub fn new(addr: &str) -> Self {
        Self { addr: addr.to_string(), cache: FixCache::default() }
    }
}

impl PositionSource for GpsdPositionSource {
    fn watch(&self, options: WatchOptions, tx: mpsc::Sender<PositionUpdate>) -> WatchHandle {
        let addr = self.addr.clone();
        let cache = self.cache.clone();
        WatchHandle::new(tokio::spawn(async move {
            watch_gpsd(addr, options, cache, tx).await;
        }))
    }
}

async fn watch_gpsd(
    addr: String,
    options: WatchOptions,
    cache: FixCache,
    tx: mpsc::Sender<PositionUpdate>,
) {
    if let Some(coord) = cache.fresh(options.maximum_age) {
        if !emit(&tx, Ok(coord)).await {
            return;
        }
    }

    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                if !emit(&tx, Err(e.into())).await {
                    return;
                }
                sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        info!(addr = %addr, "gpsd_connected");

        let (read_half, mut write_half) = stream.into_split();
        if let Err(e) = write_half.write_all(GPSD_WATCH_COMMAND).await {
            if !emit(&tx, Err(e.into())).await {
                return;
            }
            sleep(RECONNECT_DELAY).await;
            continue;
        }

        let mut lines = BufReader::new(read_half).lines();
        loop {
            let next = timeout(options.timeout, async {
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match parse_gpsd_line(&line, options.high_accuracy) {
                            Some(Ok(coord)) => return Ok(Some(coord)),
                            Some(Err(e)) => debug!(error = %e, "gpsd_line_skipped"),
                            None => {}
                        },
                        Ok(None) => return Ok(None),
                        Err(e) => return Err(e),
                    }
                }
            })
            .await;

            let update = match next {
                Err(_) => Err(PositionError::Timeout(options.timeout)),
                Ok(Ok(Some(coord))) => {
                    cache.store(coord);
                    Ok(coord)
                }
                Ok(Ok(None)) => {
                    Err(PositionError::Unavailable("gpsd closed the connection".to_string()))
                }
                Ok(Err(e)) => Err(e.into()),
            };
            let disconnected = matches!(
                update,
                Err(PositionError::Unavailable(_) | PositionError::PermissionDenied(_))
            );
            if !emit(&tx, update).await {
                return;
            }
            if disconnected {
                break;
            }
        }

        sleep(RECONNECT_DELAY).await;
    }
}

/// Replays a recorded trace, one `{"longitude":..,"latitude":..}` per line
pub struct ReplayPositionSource {
    path: PathBuf,
    interval: Duration,
    cache: FixCache,
}

impl ReplayPositionSource {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self { path, interval, cache: FixCache::default() }
    }
}

impl PositionSource for ReplayPositionSource {
    fn watch(&self, options: WatchOptions, tx: mpsc::Sender<PositionUpdate>) -> WatchHandle {
        let path = self.path.clone();
        let interval = self.interval;
        let cache = self.cache.clone();
        WatchHandle::new(tokio::spawn(async move {
            if let Some(coord) = cache.fresh(options.maximum_age) {
                if !emit(&tx, Ok(coord)).await {
                    return;
                }
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    let reason = format!("{}: {}", path.display(), e);
                    let error = match e.kind() {
                        std::io::ErrorKind::PermissionDenied => {
                            PositionError::PermissionDenied(reason)
                        }
                        _ => PositionError::Unavailable(reason),
                    };
                    emit(&tx, Err(error)).await;
                    return;
                }
            };

            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let update = match serde_json::from_str::<Coordinate>(line) {
                    Ok(coord) => {
                        cache.store(coord);
                        Ok(coord)
                    }
                    Err(e) => Err(PositionError::Malformed(e.to_string())),
                };
                if !emit(&tx, update).await {
                    return;
                }
                sleep(interval).await;
            }
            info!(path = %path.display(), "position_replay_finished");
        }))
    }
}
