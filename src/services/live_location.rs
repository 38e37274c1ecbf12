//! Live location tracker
//!
//! Owns at most one position watch. While active, every fix replaces the
//! latest coordinate; errors are logged and leave it untouched. `start`
//! and `stop` are idempotent.

use crate::domain::types::Coordinate;
use crate::infra::Metrics;
use crate::io::geolocation::{PositionSource, PositionUpdate, WatchHandle, WatchOptions};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const POSITION_CHANNEL_CAPACITY: usize = 16;

struct Subscription {
    /// Dropping the handle ends the watch
    _handle: WatchHandle,
    rx: mpsc::Receiver<PositionUpdate>,
}

pub struct LiveLocationTracker {
    source: Arc<dyn PositionSource>,
    options: WatchOptions,
    latest: Option<Coordinate>,
    subscription: Option<Subscription>,
    metrics: Arc<Metrics>,
}

impl LiveLocationTracker {
    pub fn new(
        source: Arc<dyn PositionSource>,
        options: WatchOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { source, options, latest: None, subscription: None, metrics }
    }

    /// Begin watching. A fresh watch forgets the previous coordinate.
    /// Returns false if a watch was already active.
    pub fn start(&mut self) -> bool {
        if self.subscription.is_some() {
            return false;
        }
        self.latest = None;
        let (tx, rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
        let handle = self.source.watch(self.options, tx);
        self.subscription = Some(Subscription { _handle: handle, rx });
        info!(
            high_accuracy = %self.options.high_accuracy,
            timeout_ms = %self.options.timeout.as_millis(),
            maximum_age_ms = %self.options.maximum_age.as_millis(),
            "live_tracking_started"
        );
        true
    }

    /// Cancel the watch, keeping the last coordinate. Returns false if none was active.
    pub fn stop(&mut self) -> bool {
        match self.subscription.take() {
            Some(_) => {
                info!("live_tracking_stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn latest(&self) -> Option<Coordinate> {
        self.latest
    }

    /// Wait for the next update of the active watch. Never resolves while stopped.
    pub async fn next_update(&mut self) -> PositionUpdate {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };
            match subscription.rx.recv().await {
                Some(update) => return update,
                None => {
                    info!("live_position_stream_ended");
                    self.subscription = None;
                }
            }
        }
    }

    /// Record an update. Returns the new coordinate on a successful fix.
    pub fn apply_update(&mut self, update: PositionUpdate) -> Option<Coordinate> {
        if !self.is_active() {
            return None;
        }
        match update {
            Ok(coord) => {
                self.latest = Some(coord);
                self.metrics.record_position_update();
                debug!(lon = %coord.longitude, lat = %coord.latitude, "live_position_updated");
                Some(coord)
            }
            Err(e) => {
                self.metrics.record_position_error();
                warn!(error = %e, "live_position_error");
                None
            }
        }
    }
}

/// Position source driven by hand from tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ManualPositionSource {
    sender: parking_lot::Mutex<Option<mpsc::Sender<PositionUpdate>>>,
    watches: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ManualPositionSource {
    /// Deliver an update to the current watch; false if nobody is listening
    pub(crate) async fn push(&self, update: PositionUpdate) -> bool {
        let tx = self.sender.lock().clone();
        match tx {
            Some(tx) => tx.send(update).await.is_ok(),
            None => false,
        }
    }

    /// End the current watch's stream
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }

    pub(crate) fn watch_count(&self) -> usize {
        self.watches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl PositionSource for ManualPositionSource {
    fn watch(&self, _options: WatchOptions, tx: mpsc::Sender<PositionUpdate>) -> WatchHandle {
        *self.sender.lock() = Some(tx);
        self.watches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        WatchHandle::new(tokio::spawn(std::future::pending::<()>()))
    }
}
