//! Route fetch orchestration
//!
//! The RouteFetchOrchestrator is the single owner of the route state. It
//! coordinates:
//! - Selection (map clicks, drags, mode toggles, landmark picks)
//! - Live location (tracker lifecycle tied to Live mode)
//! - Fetch timing (one long-lived RateLimiter bound to the dispatcher)
//! - Reconciliation (sequence-tagged responses, stale ones discarded)
//!
//! All state changes happen inside `run`'s select loop, one handler at a
//! time. Directions requests run on spawned tasks and report back through a
//! channel; every request carries the sequence number assigned when it was
//! issued.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::route::RouteResult;
use crate::domain::types::{
    Coordinate, Landmark, MapEvent, RouteRequest, SelectionMode, TravelProfile,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::directions::{DirectionsClient, DirectionsError};
use crate::io::geolocation::{PositionSource, WatchOptions};
use crate::io::snapshot::RouteSnapshot;
use crate::services::live_location::LiveLocationTracker;
use crate::services::selection::{SelectionEvent, SelectionState};
use crate::services::throttle::RateLimiter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

const RESPONSE_CHANNEL_CAPACITY: usize = 32;

/// Completed directions request
#[derive(Debug)]
pub struct RouteResponse {
    pub seq: u64,
    pub request: RouteRequest,
    pub result: Result<RouteResult, DirectionsError>,
    pub latency: Duration,
}

/// Issues directions requests; target of the rate limiter
pub(crate) struct FetchDispatcher {
    client: Arc<dyn DirectionsClient>,
    /// Last sequence number handed out
    last_seq: AtomicU64,
    response_tx: mpsc::Sender<RouteResponse>,
    metrics: Arc<Metrics>,
}

impl FetchDispatcher {
    /// Tag `request` with the next sequence number and start it
    pub(crate) fn issue(&self, request: RouteRequest) -> u64 {
        let seq = self.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.record_fetch_issued();
        info!(
            seq = %seq,
            profile = %request.profile.as_str(),
            origin = %request.origin,
            destination = %request.destination,
            "route_fetch_issued"
        );

        let client = self.client.clone();
        let response_tx = self.response_tx.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = client.fetch_route(&request).await;
            let latency = started.elapsed();
            metrics.record_fetch_latency(latency.as_millis() as u64);
            // Receiver only goes away with the orchestrator
            let _ = response_tx.send(RouteResponse { seq, request, result, latency }).await;
        });
        seq
    }

    pub(crate) fn last_issued(&self) -> u64 {
        self.last_seq.load(Ordering::SeqCst)
    }
}

/// Owner of selection, live tracking, fetch timing and the current route
pub struct RouteFetchOrchestrator {
    /// Mode plus start/end coordinates
    pub(crate) selection: SelectionState,
    pub(crate) profile: TravelProfile,
    /// Device position, active only in Live mode
    pub(crate) live: LiveLocationTracker,
    /// Trailing-edge limiter in front of the dispatcher
    pub(crate) limiter: RateLimiter<RouteRequest>,
    pub(crate) dispatcher: Arc<FetchDispatcher>,
    pub(crate) response_rx: mpsc::Receiver<RouteResponse>,
    /// Route currently shown
    pub(crate) route: Option<RouteResult>,
    /// Requests up to this sequence number predate the last mode toggle
    pub(crate) invalidated_through: u64,
    pub(crate) landmarks: Vec<Landmark>,
    pub(crate) metrics: Arc<Metrics>,
    snapshot_tx: watch::Sender<RouteSnapshot>,
    revision: u64,
}

impl RouteFetchOrchestrator {
    pub fn new(
        config: &Config,
        client: Arc<dyn DirectionsClient>,
        position_source: Arc<dyn PositionSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (response_tx, response_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let dispatcher = Arc::new(FetchDispatcher {
            client,
            last_seq: AtomicU64::new(0),
            response_tx,
            metrics: metrics.clone(),
        });

        let target = dispatcher.clone();
        let limiter = RateLimiter::new(config.throttle_delay(), move |request| {
            target.issue(request);
        });

        let options = WatchOptions {
            high_accuracy: config.high_accuracy(),
            timeout: config.geolocation_timeout(),
            maximum_age: config.maximum_age(),
        };
        let live = LiveLocationTracker::new(position_source, options, metrics.clone());
        let (snapshot_tx, _) = watch::channel(RouteSnapshot::default());

        info!(
            throttle_ms = %config.throttle_delay().as_millis(),
            landmarks = %config.landmarks().len(),
            "route_orchestrator_initialized"
        );

        Self {
            selection: SelectionState::default(),
            profile: TravelProfile::default(),
            live,
            limiter,
            dispatcher,
            response_rx,
            route: None,
            invalidated_through: 0,
            landmarks: config.landmarks().to_vec(),
            metrics,
            snapshot_tx,
            revision: 0,
        }
    }

    /// Receiver for render snapshots, published after every state change
    pub fn subscribe(&self) -> watch::Receiver<RouteSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn mode(&self) -> SelectionMode {
        self.selection.mode()
    }

    pub fn profile(&self) -> TravelProfile {
        self.profile
    }

    pub fn route(&self) -> Option<&RouteResult> {
        self.route.as_ref()
    }

    /// Consume map events, position updates and responses until shutdown.
    /// Input EOF does not end the loop; position and route updates keep flowing.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<MapEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut events_open = true;
        loop {
            tokio::select! {
                event = event_rx.recv(), if events_open => {
                    match event {
                        Some(e) => self.process_event(e),
                        None => {
                            info!("map_event_stream_closed");
                            events_open = false;
                        }
                    }
                }
                update = self.live.next_update() => {
                    self.handle_position_update(update);
                }
                response = self.response_rx.recv() => {
                    if let Some(response) = response {
                        self.handle_route_response(response);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.dispose();
    }

    /// Dispatch one map event to its handler
    pub fn process_event(&mut self, event: MapEvent) {
        self.metrics.record_map_event();
        debug!(event = %event.as_str(), "map_event_processing");

        match event {
            MapEvent::Click { lng, lat } => {
                self.handle_selection(SelectionEvent::MapClick(Coordinate::new(lng, lat)));
            }
            MapEvent::MarkerDragEnd { marker, lng, lat } => {
                self.handle_selection(SelectionEvent::MarkerDrag {
                    marker,
                    point: Coordinate::new(lng, lat),
                });
            }
            MapEvent::ToggleMode => {
                self.handle_selection(SelectionEvent::ToggleMode);
            }
            MapEvent::SetProfile { profile } => {
                self.handle_set_profile(profile);
            }
            MapEvent::SelectPlace { id } => {
                self.handle_select_place(id);
            }
        }
    }

    /// Drop pending intent and end the live subscription. In-flight requests
    /// are left to finish; their responses are never applied.
    pub fn dispose(&mut self) {
        let dropped = self.limiter.cancel();
        let stopped = self.live.stop();
        self.invalidated_through = self.dispatcher.last_issued();
        info!(
            pending_dropped = %dropped,
            live_stopped = %stopped,
            "route_orchestrator_disposed"
        );
    }

    /// Publish the current state for the renderer
    pub(crate) fn publish(&mut self) {
        self.revision += 1;
        let live_position = match self.selection.mode() {
            SelectionMode::Live => self.live.latest(),
            SelectionMode::Manual => None,
        };
        self.snapshot_tx.send_replace(RouteSnapshot {
            revision: self.revision,
            mode: self.selection.mode(),
            profile: self.profile,
            start: self.selection.start(),
            end: self.selection.end(),
            live_position,
            route: self.route.clone(),
        });
    }
}
