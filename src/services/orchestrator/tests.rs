//! Tests for the RouteFetchOrchestrator

use super::*;
use crate::domain::types::{Coordinate, MarkerKind};
use crate::io::geolocation::PositionError;
use crate::services::live_location::ManualPositionSource;
use crate::services::selection::SelectionPhase;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use tokio::time::sleep;

const A: Coordinate = Coordinate::new(79.1210, 12.8804);
const B: Coordinate = Coordinate::new(79.1218, 12.8803);
const C: Coordinate = Coordinate::new(79.1223, 12.8790);
const L: Coordinate = Coordinate::new(79.1200, 12.8800);

/// Scripted directions answer
enum Reply {
    Route(RouteResult),
    Status(u16),
}

/// Directions client that answers from a script after a per-call delay.
/// Once the script runs out it answers instantly with a 1 m route.
#[derive(Default)]
struct ScriptedClient {
    script: Mutex<VecDeque<(u64, Reply)>>,
    requests: Mutex<Vec<RouteRequest>>,
}

impl ScriptedClient {
    fn push(&self, delay_ms: u64, reply: Reply) {
        self.script.lock().push_back((delay_ms, reply));
    }

    fn requests(&self) -> Vec<RouteRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DirectionsClient for ScriptedClient {
    async fn fetch_route(&self, request: &RouteRequest) -> Result<RouteResult, DirectionsError> {
        self.requests.lock().push(*request);
        let next = self.script.lock().pop_front();
        let (delay_ms, reply) = next.unwrap_or((0, Reply::Route(route(1.0))));
        sleep(millis(delay_ms)).await;
        match reply {
            Reply::Route(route) => Ok(route),
            Reply::Status(status) => {
                Err(DirectionsError::Status { status, body: "scripted failure".to_string() })
            }
        }
    }
}

/// Route identified by its distance
fn route(distance: f64) -> RouteResult {
    RouteResult::from_geojson(json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [[79.121, 12.88], [79.122, 12.88]] },
            "properties": { "segments": [{
                "distance": distance,
                "duration": 60.0,
                "steps": [{ "instruction": "Head east" }]
            }]}
        }]
    }))
    .unwrap()
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn click(point: Coordinate) -> MapEvent {
    MapEvent::Click { lng: point.longitude, lat: point.latitude }
}

fn drag(marker: MarkerKind, point: Coordinate) -> MapEvent {
    MapEvent::MarkerDragEnd { marker, lng: point.longitude, lat: point.latitude }
}

/// Orchestrator plus handles on its collaborators
struct TestOrchestrator {
    orchestrator: RouteFetchOrchestrator,
    client: Arc<ScriptedClient>,
    source: Arc<ManualPositionSource>,
}

impl std::ops::Deref for TestOrchestrator {
    type Target = RouteFetchOrchestrator;
    fn deref(&self) -> &Self::Target {
        &self.orchestrator
    }
}

impl std::ops::DerefMut for TestOrchestrator {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.orchestrator
    }
}

impl TestOrchestrator {
    /// Let `ms` of virtual time pass, then reconcile every response that arrived
    async fn settle(&mut self, ms: u64) {
        sleep(millis(ms)).await;
        while let Ok(response) = self.orchestrator.response_rx.try_recv() {
            self.orchestrator.handle_route_response(response);
        }
    }

    fn distance(&self) -> Option<f64> {
        self.orchestrator.route.as_ref().map(|r| r.distance_meters)
    }
}

fn create_test_orchestrator(throttle_ms: u64) -> TestOrchestrator {
    let config = Config::default().with_throttle_delay_ms(throttle_ms);
    let client = Arc::new(ScriptedClient::default());
    let source = Arc::new(ManualPositionSource::default());
    let orchestrator = RouteFetchOrchestrator::new(
        &config,
        client.clone(),
        source.clone(),
        Arc::new(Metrics::new()),
    );
    TestOrchestrator { orchestrator, client, source }
}

#[tokio::test(start_paused = true)]
async fn test_manual_route_fetched_once_both_points_set() {
    let mut o = create_test_orchestrator(6000);
    o.client.push(50, Reply::Route(route(120.0)));

    o.process_event(click(A));
    o.settle(100).await;
    assert!(o.client.requests().is_empty());

    o.process_event(click(B));
    o.settle(100).await;

    let requests = o.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        RouteRequest { origin: A, destination: B, profile: TravelProfile::Car }
    );
    assert_eq!(o.distance(), Some(120.0));

    let snapshot = o.subscribe().borrow().clone();
    assert_eq!(snapshot.start, Some(A));
    assert_eq!(snapshot.end, Some(B));
    assert_eq!(snapshot.route.map(|r| r.distance_meters), Some(120.0));
}

#[tokio::test(start_paused = true)]
async fn test_third_click_is_ignored() {
    let mut o = create_test_orchestrator(0);
    o.process_event(click(A));
    o.process_event(click(B));
    o.process_event(click(C));
    o.settle(10).await;

    assert_eq!(o.selection.end(), Some(B));
    assert_eq!(o.client.requests().len(), 1);
    assert_eq!(o.metrics.report().map_events_ignored, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_discarded() {
    let mut o = create_test_orchestrator(0);
    // Request #1 resolves at t=300, request #2 (issued t=100) at t=200
    o.client.push(300, Reply::Route(route(1000.0)));
    o.client.push(100, Reply::Route(route(2000.0)));

    o.process_event(click(A));
    o.process_event(click(B)); // #1 at t=0
    sleep(millis(100)).await;
    o.process_event(drag(MarkerKind::End, C)); // #2 at t=100

    o.settle(150).await; // t=250
    assert_eq!(o.distance(), Some(2000.0));

    o.settle(150).await; // t=400, R1 arrived
    assert_eq!(o.distance(), Some(2000.0));
    assert_eq!(o.dispatcher.last_issued(), 2);

    let summary = o.metrics.report();
    assert_eq!(summary.fetches_issued, 2);
    assert_eq!(summary.fetches_applied, 1);
    assert_eq!(summary.responses_stale, 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_never_shown() {
    let mut o = create_test_orchestrator(0);
    // Request #1 resolves at t=100, before request #2 (issued t=50) at t=400
    o.client.push(100, Reply::Route(route(1000.0)));
    o.client.push(350, Reply::Route(route(2000.0)));

    o.process_event(click(A));
    o.process_event(click(B)); // #1 at t=0
    sleep(millis(50)).await;
    o.process_event(drag(MarkerKind::End, C)); // #2 at t=50

    o.settle(100).await; // t=150, R1 arrived
    assert_eq!(o.distance(), None);
    assert_eq!(o.subscribe().borrow().route, None);

    o.settle(300).await; // t=450
    assert_eq!(o.distance(), Some(2000.0));

    let summary = o.metrics.report();
    assert_eq!(summary.fetches_applied, 1);
    assert_eq!(summary.responses_stale, 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_order_responses_both_applied() {
    let mut o = create_test_orchestrator(0);
    o.client.push(50, Reply::Route(route(1000.0)));
    o.client.push(50, Reply::Route(route(2000.0)));

    o.process_event(click(A));
    o.process_event(click(B));
    o.settle(100).await;
    assert_eq!(o.distance(), Some(1000.0));

    o.process_event(drag(MarkerKind::Start, C));
    o.settle(100).await;
    assert_eq!(o.distance(), Some(2000.0));
    assert_eq!(o.metrics.report().fetches_applied, 2);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_resets_everything() {
    let mut o = create_test_orchestrator(0);
    o.process_event(click(A));
    o.process_event(click(B));
    o.settle(10).await;
    assert!(o.route.is_some());

    o.process_event(MapEvent::ToggleMode);
    assert_eq!(o.mode(), SelectionMode::Live);
    assert_eq!(o.selection.start(), None);
    assert_eq!(o.selection.end(), None);
    assert!(o.route.is_none());
    assert!(o.live.is_active());
    assert_eq!(o.source.watch_count(), 1);

    let snapshot = o.subscribe().borrow().clone();
    assert_eq!(snapshot.mode, SelectionMode::Live);
    assert!(snapshot.route.is_none());

    o.process_event(MapEvent::ToggleMode);
    assert_eq!(o.mode(), SelectionMode::Manual);
    assert_eq!(o.selection.phase(), SelectionPhase::Empty);
    assert!(!o.live.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_invalidates_in_flight_request() {
    let mut o = create_test_orchestrator(0);
    o.client.push(300, Reply::Route(route(1000.0)));

    o.process_event(click(A));
    o.process_event(click(B));
    sleep(millis(100)).await;
    o.process_event(MapEvent::ToggleMode);
    o.settle(500).await;

    assert!(o.route.is_none());
    assert_eq!(o.metrics.report().responses_stale, 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_cancels_pending_fetch() {
    let mut o = create_test_orchestrator(6000);
    o.process_event(click(A));
    o.process_event(click(B)); // fires
    o.process_event(drag(MarkerKind::End, C)); // trailing, pending
    assert!(o.limiter.has_pending());

    o.process_event(MapEvent::ToggleMode);
    assert!(!o.limiter.has_pending());

    o.settle(7000).await;
    assert_eq!(o.client.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_fetch_carries_latest_selection() {
    let mut o = create_test_orchestrator(6000);
    o.process_event(click(A));
    o.process_event(click(B)); // t=0 fires
    sleep(millis(1000)).await;
    o.process_event(drag(MarkerKind::End, C));
    o.process_event(drag(MarkerKind::Start, B));

    o.settle(4900).await; // t=5900
    assert_eq!(o.client.requests().len(), 1);

    o.settle(200).await; // t=6100
    let requests = o.client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].origin, B);
    assert_eq!(requests[1].destination, C);

    let summary = o.metrics.report();
    assert_eq!(summary.throttle_immediate, 1);
    assert_eq!(summary.throttle_coalesced, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_previous_route() {
    let mut o = create_test_orchestrator(0);
    o.client.push(10, Reply::Route(route(1000.0)));
    o.client.push(10, Reply::Status(500));

    o.process_event(click(A));
    o.process_event(click(B));
    o.settle(50).await;
    o.process_event(drag(MarkerKind::End, C));
    o.settle(50).await;

    assert_eq!(o.distance(), Some(1000.0));
    assert_eq!(o.metrics.report().fetches_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_older_success_after_newer_failure_is_discarded() {
    let mut o = create_test_orchestrator(0);
    o.client.push(300, Reply::Route(route(1000.0)));
    o.client.push(10, Reply::Status(502));

    o.process_event(click(A));
    o.process_event(click(B));
    o.process_event(drag(MarkerKind::End, C));
    o.settle(500).await;

    assert!(o.route.is_none());
    assert_eq!(o.metrics.report().responses_stale, 1);
}

#[tokio::test(start_paused = true)]
async fn test_profile_change_refetches() {
    let mut o = create_test_orchestrator(0);
    o.process_event(click(A));
    o.process_event(click(B));

    o.process_event(MapEvent::SetProfile { profile: TravelProfile::Car });
    o.process_event(MapEvent::SetProfile { profile: TravelProfile::Walking });
    o.settle(10).await;

    let profiles: Vec<_> = o.client.requests().iter().map(|r| r.profile).collect();
    assert_eq!(profiles, vec![TravelProfile::Car, TravelProfile::Walking]);
    assert_eq!(o.subscribe().borrow().profile, TravelProfile::Walking);
}

#[tokio::test(start_paused = true)]
async fn test_profile_survives_toggle() {
    let mut o = create_test_orchestrator(0);
    o.process_event(MapEvent::SetProfile { profile: TravelProfile::BikeElectric });
    o.process_event(MapEvent::ToggleMode);
    assert_eq!(o.profile(), TravelProfile::BikeElectric);
}

#[tokio::test(start_paused = true)]
async fn test_live_origin_substitution() {
    let mut o = create_test_orchestrator(0);
    o.process_event(MapEvent::ToggleMode);

    // Destination alone is not enough
    o.process_event(click(B));
    o.settle(10).await;
    assert!(o.client.requests().is_empty());

    o.handle_position_update(Ok(L));
    o.settle(10).await;
    let requests = o.client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].origin, L);
    assert_eq!(requests[0].destination, B);

    // A stale start left in the selection must not become the origin
    o.selection = SelectionState::with_points(SelectionMode::Live, Some(A), Some(C));
    o.evaluate_trigger();
    o.settle(10).await;
    let requests = o.client.requests();
    assert_eq!(requests[1].origin, L);
    assert_eq!(requests[1].destination, C);
}

#[tokio::test(start_paused = true)]
async fn test_live_updates_are_throttled() {
    let mut o = create_test_orchestrator(6000);
    o.process_event(MapEvent::ToggleMode);
    o.process_event(click(B));

    let fixes = [L, A, C];
    for fix in fixes {
        o.handle_position_update(Ok(fix));
        sleep(millis(1000)).await;
    }
    assert_eq!(o.client.requests().len(), 1);

    o.settle(5000).await;
    let requests = o.client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].origin, C);
}

#[tokio::test(start_paused = true)]
async fn test_position_error_keeps_live_coordinate() {
    let mut o = create_test_orchestrator(0);
    o.process_event(MapEvent::ToggleMode);
    o.handle_position_update(Ok(L));
    o.handle_position_update(Err(PositionError::Timeout(Duration::from_secs(60))));

    assert_eq!(o.live.latest(), Some(L));
    assert_eq!(o.mode(), SelectionMode::Live);
    assert_eq!(o.subscribe().borrow().live_position, Some(L));
}

#[tokio::test(start_paused = true)]
async fn test_select_place_sets_live_destination() {
    let mut o = create_test_orchestrator(0);

    // Manual mode has no destination list
    o.process_event(MapEvent::SelectPlace { id: 2 });
    assert_eq!(o.selection.end(), None);

    o.process_event(MapEvent::ToggleMode);
    o.process_event(MapEvent::SelectPlace { id: 2 });
    assert_eq!(o.selection.end(), Some(Coordinate::new(79.1218274, 12.8803582)));

    o.process_event(MapEvent::SelectPlace { id: 42 });
    assert_eq!(o.selection.end(), Some(Coordinate::new(79.1218274, 12.8803582)));
    assert_eq!(o.metrics.report().map_events_ignored, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_pending_and_stops_tracking() {
    let mut o = create_test_orchestrator(6000);
    o.process_event(MapEvent::ToggleMode);
    o.process_event(click(B));
    o.handle_position_update(Ok(L)); // fires
    o.handle_position_update(Ok(A)); // pending
    assert!(o.limiter.has_pending());

    o.dispose();
    assert!(!o.limiter.has_pending());
    assert!(!o.live.is_active());

    o.settle(10000).await;
    assert_eq!(o.client.requests().len(), 1);
    // The request issued before disposal never lands
    assert!(o.route.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_processes_all_inputs() {
    let mut o = create_test_orchestrator(0);
    o.client.push(50, Reply::Route(route(1000.0)));

    let (event_tx, event_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    event_tx.send(MapEvent::ToggleMode).await.unwrap();
    event_tx.send(click(B)).await.unwrap();
    // Input EOF must not stop the loop
    drop(event_tx);

    let source = o.source.clone();
    tokio::spawn(async move {
        sleep(millis(100)).await;
        assert!(source.push(Ok(L)).await);
        sleep(millis(1000)).await;
        shutdown_tx.send(true).unwrap();
    });

    o.orchestrator.run(event_rx, shutdown_rx).await;

    assert_eq!(o.distance(), Some(1000.0));
    assert_eq!(o.live.latest(), Some(L));
    assert!(!o.live.is_active());
    assert_eq!(o.client.requests()[0].origin, L);
}
