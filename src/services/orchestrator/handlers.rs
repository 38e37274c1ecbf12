//! Handlers for the RouteFetchOrchestrator
//!
//! Each handler applies one input to the orchestrator state, re-evaluates
//! whether a fetch is warranted, and publishes a snapshot when something
//! visible changed.

use super::{RouteFetchOrchestrator, RouteResponse};
use crate::domain::route::{format_distance, format_time};
use crate::domain::types::{RouteRequest, SelectionMode, TravelProfile};
use crate::io::geolocation::PositionUpdate;
use crate::services::selection::{SelectionEvent, Transition};
use crate::services::throttle::Invocation;
use tracing::{debug, info, warn};

impl RouteFetchOrchestrator {
    /// Run a selection event through the state machine
    pub(crate) fn handle_selection(&mut self, event: SelectionEvent) {
        let (next, transition) = self.selection.apply(event);
        self.selection = next;

        match transition {
            Transition::Updated => {
                debug!(
                    phase = %self.selection.phase().as_str(),
                    start = ?self.selection.start(),
                    end = ?self.selection.end(),
                    "selection_updated"
                );
                self.evaluate_trigger();
                self.publish();
            }
            Transition::ModeToggled(mode) => {
                self.handle_mode_change(mode);
                self.publish();
            }
            Transition::Ignored(reason) => {
                self.metrics.record_map_event_ignored();
                debug!(reason = %reason.as_str(), "selection_event_ignored");
            }
        }
    }

    /// Reset derived state and move the live subscription with the mode
    fn handle_mode_change(&mut self, mode: SelectionMode) {
        let pending_dropped = self.limiter.cancel();
        // Nothing issued so far may land after the toggle
        self.invalidated_through = self.dispatcher.last_issued();
        self.route = None;

        match mode {
            SelectionMode::Live => {
                self.live.start();
            }
            SelectionMode::Manual => {
                self.live.stop();
            }
        }

        info!(
            mode = %mode.as_str(),
            pending_dropped = %pending_dropped,
            invalidated_through = %self.invalidated_through,
            "selection_mode_toggled"
        );
        self.evaluate_trigger();
    }

    pub(crate) fn handle_set_profile(&mut self, profile: TravelProfile) {
        if profile == self.profile {
            self.metrics.record_map_event_ignored();
            debug!(profile = %profile.as_str(), "profile_unchanged");
            return;
        }
        info!(from = %self.profile.as_str(), to = %profile.as_str(), "profile_changed");
        self.profile = profile;
        self.evaluate_trigger();
        self.publish();
    }

    /// Landmark pick from the destination list
    pub(crate) fn handle_select_place(&mut self, id: u32) {
        let Some(landmark) = self.landmarks.iter().find(|l| l.id == id) else {
            self.metrics.record_map_event_ignored();
            warn!(id = %id, "landmark_unknown");
            return;
        };
        debug!(id = %id, name = %landmark.name, "landmark_selected");
        let point = landmark.coordinate();
        self.handle_selection(SelectionEvent::ChooseDestination(point));
    }

    pub(crate) fn handle_position_update(&mut self, update: PositionUpdate) {
        if self.live.apply_update(update).is_some() {
            self.evaluate_trigger();
            self.publish();
        }
    }

    /// Reconcile a completed request. Only the response to the most recently
    /// issued request, issued after the last toggle, may change the route.
    pub(crate) fn handle_route_response(&mut self, response: RouteResponse) {
        let RouteResponse { seq, request, result, latency } = response;
        let last_issued = self.dispatcher.last_issued();

        if seq != last_issued || seq <= self.invalidated_through {
            self.metrics.record_response_stale();
            debug!(
                seq = %seq,
                last_issued = %last_issued,
                invalidated_through = %self.invalidated_through,
                "route_response_stale"
            );
            return;
        }

        match result {
            Ok(route) => {
                info!(
                    seq = %seq,
                    profile = %request.profile.as_str(),
                    distance = %format_distance(route.distance_meters),
                    duration = %format_time(route.duration_seconds),
                    steps = %route.steps.len(),
                    latency_ms = %latency.as_millis(),
                    "route_applied"
                );
                self.metrics.record_fetch_applied();
                self.route = Some(route);
                self.publish();
            }
            Err(e) => {
                self.metrics.record_fetch_failed();
                warn!(
                    seq = %seq,
                    profile = %request.profile.as_str(),
                    error = %e,
                    latency_ms = %latency.as_millis(),
                    "route_fetch_failed"
                );
            }
        }
    }

    /// Submit the current request to the limiter if one is warranted
    pub(crate) fn evaluate_trigger(&mut self) {
        let live_position = match self.selection.mode() {
            SelectionMode::Live => self.live.latest(),
            SelectionMode::Manual => None,
        };
        let Some((origin, destination)) = self.selection.endpoints(live_position) else {
            return;
        };

        let request = RouteRequest { origin, destination, profile: self.profile };
        let invocation = self.limiter.invoke(request);
        self.metrics.record_throttle_invocation(invocation == Invocation::Fired);
        if let Invocation::Scheduled { after } = invocation {
            debug!(after_ms = %after.as_millis(), "route_fetch_scheduled");
        }
    }
}
