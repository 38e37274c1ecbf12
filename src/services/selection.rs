//! Coordinate selection state machine
//!
//! Turns map clicks, marker drags and mode toggles into start/end
//! coordinates. The transition function is pure: `apply` returns the next
//! state plus what happened, and the caller decides on side effects.
//!
//! Manual mode: Empty -> StartSet -> BothSet. Further clicks are ignored;
//! the route then only changes by dragging a marker or toggling the mode.
//!
//! Live mode: AwaitingDestination -> DestinationSet. The origin comes from
//! the device position, every click replaces the destination.

use crate::domain::types::{Coordinate, MarkerKind, SelectionMode};

/// Selection input after the map event has been resolved to coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    MapClick(Coordinate),
    MarkerDrag { marker: MarkerKind, point: Coordinate },
    ToggleMode,
    /// Destination picked from the landmark list
    ChooseDestination(Coordinate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Empty,
    StartSet,
    BothSet,
    AwaitingDestination,
    DestinationSet,
}

impl SelectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPhase::Empty => "empty",
            SelectionPhase::StartSet => "start_set",
            SelectionPhase::BothSet => "both_set",
            SelectionPhase::AwaitingDestination => "awaiting_destination",
            SelectionPhase::DestinationSet => "destination_set",
        }
    }
}

/// Why an event left the state untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Manual mode already has both points
    SelectionComplete,
    /// Drag of a marker that has not been placed
    MarkerAbsent,
    /// Landmark destinations are only offered in Live mode
    NotLive,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::SelectionComplete => "selection_complete",
            IgnoreReason::MarkerAbsent => "marker_absent",
            IgnoreReason::NotLive => "not_live",
        }
    }
}

/// Outcome of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start or end changed
    Updated,
    /// Mode switched, all selection state cleared
    ModeToggled(SelectionMode),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SelectionState {
    mode: SelectionMode,
    start: Option<Coordinate>,
    end: Option<Coordinate>,
}

impl SelectionState {
    pub fn new(mode: SelectionMode) -> Self {
        Self { mode, start: None, end: None }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn start(&self) -> Option<Coordinate> {
        self.start
    }

    pub fn end(&self) -> Option<Coordinate> {
        self.end
    }

    pub fn phase(&self) -> SelectionPhase {
        match (self.mode, self.start, self.end) {
            (SelectionMode::Manual, None, _) => SelectionPhase::Empty,
            (SelectionMode::Manual, Some(_), None) => SelectionPhase::StartSet,
            (SelectionMode::Manual, Some(_), Some(_)) => SelectionPhase::BothSet,
            (SelectionMode::Live, _, None) => SelectionPhase::AwaitingDestination,
            (SelectionMode::Live, _, Some(_)) => SelectionPhase::DestinationSet,
        }
    }

    /// Compute the next state for `event`
    pub fn apply(&self, event: SelectionEvent) -> (SelectionState, Transition) {
        let mut next = *self;
        let transition = match event {
            SelectionEvent::MapClick(point) => match self.mode {
                SelectionMode::Manual => {
                    if self.start.is_none() {
                        next.start = Some(point);
                        Transition::Updated
                    } else if self.end.is_none() {
                        next.end = Some(point);
                        Transition::Updated
                    } else {
                        Transition::Ignored(IgnoreReason::SelectionComplete)
                    }
                }
                SelectionMode::Live => {
                    next.end = Some(point);
                    Transition::Updated
                }
            },
            SelectionEvent::MarkerDrag { marker, point } => {
                let slot = match marker {
                    MarkerKind::Start => &mut next.start,
                    MarkerKind::End => &mut next.end,
                };
                if slot.is_some() {
                    *slot = Some(point);
                    Transition::Updated
                } else {
                    Transition::Ignored(IgnoreReason::MarkerAbsent)
                }
            }
            SelectionEvent::ToggleMode => {
                next = SelectionState::new(self.mode.toggled());
                Transition::ModeToggled(next.mode)
            }
            SelectionEvent::ChooseDestination(point) => match self.mode {
                SelectionMode::Live => {
                    next.end = Some(point);
                    Transition::Updated
                }
                SelectionMode::Manual => Transition::Ignored(IgnoreReason::NotLive),
            },
        };
        (next, transition)
    }

    /// Origin/destination for the current mode, if both are known.
    /// In Live mode the origin is always `live_position`, never a stored start.
    pub fn endpoints(
        &self,
        live_position: Option<Coordinate>,
    ) -> Option<(Coordinate, Coordinate)> {
        let origin = match self.mode {
            SelectionMode::Manual => self.start,
            SelectionMode::Live => live_position,
        };
        Some((origin?, self.end?))
    }
}

#[cfg(test)]
impl SelectionState {
    /// Build an arbitrary state, including ones unreachable through `apply`
    pub(crate) fn with_points(
        mode: SelectionMode,
        start: Option<Coordinate>,
        end: Option<Coordinate>,
    ) -> Self {
        Self { mode, start, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Coordinate = Coordinate::new(79.1210, 12.8804);
    const B: Coordinate = Coordinate::new(79.1218, 12.8803);
    const C: Coordinate = Coordinate::new(79.1223, 12.8790);
    const L: Coordinate = Coordinate::new(79.1200, 12.8800);

    fn run(state: SelectionState, events: &[SelectionEvent]) -> SelectionState {
        events.iter().fold(state, |s, e| s.apply(*e).0)
    }

    #[test]
    fn test_manual_click_sequencing() {
        let state = SelectionState::default();
        assert_eq!(state.phase(), SelectionPhase::Empty);

        let (state, t) = state.apply(SelectionEvent::MapClick(A));
        assert_eq!(t, Transition::Updated);
        assert_eq!(state.phase(), SelectionPhase::StartSet);

        let (state, t) = state.apply(SelectionEvent::MapClick(B));
        assert_eq!(t, Transition::Updated);
        assert_eq!(state.phase(), SelectionPhase::BothSet);

        let (state, t) = state.apply(SelectionEvent::MapClick(C));
        assert_eq!(t, Transition::Ignored(IgnoreReason::SelectionComplete));
        assert_eq!(state.start(), Some(A));
        assert_eq!(state.end(), Some(B));
    }

    #[test]
    fn test_live_click_replaces_destination() {
        let state = SelectionState::new(SelectionMode::Live);
        assert_eq!(state.phase(), SelectionPhase::AwaitingDestination);

        let state = run(state, &[SelectionEvent::MapClick(A), SelectionEvent::MapClick(B)]);
        assert_eq!(state.phase(), SelectionPhase::DestinationSet);
        assert_eq!(state.start(), None);
        assert_eq!(state.end(), Some(B));
    }

    #[test]
    fn test_drag_replaces_without_phase_change() {
        let state = run(
            SelectionState::default(),
            &[SelectionEvent::MapClick(A), SelectionEvent::MapClick(B)],
        );
        let (state, t) =
            state.apply(SelectionEvent::MarkerDrag { marker: MarkerKind::Start, point: C });
        assert_eq!(t, Transition::Updated);
        assert_eq!(state.start(), Some(C));
        assert_eq!(state.end(), Some(B));
        assert_eq!(state.phase(), SelectionPhase::BothSet);
    }

    #[test]
    fn test_drag_of_absent_marker_is_ignored() {
        let state = run(SelectionState::default(), &[SelectionEvent::MapClick(A)]);
        let (next, t) =
            state.apply(SelectionEvent::MarkerDrag { marker: MarkerKind::End, point: C });
        assert_eq!(t, Transition::Ignored(IgnoreReason::MarkerAbsent));
        assert_eq!(next, state);
    }

    #[test]
    fn test_toggle_resets_from_any_state() {
        let states = [
            SelectionState::default(),
            run(SelectionState::default(), &[SelectionEvent::MapClick(A)]),
            run(
                SelectionState::default(),
                &[SelectionEvent::MapClick(A), SelectionEvent::MapClick(B)],
            ),
            run(SelectionState::new(SelectionMode::Live), &[SelectionEvent::MapClick(C)]),
            SelectionState::with_points(SelectionMode::Live, Some(A), Some(B)),
        ];

        for state in states {
            let (next, t) = state.apply(SelectionEvent::ToggleMode);
            assert_eq!(t, Transition::ModeToggled(state.mode().toggled()));
            assert_eq!(next.mode(), state.mode().toggled());
            assert_eq!(next.start(), None);
            assert_eq!(next.end(), None);
        }
    }

    #[test]
    fn test_choose_destination_only_in_live() {
        let (state, t) = SelectionState::default().apply(SelectionEvent::ChooseDestination(A));
        assert_eq!(t, Transition::Ignored(IgnoreReason::NotLive));
        assert_eq!(state.end(), None);

        let (state, t) =
            SelectionState::new(SelectionMode::Live).apply(SelectionEvent::ChooseDestination(A));
        assert_eq!(t, Transition::Updated);
        assert_eq!(state.end(), Some(A));
    }

    #[test]
    fn test_destination_equal_to_origin_is_allowed() {
        let state = run(
            SelectionState::default(),
            &[SelectionEvent::MapClick(A), SelectionEvent::MapClick(A)],
        );
        assert_eq!(state.endpoints(None), Some((A, A)));
    }

    #[test]
    fn test_endpoints_manual() {
        let state = run(SelectionState::default(), &[SelectionEvent::MapClick(A)]);
        assert_eq!(state.endpoints(Some(L)), None);

        let state = run(state, &[SelectionEvent::MapClick(B)]);
        assert_eq!(state.endpoints(Some(L)), Some((A, B)));
    }

    #[test]
    fn test_live_endpoints_use_live_position() {
        // A stale start left in memory must not be used as the live origin
        let state = SelectionState::with_points(SelectionMode::Live, Some(A), Some(B));
        assert_eq!(state.endpoints(Some(L)), Some((L, B)));
        assert_eq!(state.endpoints(None), None);
    }
}
