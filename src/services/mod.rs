//! Services - route selection and fetch logic
//!
//! This module contains the core logic services:
//! - `selection` - Coordinate selection state machine (manual/live)
//! - `live_location` - Live position tracker with scoped subscription
//! - `throttle` - Generic trailing-edge rate limiter
//! - `orchestrator` - Route fetch orchestration and response reconciliation

pub mod live_location;
pub mod orchestrator;
pub mod selection;
pub mod throttle;

// Re-export commonly used types
pub use live_location::LiveLocationTracker;
pub use orchestrator::{RouteFetchOrchestrator, RouteResponse};
pub use selection::{SelectionEvent, SelectionPhase, SelectionState, Transition};
pub use throttle::{Invocation, RateLimiter};
