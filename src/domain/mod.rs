//! Domain models - core value types and the route model
//!
//! This module contains the canonical data types used throughout the system:
//! - `Coordinate` - a WGS84 longitude/latitude pair
//! - `TravelProfile` - travel mode mapped to the directions API identifier
//! - `SelectionMode` - manual two-point vs. live-location routing
//! - `MapEvent` - input from the map view and its controls
//! - `RouteResult` - the route currently shown, with formatting helpers

pub mod route;
pub mod types;

// Re-export commonly used types at module level
pub use route::{format_distance, format_time, RouteResult};
pub use types::{
    Coordinate, Landmark, MapEvent, MarkerKind, RouteRequest, SelectionMode, TravelProfile,
};
