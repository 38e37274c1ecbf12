//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `directions` - HTTP client for the directions API
//! - `geolocation` - Continuous position sources (gpsd, trace replay)
//! - `map_events` - JSON-lines reader for map view input
//! - `snapshot` - Route output to file (GeoJSON)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod directions;
pub mod geolocation;
pub mod map_events;
pub mod prometheus;
pub mod snapshot;

// Re-export commonly used types
pub use directions::{DirectionsClient, DirectionsError, OrsDirectionsClient};
pub use geolocation::{
    GpsdPositionSource, PositionError, PositionSource, PositionUpdate, ReplayPositionSource,
    WatchHandle, WatchOptions,
};
pub use map_events::read_map_events;
pub use snapshot::{MapView, RouteSnapshot, SnapshotWriter};
