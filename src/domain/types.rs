//! Shared types for the campus router

use serde::{Deserialize, Serialize};

/// WGS84 position. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// `[lon, lat]` pair as used by GeoJSON and the directions API
    #[inline]
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_008.8;
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.7},{:.7}", self.longitude, self.latitude)
    }
}

/// Travel profile offered to the user, serialized as the directions API identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TravelProfile {
    #[default]
    #[serde(rename = "driving-car")]
    Car,
    #[serde(rename = "cycling-regular")]
    BikeRegular,
    #[serde(rename = "cycling-electric")]
    BikeElectric,
    #[serde(rename = "foot-walking")]
    Walking,
}

impl TravelProfile {
    pub const ALL: [TravelProfile; 4] = [
        TravelProfile::Car,
        TravelProfile::BikeRegular,
        TravelProfile::BikeElectric,
        TravelProfile::Walking,
    ];

    /// Profile identifier in the directions API path
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelProfile::Car => "driving-car",
            TravelProfile::BikeRegular => "cycling-regular",
            TravelProfile::BikeElectric => "cycling-electric",
            TravelProfile::Walking => "foot-walking",
        }
    }

    /// Dash pattern for the rendered route line (walking routes are dotted)
    pub fn line_dasharray(&self) -> [f64; 2] {
        match self {
            TravelProfile::Walking => [0.2, 0.2],
            _ => [1.0, 0.0],
        }
    }
}

impl std::str::FromStr for TravelProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TravelProfile::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown travel profile: {}", s))
    }
}

impl std::fmt::Display for TravelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the route origin is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Start and end both picked on the map
    #[default]
    Manual,
    /// Start follows the device position, only the destination is picked
    Live,
}

impl SelectionMode {
    pub fn toggled(self) -> Self {
        match self {
            SelectionMode::Manual => SelectionMode::Live,
            SelectionMode::Live => SelectionMode::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Manual => "manual",
            SelectionMode::Live => "live",
        }
    }
}

/// Draggable route marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Start,
    End,
}

/// Input from the map view and its controls
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    Click { lng: f64, lat: f64 },
    MarkerDragEnd { marker: MarkerKind, lng: f64, lat: f64 },
    ToggleMode,
    SetProfile { profile: TravelProfile },
    SelectPlace { id: u32 },
}

impl MapEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapEvent::Click { .. } => "click",
            MapEvent::MarkerDragEnd { .. } => "marker_drag_end",
            MapEvent::ToggleMode => "toggle_mode",
            MapEvent::SetProfile { .. } => "set_profile",
            MapEvent::SelectPlace { .. } => "select_place",
        }
    }
}

/// Named point of interest on the campus map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub name: String,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Landmark {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::from(self.coordinates)
    }
}

/// A well-formed directions query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub profile: TravelProfile,
}
