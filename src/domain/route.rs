//! Route model derived from a directions API response
//!
//! The API answers with a GeoJSON FeatureCollection. The whole collection is
//! kept as render geometry; distance, duration and instructions come from the
//! first segment of the first feature.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The route currently shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    /// FeatureCollection as returned by the directions API
    pub geometry: Value,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Turn-by-turn instructions in travel order
    pub steps: Vec<String>,
}

/// Why a payload could not be turned into a route
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutePayloadError {
    #[error("invalid directions payload: {0}")]
    Invalid(String),
    #[error("directions payload has no {0}")]
    Missing(&'static str),
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Deserialize)]
struct Properties {
    #[serde(default)]
    segments: Vec<Segment>,
}

// Zero-length segments come back without distance/duration
#[derive(Deserialize)]
struct Segment {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Step {
    instruction: String,
}

impl RouteResult {
    /// Build a route from the parsed FeatureCollection
    pub fn from_geojson(geometry: Value) -> Result<Self, RoutePayloadError> {
        let collection = FeatureCollection::deserialize(&geometry)
            .map_err(|e| RoutePayloadError::Invalid(e.to_string()))?;

        let feature =
            collection.features.into_iter().next().ok_or(RoutePayloadError::Missing("features"))?;
        let segment = feature
            .properties
            .segments
            .into_iter()
            .next()
            .ok_or(RoutePayloadError::Missing("segments"))?;

        Ok(Self {
            distance_meters: segment.distance,
            duration_seconds: segment.duration,
            steps: segment.steps.into_iter().map(|s| s.instruction).collect(),
            geometry,
        })
    }

    /// Parse a raw response body
    pub fn from_body(body: &str) -> Result<Self, RoutePayloadError> {
        let geometry: Value =
            serde_json::from_str(body).map_err(|e| RoutePayloadError::Invalid(e.to_string()))?;
        Self::from_geojson(geometry)
    }

    /// Human readable distance/duration lines, omitting zero values
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);
        if self.distance_meters != 0.0 {
            lines.push(format!("Distance: {}", format_distance(self.distance_meters)));
        }
        if self.duration_seconds != 0.0 {
            lines.push(format!("Duration: {}", format_time(self.duration_seconds)));
        }
        lines
    }
}

/// Format seconds as `HHhrs MMmin SSsec`, truncating fractional seconds
pub fn format_time(total_seconds: f64) -> String {
    let total = if total_seconds.is_finite() && total_seconds > 0.0 {
        total_seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}hrs {:02}min {:02}sec", hours, minutes, seconds)
}

/// Format a distance the way the instructions panel shows it
pub fn format_distance(meters: f64) -> String {
    format!("{} meters", meters)
}
