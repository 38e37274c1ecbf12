//! Route snapshot output
//!
//! The orchestrator publishes a `RouteSnapshot` on a watch channel after
//! every state change. `SnapshotWriter` renders the latest one as a GeoJSON
//! FeatureCollection that any map viewer can load:
//! - the route features, styled with the line paint for the active profile
//! - point features for the start, end and live position markers
//! - one point feature per campus landmark with its name and image
//! - `view` (center/zoom), `summary` (distance, duration, instructions) and
//!   `generated_at` as foreign members of the collection
//!
//! The file is written to a temp path and renamed, so readers never see a
//! partial document.

use crate::domain::route::{format_distance, format_time, RouteResult};
use crate::domain::types::{Coordinate, Landmark, SelectionMode, TravelProfile};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info};

const ROUTE_LINE_COLOR: &str = "#000000";
const ROUTE_LINE_WIDTH: u32 = 5;

/// Everything the map view needs to draw the current state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteSnapshot {
    /// Bumped on every publish
    pub revision: u64,
    pub mode: SelectionMode,
    pub profile: TravelProfile,
    pub start: Option<Coordinate>,
    pub end: Option<Coordinate>,
    pub live_position: Option<Coordinate>,
    pub route: Option<RouteResult>,
}

/// Static part of the map: initial view and landmark markers
#[derive(Debug, Clone)]
pub struct MapView {
    pub center: Coordinate,
    pub zoom: f64,
    pub landmarks: Vec<Landmark>,
}

fn marker_feature(role: &str, coord: Coordinate) -> Value {
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": coord.lon_lat() },
        "properties": { "marker": role },
    })
}

fn landmark_feature(landmark: &Landmark) -> Value {
    let mut feature = marker_feature("landmark", landmark.coordinate());
    let props = &mut feature["properties"];
    props["id"] = json!(landmark.id);
    props["name"] = json!(landmark.name);
    if let Some(image_url) = &landmark.image_url {
        props["image_url"] = json!(image_url);
    }
    feature
}

/// Copy the route features, adding line paint to each
fn styled_route_features(route: &RouteResult, profile: TravelProfile) -> Vec<Value> {
    let features = route.geometry.get("features").and_then(Value::as_array);
    features
        .into_iter()
        .flatten()
        .map(|feature| {
            let mut feature = feature.clone();
            if let Some(obj) = feature.as_object_mut() {
                let props = obj.entry("properties").or_insert_with(|| Value::Object(Map::new()));
                if let Some(props) = props.as_object_mut() {
                    props.insert("line-color".to_string(), json!(ROUTE_LINE_COLOR));
                    props.insert("line-width".to_string(), json!(ROUTE_LINE_WIDTH));
                    props.insert("line-dasharray".to_string(), json!(profile.line_dasharray()));
                }
            }
            feature
        })
        .collect()
}

/// Render a snapshot as a GeoJSON FeatureCollection
pub fn render_geojson(snapshot: &RouteSnapshot, view: &MapView) -> Value {
    let mut features = Vec::new();
    if let Some(route) = &snapshot.route {
        features.extend(styled_route_features(route, snapshot.profile));
    }
    // Live mode draws the device position instead of a start marker
    if let Some(start) = snapshot.start.filter(|_| snapshot.mode == SelectionMode::Manual) {
        features.push(marker_feature("start", start));
    }
    if let Some(end) = snapshot.end {
        features.push(marker_feature("end", end));
    }
    if let Some(live) = snapshot.live_position.filter(|_| snapshot.mode == SelectionMode::Live) {
        features.push(marker_feature("live", live));
    }
    features.extend(view.landmarks.iter().map(landmark_feature));

    let mut doc = json!({
        "type": "FeatureCollection",
        "features": features,
        "view": { "center": view.center.lon_lat(), "zoom": view.zoom },
        "mode": snapshot.mode.as_str(),
        "profile": snapshot.profile.as_str(),
        "revision": snapshot.revision,
    });
    if let Some(route) = &snapshot.route {
        doc["summary"] = json!({
            "distance": format_distance(route.distance_meters),
            "duration": format_time(route.duration_seconds),
            "instructions": route.steps,
        });
    }
    doc
}

pub struct SnapshotWriter {
    path: PathBuf,
    view: MapView,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>, view: MapView) -> Self {
        let path = path.into();
        info!(
            file_path = %path.display(),
            landmarks = %view.landmarks.len(),
            "snapshot_writer_initialized"
        );
        Self { path, view }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the output file with the rendered snapshot
    pub fn write(&self, snapshot: &RouteSnapshot) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut doc = render_geojson(snapshot, &self.view);
        if let Ok(now) = OffsetDateTime::now_utc().format(&Rfc3339) {
            doc["generated_at"] = json!(now);
        }
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            file = %self.path.display(),
            bytes = %bytes.len(),
            revision = %snapshot.revision,
            "snapshot_written"
        );
        Ok(())
    }

    /// Write every published snapshot until shutdown or the publisher goes away
    pub async fn run(
        self,
        mut snapshots: watch::Receiver<RouteSnapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut shown: Option<RouteResult> = None;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("snapshot_writer_shutdown");
                        return;
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        info!("snapshot_publisher_closed");
                        return;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if snapshot.route != shown {
                        if let Some(route) = &snapshot.route {
                            log_route(route);
                        }
                        shown = snapshot.route.clone();
                    }
                    if let Err(e) = self.write(&snapshot) {
                        error!(file = %self.path.display(), error = %e, "snapshot_write_failed");
                    }
                }
            }
        }
    }
}

/// Instructions panel equivalent
fn log_route(route: &RouteResult) {
    info!(steps = %route.steps.len(), "route_displayed");
    for line in route.summary_lines() {
        info!(summary = %line, "route_summary");
    }
    for (i, instruction) in route.steps.iter().enumerate() {
        info!(step = %(i + 1), instruction = %instruction, "route_instruction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const A: Coordinate = Coordinate::new(79.1210, 12.8804);
    const B: Coordinate = Coordinate::new(79.1218, 12.8803);
    const CENTER: Coordinate = Coordinate::new(79.1205, 12.8802);

    fn view(landmarks: Vec<Landmark>) -> MapView {
        MapView { center: CENTER, zoom: 15.0, landmarks }
    }

    fn route() -> RouteResult {
        RouteResult::from_geojson(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[79.1210, 12.8804], [79.1218, 12.8803]]
                },
                "properties": { "segments": [{
                    "distance": 120.5,
                    "duration": 3661.9,
                    "steps": [{ "instruction": "Head east" }, { "instruction": "Arrive" }]
                }]}
            }]
        }))
        .unwrap()
    }

    fn snapshot(mode: SelectionMode, profile: TravelProfile) -> RouteSnapshot {
        RouteSnapshot {
            revision: 3,
            mode,
            profile,
            start: Some(A),
            end: Some(B),
            live_position: Some(CENTER),
            route: Some(route()),
        }
    }

    #[test]
    fn test_render_manual_route() {
        let snapshot = snapshot(SelectionMode::Manual, TravelProfile::Car);
        let doc = render_geojson(&snapshot, &view(Vec::new()));
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);

        let line = &features[0]["properties"];
        assert_eq!(line["line-color"], "#000000");
        assert_eq!(line["line-width"], 5);
        assert_eq!(line["line-dasharray"], json!([1.0, 0.0]));
        // Route properties from the API survive
        assert!(line["segments"].is_array());

        assert_eq!(features[1]["properties"]["marker"], "start");
        assert_eq!(features[2]["properties"]["marker"], "end");
        assert_eq!(doc["view"]["zoom"], 15.0);
        assert_eq!(doc["summary"]["distance"], "120.5 meters");
        assert_eq!(doc["summary"]["duration"], "01hrs 01min 01sec");
        assert_eq!(doc["summary"]["instructions"], json!(["Head east", "Arrive"]));
    }

    #[test]
    fn test_render_live_walking() {
        let snapshot = snapshot(SelectionMode::Live, TravelProfile::Walking);
        let doc = render_geojson(&snapshot, &view(Vec::new()));
        let features = doc["features"].as_array().unwrap();
        let markers: Vec<_> =
            features[1..].iter().map(|f| f["properties"]["marker"].clone()).collect();
        assert_eq!(markers, vec![json!("end"), json!("live")]);
        assert_eq!(features[0]["properties"]["line-dasharray"], json!([0.2, 0.2]));
    }

    #[test]
    fn test_render_without_route() {
        let doc = render_geojson(&RouteSnapshot::default(), &view(Vec::new()));
        assert_eq!(doc["features"], json!([]));
        assert!(doc.get("summary").is_none());
        assert_eq!(doc["mode"], "manual");
        assert_eq!(doc["profile"], "driving-car");
    }

    #[test]
    fn test_render_landmarks_with_popup_content() {
        let landmarks = vec![
            Landmark {
                id: 1,
                name: "Admin Block".to_string(),
                coordinates: [79.121005, 12.8804115],
                image_url: Some("https://example.org/main.jpg".to_string()),
            },
            Landmark {
                id: 42,
                name: "Food Court".to_string(),
                coordinates: [79.1215, 12.8800],
                image_url: None,
            },
        ];
        let doc = render_geojson(&RouteSnapshot::default(), &view(landmarks));
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);

        let admin = &features[0];
        assert_eq!(admin["geometry"]["coordinates"], json!([79.121005, 12.8804115]));
        assert_eq!(admin["properties"]["marker"], "landmark");
        assert_eq!(admin["properties"]["id"], 1);
        assert_eq!(admin["properties"]["name"], "Admin Block");
        assert_eq!(admin["properties"]["image_url"], "https://example.org/main.jpg");

        assert_eq!(features[1]["properties"]["name"], "Food Court");
        assert!(features[1]["properties"].get("image_url").is_none());
    }

    #[test]
    fn test_landmarks_follow_selection_markers() {
        let landmarks = crate::infra::Config::default().landmarks().to_vec();
        let snapshot = snapshot(SelectionMode::Manual, TravelProfile::Car);
        let doc = render_geojson(&snapshot, &view(landmarks));
        let features = doc["features"].as_array().unwrap();
        // route line, start, end, then the eight campus buildings
        assert_eq!(features.len(), 11);
        assert_eq!(features[2]["properties"]["marker"], "end");
        assert_eq!(features[3]["properties"]["name"], "Admin Block");
        assert!(features[3..].iter().all(|f| f["properties"]["image_url"].is_string()));
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("route.geojson");
        let writer = SnapshotWriter::new(&path, view(Vec::new()));

        writer.write(&snapshot(SelectionMode::Manual, TravelProfile::Car)).unwrap();
        writer.write(&RouteSnapshot::default()).unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["revision"], 0);
        assert!(doc["generated_at"].is_string());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_run_writes_published_snapshots() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("route.geojson");
        let writer = SnapshotWriter::new(&path, view(Vec::new()));

        let (snapshot_tx, snapshot_rx) = watch::channel(RouteSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(writer.run(snapshot_rx, shutdown_rx));

        snapshot_tx.send(snapshot(SelectionMode::Manual, TravelProfile::Car)).unwrap();
        // Publisher gone: the writer drains the last value and exits
        drop(snapshot_tx);
        task.await.unwrap();
        drop(shutdown_tx);

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["revision"], 3);
    }
}
