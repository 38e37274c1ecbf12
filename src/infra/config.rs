//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument
//! (default: config/dev.toml). Every section is optional.
//!
//! The directions API credential is injected configuration: `ORS_API_KEY`
//! in the environment overrides `directions.api_key` from the file.

use crate::domain::types::{Coordinate, Landmark};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the directions API credential
pub const API_KEY_ENV: &str = "ORS_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSourceKind {
    /// gpsd daemon over TCP
    Gpsd,
    /// JSON-lines trace replayed at a fixed interval
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsConfig {
    #[serde(default = "default_directions_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_directions_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: default_directions_base_url(),
            api_key: String::new(),
            timeout_ms: default_directions_timeout_ms(),
        }
    }
}

fn default_directions_base_url() -> String {
    "https://api.openrouteservice.org".to_string()
}

fn default_directions_timeout_ms() -> u64 {
    15000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum interval between route fetches
    #[serde(default = "default_throttle_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { delay_ms: default_throttle_delay_ms() }
    }
}

fn default_throttle_delay_ms() -> u64 {
    6000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_position_source")]
    pub source: PositionSourceKind,
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
    /// Max wait for a position before a timeout error is reported
    #[serde(default = "default_geolocation_timeout_ms")]
    pub timeout_ms: u64,
    /// Max age of a cached fix that may be delivered on subscription start
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,
    #[serde(default = "default_gpsd_addr")]
    pub gpsd_addr: String,
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            source: default_position_source(),
            high_accuracy: default_high_accuracy(),
            timeout_ms: default_geolocation_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
            gpsd_addr: default_gpsd_addr(),
            replay_file: None,
            replay_interval_ms: default_replay_interval_ms(),
        }
    }
}

fn default_position_source() -> PositionSourceKind {
    PositionSourceKind::Gpsd
}

fn default_high_accuracy() -> bool {
    true
}

fn default_geolocation_timeout_ms() -> u64 {
    60000
}

fn default_maximum_age_ms() -> u64 {
    3000
}

fn default_gpsd_addr() -> String {
    "127.0.0.1:2947".to_string()
}

fn default_replay_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_map_center")]
    pub center: [f64; 2],
    #[serde(default = "default_map_zoom")]
    pub zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { center: default_map_center(), zoom: default_map_zoom() }
    }
}

fn default_map_center() -> [f64; 2] {
    [79.1205, 12.8802]
}

fn default_map_zoom() -> f64 {
    15.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// GeoJSON file rewritten after every state change
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { snapshot_file: default_snapshot_file() }
    }
}

fn default_snapshot_file() -> String {
    "route.geojson".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), prometheus_port: 0 }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub directions: DirectionsConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Absent means the built-in campus list; an empty list disables landmarks
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    directions_base_url: String,
    directions_api_key: String,
    directions_timeout_ms: u64,
    throttle_delay_ms: u64,
    position_source: PositionSourceKind,
    high_accuracy: bool,
    geolocation_timeout_ms: u64,
    maximum_age_ms: u64,
    gpsd_addr: String,
    replay_file: Option<PathBuf>,
    replay_interval_ms: u64,
    map_center: [f64; 2],
    map_zoom: f64,
    snapshot_file: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    landmarks: Vec<Landmark>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// The eight campus buildings shown on the map by default
    fn default_landmarks() -> Vec<Landmark> {
        const UPLOADS: &str = "https://tpgit.edu.in/wp-content/uploads";
        const FRAMES: &str = "https://s6.ezgif.com/tmp/ffffff-ezgif-6bda5fd24bfea-gif-jpg";
        let landmark = |id: u32, name: &str, coordinates: [f64; 2], image: String| Landmark {
            id,
            name: name.to_string(),
            coordinates,
            image_url: Some(image),
        };
        vec![
            landmark(
                1,
                "Admin Block",
                [79.121005, 12.8804115],
                format!("{UPLOADS}/2014/06/main.jpg"),
            ),
            landmark(
                2,
                "Library and Media Center",
                [79.1218274, 12.8803582],
                format!("{FRAMES}/frame_5_delay-2s.jpg"),
            ),
            landmark(
                3,
                "Mechanical Block",
                [79.1210862, 12.8797043],
                format!("{UPLOADS}/2014/03/mech.jpg"),
            ),
            landmark(
                4,
                "Civil Block",
                [79.1210604, 12.8808817],
                format!("{UPLOADS}/2014/03/civil.jpg"),
            ),
            landmark(
                5,
                "Computer Science and Electrical Blocks",
                [79.1217879, 12.8808319],
                format!("{UPLOADS}/2025/03/IMG20230616080908-scaled.jpg"),
            ),
            landmark(
                6,
                "Placement Cell",
                [79.1221363, 12.8797383],
                format!("{FRAMES}/frame_7_delay-2s.jpg"),
            ),
            landmark(
                7,
                "Electronics and Communication Block",
                [79.1223266, 12.8790983],
                format!("{UPLOADS}/2014/03/ece.jpg"),
            ),
            landmark(8, "MCA", [79.1224113, 12.880211], format!("{UPLOADS}/2014/03/mca.jpg")),
        ]
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            directions_base_url: toml_config.directions.base_url,
            directions_api_key: toml_config.directions.api_key,
            directions_timeout_ms: toml_config.directions.timeout_ms,
            throttle_delay_ms: toml_config.throttle.delay_ms,
            position_source: toml_config.geolocation.source,
            high_accuracy: toml_config.geolocation.high_accuracy,
            geolocation_timeout_ms: toml_config.geolocation.timeout_ms,
            maximum_age_ms: toml_config.geolocation.maximum_age_ms,
            gpsd_addr: toml_config.geolocation.gpsd_addr,
            replay_file: toml_config.geolocation.replay_file,
            replay_interval_ms: toml_config.geolocation.replay_interval_ms,
            map_center: toml_config.map.center,
            map_zoom: toml_config.map.zoom,
            snapshot_file: toml_config.output.snapshot_file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            landmarks: toml_config.landmarks.unwrap_or_else(Self::default_landmarks),
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let mut config = Self::from_toml(toml_config, path.display().to_string());
        config.apply_api_key_override(env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                let mut config = Self::default();
                config.apply_api_key_override(env::var(API_KEY_ENV).ok());
                config
            }
        }
    }

    /// A non-empty environment credential wins over the file value
    fn apply_api_key_override(&mut self, env_value: Option<String>) {
        if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
            self.directions_api_key = key.trim().to_string();
        }
    }

    // Getters for all config fields
    pub fn directions_base_url(&self) -> &str {
        &self.directions_base_url
    }

    pub fn directions_api_key(&self) -> &str {
        &self.directions_api_key
    }

    pub fn directions_timeout(&self) -> Duration {
        Duration::from_millis(self.directions_timeout_ms)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn position_source(&self) -> PositionSourceKind {
        self.position_source
    }

    pub fn high_accuracy(&self) -> bool {
        self.high_accuracy
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }

    pub fn gpsd_addr(&self) -> &str {
        &self.gpsd_addr
    }

    pub fn replay_file(&self) -> Option<&Path> {
        self.replay_file.as_deref()
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }

    pub fn map_center(&self) -> Coordinate {
        Coordinate::from(self.map_center)
    }

    pub fn map_zoom(&self) -> f64 {
        self.map_zoom
    }

    pub fn snapshot_file(&self) -> &str {
        &self.snapshot_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the throttle delay
    pub fn with_throttle_delay_ms(mut self, ms: u64) -> Self {
        self.throttle_delay_ms = ms;
        self
    }

    /// Builder method for tests to point the client at a local server
    pub fn with_directions(mut self, base_url: &str, api_key: &str) -> Self {
        self.directions_base_url = base_url.to_string();
        self.directions_api_key = api_key.to_string();
        self
    }
}
