//! Deserialisable configuration for nodes and the solver.
//!
//! Every field has a default so a document only needs to name what differs.
//! Node and solver sections also accept the camelCase keys of older
//! deployments (`testMode`, `bandwidth_Hz`, flat `lat`/`lon`/`alt`, ...), and
//! reject keys they do not know.

use crate::geo::Location;
use crate::math::FftBackend;
use crate::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    pub fn to_location(&self) -> Location {
        Location::from_spherical(self.lat, self.lon, self.alt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeDocument")]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub frequency_hz: u64,
    pub bandwidth_hz: u64,
    pub samples: u32,
    pub measure_interval_ms: u32,
    /// Generate synthetic captures instead of talking to hardware.
    pub test_mode: bool,
    /// Node speaks the Nexus capture framing; read by link factories.
    pub nexus_node: bool,
    /// Per-node override of [`TdoaParams::min_sample_rate_hz`].
    pub min_sample_rate_hz: Option<f64>,
    /// Static position reported in test mode.
    pub location: GeoPoint,
    /// Emitter simulated in test mode.
    pub transmitter: Option<GeoPoint>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9999,
            frequency_hz: 433_920_000,
            bandwidth_hz: 5_000_000,
            samples: 1024,
            measure_interval_ms: 1000,
            test_mode: false,
            nexus_node: false,
            min_sample_rate_hz: None,
            location: GeoPoint::default(),
            transmitter: None,
        }
    }
}

/// Wire form of [`NodeConfig`]: position may be nested or flat.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct NodeDocument {
    host: String,
    port: u16,
    #[serde(alias = "frequency_Hz")]
    frequency_hz: u64,
    #[serde(alias = "bandwidth_Hz")]
    bandwidth_hz: u64,
    samples: u32,
    #[serde(alias = "measureInterval_ms")]
    measure_interval_ms: u32,
    #[serde(alias = "testMode")]
    test_mode: bool,
    #[serde(alias = "nexusNode")]
    nexus_node: bool,
    #[serde(alias = "minSampleRate")]
    min_sample_rate_hz: Option<f64>,
    location: Option<GeoPoint>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    transmitter: Option<GeoPoint>,
}

impl Default for NodeDocument {
    fn default() -> Self {
        let node = NodeConfig::default();
        Self {
            host: node.host,
            port: node.port,
            frequency_hz: node.frequency_hz,
            bandwidth_hz: node.bandwidth_hz,
            samples: node.samples,
            measure_interval_ms: node.measure_interval_ms,
            test_mode: node.test_mode,
            nexus_node: node.nexus_node,
            min_sample_rate_hz: node.min_sample_rate_hz,
            location: None,
            lat: None,
            lon: None,
            alt: None,
            transmitter: node.transmitter,
        }
    }
}

impl From<NodeDocument> for NodeConfig {
    fn from(doc: NodeDocument) -> Self {
        let mut location = doc.location.unwrap_or_default();
        location.lat = doc.lat.unwrap_or(location.lat);
        location.lon = doc.lon.unwrap_or(location.lon);
        location.alt = doc.alt.unwrap_or(location.alt);
        Self {
            host: doc.host,
            port: doc.port,
            frequency_hz: doc.frequency_hz,
            bandwidth_hz: doc.bandwidth_hz,
            samples: doc.samples,
            measure_interval_ms: doc.measure_interval_ms,
            test_mode: doc.test_mode,
            nexus_node: doc.nexus_node,
            min_sample_rate_hz: doc.min_sample_rate_hz,
            location,
            transmitter: doc.transmitter,
        }
    }
}

/// Heat-map sampling grid around a solved centre, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapGrid {
    pub lat_span_deg: f64,
    pub lon_span_deg: f64,
    pub lat_step_deg: f64,
    pub lon_step_deg: f64,
}

impl Default for HeatmapGrid {
    fn default() -> Self {
        Self {
            lat_span_deg: 0.01,
            lon_span_deg: 0.02,
            lat_step_deg: 0.0002,
            lon_step_deg: 0.0005,
        }
    }
}

/// Capped exponential backoff between reconnection attempts.
///
/// Retries are unbounded; only the wait between them is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TdoaParams {
    #[serde(alias = "heatMapOn")]
    pub heat_map_on: bool,
    #[serde(alias = "threeDimensions")]
    pub three_dimensions: bool,
    /// Residual tolerance that bounds the confidence ellipse, metres of path.
    #[serde(alias = "rmsError")]
    pub rms_error_m: f64,
    /// Largest acceptable RMS residual for a solve, nanoseconds.
    #[serde(alias = "badThreshold")]
    pub bad_threshold: f64,
    pub min_altitude_m: f64,
    /// Spectra are upsampled until the effective rate reaches this, Hz.
    pub min_sample_rate_hz: f64,
    #[serde(alias = "debugFile")]
    pub debug_file: Option<PathBuf>,
    /// Solve with only the strongest captures of a cohort, never fewer than
    /// [`TdoaParams::min_nodes`].
    pub max_solve_nodes: Option<usize>,
    pub fft_backend: FftBackend,
    /// Seeds the optimiser jitter; entropy when absent.
    pub seed: Option<u64>,
    pub heatmap: HeatmapGrid,
    pub reconnect: ReconnectPolicy,
}

impl Default for TdoaParams {
    fn default() -> Self {
        Self {
            heat_map_on: true,
            three_dimensions: false,
            rms_error_m: 100.0,
            bad_threshold: 10.0,
            min_altitude_m: 0.0,
            min_sample_rate_hz: 10e6,
            debug_file: None,
            max_solve_nodes: None,
            fft_backend: FftBackend::default(),
            seed: None,
            heatmap: HeatmapGrid::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TdoaParams {
    /// Smallest cohort that can be solved in the configured mode.
    pub fn min_nodes(&self) -> usize {
        if self.three_dimensions {
            4
        } else {
            3
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdoaConfig {
    pub nodes: Vec<NodeConfig>,
    pub tdoa: TdoaParams,
}

impl TdoaConfig {
    pub fn from_json_str(contents: &str) -> CoreResult<Self> {
        let config: TdoaConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.nodes.is_empty() {
            return Err(CoreError::InvalidConfig("no nodes configured".into()));
        }
        for node in &self.nodes {
            if node.bandwidth_hz == 0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{}:{} has zero bandwidth",
                    node.host, node.port
                )));
            }
            if node.measure_interval_ms == 0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{}:{} has zero measurement interval",
                    node.host, node.port
                )));
            }
        }
        if let Some(limit) = self.tdoa.max_solve_nodes {
            if limit < self.tdoa.min_nodes() {
                return Err(CoreError::InvalidConfig(format!(
                    "max_solve_nodes {} is below the {} needed to solve",
                    limit,
                    self.tdoa.min_nodes()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_document_takes_defaults() {
        let config = TdoaConfig::from_json_str(
            r#"{
                "nodes": [
                    { "host": "10.0.0.5", "test_mode": true,
                      "location": { "lat": 51.5, "lon": -0.1 } }
                ],
                "tdoa": { "heat_map_on": false, "fft_backend": "planner" }
            }"#,
        )
        .unwrap();

        let node = &config.nodes[0];
        assert_eq!(node.port, 9999);
        assert_eq!(node.samples, 1024);
        assert_eq!(node.location.alt, 0.0);
        assert!(!config.tdoa.heat_map_on);
        assert_eq!(config.tdoa.fft_backend, FftBackend::Planner);
        assert_eq!(config.tdoa.bad_threshold, 10.0);
        assert_eq!(config.tdoa.min_nodes(), 3);
    }

    #[test]
    fn validation_rejects_empty_and_degenerate_nodes() {
        assert!(matches!(
            TdoaConfig::default().validate(),
            Err(CoreError::InvalidConfig(_))
        ));

        let config = TdoaConfig {
            nodes: vec![NodeConfig {
                bandwidth_hz: 0,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TdoaConfig {
            nodes: vec![NodeConfig::default()],
            tdoa: TdoaParams {
                three_dimensions: true,
                max_solve_nodes: Some(3),
                ..Default::default()
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn camel_case_document_loads() {
        let config = TdoaConfig::from_json_str(
            r#"{
                "nodes": [
                    { "host": "10.0.0.7", "port": 10001, "testMode": true,
                      "nexusNode": true, "lat": 51.5, "lon": -0.1, "alt": 12.0,
                      "bandwidth_Hz": 2000000, "frequency_Hz": 868000000,
                      "measureInterval_ms": 500, "minSampleRate": 40000000.0,
                      "transmitter": { "lat": 51.51, "lon": -0.11 } }
                ],
                "tdoa": { "heatMapOn": false, "threeDimensions": true,
                          "rmsError": 50.0, "badThreshold": 3.0,
                          "debugFile": "solves.csv" }
            }"#,
        )
        .unwrap();

        let node = &config.nodes[0];
        assert!(node.test_mode);
        assert!(node.nexus_node);
        assert_eq!(node.location, GeoPoint::new(51.5, -0.1, 12.0));
        assert_eq!(node.bandwidth_hz, 2_000_000);
        assert_eq!(node.frequency_hz, 868_000_000);
        assert_eq!(node.measure_interval_ms, 500);
        assert_eq!(node.min_sample_rate_hz, Some(40e6));
        assert_eq!(node.transmitter, Some(GeoPoint::new(51.51, -0.11, 0.0)));

        let tdoa = &config.tdoa;
        assert!(!tdoa.heat_map_on);
        assert!(tdoa.three_dimensions);
        assert_eq!(tdoa.rms_error_m, 50.0);
        assert_eq!(tdoa.bad_threshold, 3.0);
        assert_eq!(tdoa.debug_file, Some(PathBuf::from("solves.csv")));
    }

    #[test]
    fn flat_position_overrides_nested_location() {
        let config = TdoaConfig::from_json_str(
            r#"{ "nodes": [ { "location": { "lat": 1.0, "lon": 2.0, "alt": 3.0 }, "lat": 4.0 } ] }"#,
        )
        .unwrap();
        assert_eq!(config.nodes[0].location, GeoPoint::new(4.0, 2.0, 3.0));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            TdoaConfig::from_json_str(r#"{ "nodes": [ { "test_mod": true } ] }"#),
            Err(CoreError::Parse(_))
        ));
        assert!(matches!(
            TdoaConfig::from_json_str(r#"{ "nodes": [ {} ], "tdoa": { "heatmapOn": false } }"#),
            Err(CoreError::Parse(_))
        ));
    }

    #[test]
    fn malformed_json_surfaces_parse_error() {
        assert!(matches!(
            TdoaConfig::from_json_str("{ nodes: oops"),
            Err(CoreError::Parse(_))
        ));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay(10), Duration::from_millis(8_000));
        assert_eq!(policy.delay(200), Duration::from_millis(8_000));
    }
}
