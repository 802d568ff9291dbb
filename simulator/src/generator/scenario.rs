use anyhow::bail;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tdoacore::config::{GeoPoint, NodeConfig};

/// Port of the first scenario node; later nodes count up from it.
pub const FIRST_PORT: u16 = 9999;

/// Synthetic deployment: test-mode nodes scattered around one transmitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub transmitter: GeoPoint,
    pub nodes: usize,
    /// Nominal node distance from the transmitter, metres.
    pub spacing_m: f64,
    /// Relative scatter applied to distance and bearing.
    pub jitter: f64,
    pub seed: u64,
    pub frequency_hz: u64,
    pub bandwidth_hz: u64,
    pub samples: u32,
    pub measure_interval_ms: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            transmitter: GeoPoint::new(51.5, -0.1, 0.0),
            nodes: 4,
            spacing_m: 3_000.0,
            jitter: 0.25,
            seed: 0,
            frequency_hz: 433_920_000,
            bandwidth_hz: 5_000_000,
            samples: 1024,
            measure_interval_ms: 1000,
        }
    }
}

/// Node configurations ringed around the scenario transmitter.
///
/// Bearings are spread evenly so the transmitter sits inside the network;
/// the seeded jitter keeps the geometry from being perfectly symmetric.
pub fn build_nodes(scenario: &ScenarioConfig) -> anyhow::Result<Vec<NodeConfig>> {
    if scenario.nodes < 3 {
        bail!("a scenario needs at least 3 nodes, got {}", scenario.nodes);
    }
    if scenario.spacing_m <= 0.0 {
        bail!("scenario spacing must be positive");
    }
    let last_port = u16::try_from(scenario.nodes - 1)
        .ok()
        .and_then(|offset| FIRST_PORT.checked_add(offset));
    if last_port.is_none() {
        bail!("{} scenario nodes do not fit the port range", scenario.nodes);
    }

    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let jitter = scenario.jitter.clamp(0.0, 0.9);
    let sector = 360.0 / scenario.nodes as f64;
    let transmitter = scenario.transmitter.to_location();

    let nodes = (0..scenario.nodes)
        .map(|index| {
            let bearing = sector * (index as f64 + rng.gen_range(-jitter..=jitter) / 2.0);
            let distance = scenario.spacing_m * (1.0 + rng.gen_range(-jitter..=jitter));
            let position = transmitter.moved(distance, bearing);
            NodeConfig {
                host: format!("sim-{}", index),
                port: FIRST_PORT + index as u16,
                frequency_hz: scenario.frequency_hz,
                bandwidth_hz: scenario.bandwidth_hz,
                samples: scenario.samples,
                measure_interval_ms: scenario.measure_interval_ms,
                test_mode: true,
                location: GeoPoint::new(position.lat(), position.lon(), scenario.transmitter.alt),
                transmitter: Some(scenario.transmitter),
                ..Default::default()
            }
        })
        .collect();
    Ok(nodes)
}
