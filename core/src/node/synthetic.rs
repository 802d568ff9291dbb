//! Hardware-free capture source used in test mode.
//!
//! Every node draws the same noise waveform for a given timestamp and delays
//! it by its own propagation time to the simulated transmitter, so the
//! correlator sees exactly the delays a real deployment would.

use super::worker::NodeSettings;
use crate::geo::SPEED_OF_LIGHT_M_S;
use crate::interface::capture::DEFAULT_SAMPLE_RATE_MHZ;
use crate::interface::{RawCapture, SampleConfig};
use crate::math::fft::{largest_power_of_two_at_most, FftError, SpectralTransform};
use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

/// GPS fix quality reported by synthetic captures (3D fix).
pub const SYNTHETIC_GPS_FIX: i32 = 2;

/// Paces synthetic captures on a wall-clock grid shared by all nodes, so
/// captures from different nodes land in the same cohort.
#[derive(Debug, Default)]
pub struct SyntheticSource {
    grid_ns: Option<i64>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts the grid at the current interval boundary.
    pub fn reset(&mut self, interval_ms: u32) {
        let interval = interval_ns(interval_ms);
        self.grid_ns = Some(now_ns().div_euclid(interval) * interval);
    }

    /// Advances to the next grid instant (epoch nanoseconds).
    ///
    /// A grid that has fallen more than one interval behind the clock jumps
    /// forward to the next boundary instead of replaying missed slots.
    pub fn next_slot(&mut self, interval_ms: u32) -> i64 {
        let interval = interval_ns(interval_ms);
        let now = now_ns();
        let next_boundary = (now.div_euclid(interval) + 1) * interval;
        let slot = match self.grid_ns {
            Some(grid) if grid + interval >= now - interval => grid + interval,
            _ => next_boundary,
        };
        self.grid_ns = Some(slot);
        slot
    }
}

/// Builds the capture a node at `settings.config.location` would record at
/// `timestamp_ns` from the configured transmitter.
///
/// The waveform is uniform complex noise seeded by the timestamp. Its
/// amplitude falls as 1/(1+distance) so received power ranks nodes by range,
/// and the flight time is applied as a linear phase ramp across the band.
pub fn synthesize(
    settings: &NodeSettings,
    timestamp_ns: i64,
    fft: &mut dyn SpectralTransform,
) -> Result<RawCapture, FftError> {
    let config = &settings.config;
    let sampling = SampleConfig::for_bandwidth(config.bandwidth_hz, config.samples);
    let len = largest_power_of_two_at_most(config.samples as usize);

    let position = config.location.to_location();
    let transmitter = config
        .transmitter
        .map(|tx| tx.to_location())
        .unwrap_or(position);
    let metres = position.distance(&transmitter);
    let amplitude = 1.0 / (1.0 + metres);
    let flight_s = metres / SPEED_OF_LIGHT_M_S;

    let mut rng = StdRng::seed_from_u64(timestamp_ns as u64);
    let mut iq: Vec<Complex64> = (0..len)
        .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)) * amplitude)
        .collect();

    fft.transform(&mut iq)?;
    iq.rotate_right(len / 2);
    let bandwidth = 1e6 * DEFAULT_SAMPLE_RATE_MHZ as f64 / sampling.decimation as f64;
    let bin = bandwidth / len.max(1) as f64;
    let lowest = config.frequency_hz as f64 - bandwidth / 2.0;
    for (i, value) in iq.iter_mut().enumerate() {
        let freq = lowest + i as f64 * bin;
        *value *= Complex64::from_polar(1.0, -2.0 * PI * freq * flight_s);
    }
    iq.rotate_left(len / 2);
    fft.invert(&mut iq)?;

    Ok(RawCapture {
        iq,
        sample_rate_mhz: DEFAULT_SAMPLE_RATE_MHZ,
        decimation: sampling.decimation as i32,
        gps_fix: SYNTHETIC_GPS_FIX,
        lat_udeg: (config.location.lat * 1e6).round() as i32,
        lon_udeg: (config.location.lon * 1e6).round() as i32,
        alt_mm: (config.location.alt * 1e3).round() as i32,
        gain: 0,
        timestamp_ns,
    })
}

fn interval_ns(interval_ms: u32) -> i64 {
    i64::from(interval_ms.max(1)) * 1_000_000
}

pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeoPoint, NodeConfig};
    use crate::interface::Capture;
    use crate::math::fft::FftEngine;

    fn settings(lat: f64, lon: f64, transmitter: GeoPoint) -> NodeSettings {
        NodeSettings::new(
            NodeConfig {
                test_mode: true,
                bandwidth_hz: 5_000_000,
                samples: 256,
                location: GeoPoint::new(lat, lon, 0.0),
                transmitter: Some(transmitter),
                ..Default::default()
            },
            10e6,
        )
    }

    #[test]
    fn capture_reports_configured_position_and_geometry() {
        let tx = GeoPoint::new(51.5, -0.1, 0.0);
        let raw = synthesize(&settings(51.51, -0.12, tx), 5_000_000, &mut FftEngine::new()).unwrap();

        assert_eq!(raw.iq.len(), 256);
        assert_eq!(raw.decimation, 8);
        assert_eq!(raw.gps_fix, SYNTHETIC_GPS_FIX);
        assert_eq!(raw.lat_udeg, 51_510_000);
        assert_eq!(raw.lon_udeg, -120_000);
        assert_eq!(raw.timestamp_ns, 5_000_000);
    }

    #[test]
    fn nearer_nodes_report_more_power() {
        let tx = GeoPoint::new(51.5, -0.1, 0.0);
        let mut fft = FftEngine::new();
        let near = synthesize(&settings(51.501, -0.1, tx), 0, &mut fft).unwrap();
        let far = synthesize(&settings(51.55, -0.1, tx), 0, &mut fft).unwrap();

        let near = Capture::from_raw(near, "near", 1);
        let far = Capture::from_raw(far, "far", 2);
        assert!(near.power > far.power);
    }

    #[test]
    fn co_located_node_sees_undelayed_waveform() {
        let tx = GeoPoint::new(10.0, 10.0, 0.0);
        let mut fft = FftEngine::new();
        let a = synthesize(&settings(10.0, 10.0, tx), 42, &mut fft).unwrap();
        let b = synthesize(&settings(10.0, 10.0, tx), 42, &mut fft).unwrap();
        assert_eq!(a.iq, b.iq);

        let mut rng = StdRng::seed_from_u64(42);
        let first = Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        assert!((a.iq[0] - first).norm() < 1e-9);
    }

    #[test]
    fn slots_advance_by_interval() {
        let mut source = SyntheticSource::new();
        source.reset(5);
        let first = source.next_slot(5);
        let second = source.next_slot(5);
        assert_eq!(second - first, 5_000_000);
        assert_eq!(first % 5_000_000, 0);
    }
}
