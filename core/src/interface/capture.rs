use crate::geo::Location;
use crate::math::fft::largest_power_of_two_at_most;
use crate::math::stats::StatsHelper;
use num_complex::Complex64;

/// Raw sample clock assumed when a node does not report one, MHz.
pub const DEFAULT_SAMPLE_RATE_MHZ: i32 = 40;

/// One observation as delivered by a node link, before any processing.
///
/// GPS fields keep the device units: micro-degrees and millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCapture {
    pub iq: Vec<Complex64>,
    pub sample_rate_mhz: i32,
    pub decimation: i32,
    pub gps_fix: i32,
    pub lat_udeg: i32,
    pub lon_udeg: i32,
    pub alt_mm: i32,
    pub gain: i32,
    pub timestamp_ns: i64,
}

impl Default for RawCapture {
    fn default() -> Self {
        Self {
            iq: Vec::new(),
            sample_rate_mhz: DEFAULT_SAMPLE_RATE_MHZ,
            decimation: 0,
            gps_fix: 0,
            lat_udeg: 0,
            lon_udeg: 0,
            alt_mm: 0,
            gain: 0,
            timestamp_ns: 0,
        }
    }
}

/// A node observation owned by exactly one stage of the pipeline at a time.
///
/// `iq` holds time-domain samples until the worker transforms it, after which
/// it holds the spectrum. Not `Clone`: ownership moves from the
/// worker through the queue to the aggregator.
#[derive(Debug)]
pub struct Capture {
    pub host: String,
    pub port: u16,
    pub iq: Vec<Complex64>,
    pub power: f64,
    pub sample_rate_mhz: i32,
    pub decimation: i32,
    pub gps_fix: i32,
    pub lat_udeg: i32,
    pub lon_udeg: i32,
    pub alt_mm: i32,
    pub gain: i32,
    pub timestamp_ns: i64,
    conjugated: bool,
}

impl Capture {
    /// Converts a link delivery into a capture.
    ///
    /// Only the trailing power-of-two run of samples is kept, so leading
    /// warm-up samples are discarded. Power is the RMS amplitude with the
    /// reported receiver gain removed.
    pub fn from_raw(raw: RawCapture, host: &str, port: u16) -> Self {
        let RawCapture {
            mut iq,
            sample_rate_mhz,
            decimation,
            gps_fix,
            lat_udeg,
            lon_udeg,
            alt_mm,
            gain,
            timestamp_ns,
        } = raw;

        let keep = largest_power_of_two_at_most(iq.len());
        iq.drain(..iq.len() - keep);
        let gain_factor = 10f64.powf(gain as f64 / 160.0);
        let power = StatsHelper::rms_complex(&iq) / gain_factor;

        Self {
            host: host.to_string(),
            port,
            iq,
            power,
            sample_rate_mhz,
            decimation,
            gps_fix,
            lat_udeg,
            lon_udeg,
            alt_mm,
            gain,
            timestamp_ns,
            conjugated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iq.is_empty()
    }

    /// Position reported by the node's own GPS fix.
    pub fn location(&self) -> Location {
        Location::from_spherical(
            self.lat_udeg as f64 / 1e6,
            self.lon_udeg as f64 / 1e6,
            self.alt_mm as f64 / 1e3,
        )
    }

    /// Cohort bucket: the timestamp quantised to one millisecond.
    pub fn cohort_key(&self) -> i64 {
        self.timestamp_ns.div_euclid(1_000_000)
    }

    /// Effective sample rate after decimation, Hz; 0 when undefined.
    pub fn effective_sample_rate_hz(&self) -> f64 {
        if self.decimation == 0 {
            return 0.0;
        }
        1e6 * self.sample_rate_mhz as f64 / self.decimation as f64
    }

    /// Spacing between samples, nanoseconds.
    pub fn sample_period_ns(&self) -> f64 {
        (self.decimation as f64 * 1000.0) / self.sample_rate_mhz as f64
    }

    /// Conjugates the held spectrum in place, once.
    pub fn conjugate(&mut self) {
        if !self.conjugated {
            crate::math::fft::conjugate(&mut self.iq);
            self.conjugated = true;
        }
    }

    pub fn is_conjugated(&self) -> bool {
        self.conjugated
    }
}
