use crate::interface::Capture;
use crate::math::fft::{magnitudes, FftError, SpectralTransform};
use crate::math::stats::StatsHelper;
use std::ptr;

/// Sentinel delay for a rejected correlation.
pub const NO_CORRELATION: i32 = i32::MAX;
/// Largest capture timestamp difference accepted for a pair, nanoseconds.
pub const MAX_TIMESTAMP_SKEW_NS: i64 = 100;
/// Weakest correlation peak accepted, as a multiple of the mean magnitude.
pub const MIN_PEAK_TO_MEAN: f64 = 5.0;

/// Why a capture pair produced no usable delay.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CorrelationReject {
    #[error("capture reports zero decimation")]
    ZeroDecimation,
    #[error("spectrum lengths differ ({master} vs {slave})")]
    LengthMismatch { master: usize, slave: usize },
    #[error("capture timestamps differ by {0} ns")]
    TimestampSkew(i64),
    #[error("peak-to-mean ratio {0:.2} too weak")]
    WeakPeak(f64),
    #[error(transparent)]
    Transform(#[from] FftError),
}

/// Arrival delay of `slave` relative to `master`, nanoseconds.
///
/// Both captures hold spectra of equal length. The master may already be
/// conjugated; otherwise it is conjugated on the fly. Passing the same
/// capture twice yields zero without any work.
pub fn correlate(
    master: &Capture,
    slave: &Capture,
    fft: &mut dyn SpectralTransform,
) -> Result<i32, CorrelationReject> {
    if ptr::eq(master, slave) {
        return Ok(0);
    }
    if master.decimation == 0 || slave.decimation == 0 {
        return Err(CorrelationReject::ZeroDecimation);
    }
    if master.iq.len() != slave.iq.len() {
        return Err(CorrelationReject::LengthMismatch {
            master: master.iq.len(),
            slave: slave.iq.len(),
        });
    }
    let skew = slave.timestamp_ns - master.timestamp_ns;
    if skew.abs() > MAX_TIMESTAMP_SKEW_NS {
        return Err(CorrelationReject::TimestampSkew(skew));
    }

    let mut product = slave.iq.clone();
    if master.is_conjugated() {
        product.iter_mut().zip(&master.iq).for_each(|(s, m)| *s *= m);
    } else {
        product.iter_mut().zip(&master.iq).for_each(|(s, m)| *s *= m.conj());
    }
    fft.invert(&mut product)?;

    let len = product.len();
    product.rotate_right(len / 2);
    let lags = magnitudes(&product);

    let ratio = StatsHelper::peak_to_mean(&lags);
    let peak = match StatsHelper::peak(&lags) {
        Some((index, _)) if ratio >= MIN_PEAK_TO_MEAN => index,
        _ => return Err(CorrelationReject::WeakPeak(ratio)),
    };

    let offset = peak as f64 - (len / 2) as f64;
    Ok((offset * master.sample_period_ns()).round() as i32)
}

/// [`correlate`] with rejections folded into [`NO_CORRELATION`].
pub fn correlate_ns(master: &Capture, slave: &Capture, fft: &mut dyn SpectralTransform) -> i32 {
    correlate(master, slave, fft).unwrap_or(NO_CORRELATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::RawCapture;
    use crate::math::fft::FftEngine;
    use num_complex::Complex64;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise(len: usize, seed: u64) -> Vec<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    fn spectrum(samples: Vec<Complex64>, timestamp_ns: i64, decimation: i32) -> Capture {
        let raw = RawCapture {
            iq: samples,
            decimation,
            timestamp_ns,
            ..Default::default()
        };
        let mut capture = Capture::from_raw(raw, "node", 1);
        FftEngine::new().transform(&mut capture.iq).unwrap();
        capture
    }

    fn delayed(samples: &[Complex64], shift: usize) -> Vec<Complex64> {
        let mut shifted = samples.to_vec();
        shifted.rotate_right(shift);
        shifted
    }

    #[test]
    fn recovers_circular_delay() {
        let base = noise(256, 1);
        let master = spectrum(base.clone(), 0, 8);
        let later = spectrum(delayed(&base, 7), 0, 8);
        let earlier = spectrum(delayed(&base, 256 - 3), 0, 8);
        let mut fft = FftEngine::new();

        assert_eq!(correlate(&master, &later, &mut fft), Ok(7 * 200));
        assert_eq!(correlate(&master, &earlier, &mut fft), Ok(-3 * 200));
    }

    #[test]
    fn conjugated_master_gives_same_delay() {
        let base = noise(128, 2);
        let mut master = spectrum(base.clone(), 0, 4);
        let slave = spectrum(delayed(&base, 5), 50, 4);
        let mut fft = FftEngine::new();

        let plain = correlate(&master, &slave, &mut fft);
        master.conjugate();
        assert_eq!(correlate(&master, &slave, &mut fft), plain);
        assert_eq!(plain, Ok(5 * 100));
    }

    #[test]
    fn identical_capture_is_zero_delay() {
        let mut master = spectrum(noise(64, 3), 0, 0);
        master.conjugate();
        assert_eq!(correlate(&master, &master, &mut FftEngine::new()), Ok(0));
    }

    #[test]
    fn rejects_invalid_pairs_with_sentinel() {
        let base = noise(64, 4);
        let master = spectrum(base.clone(), 0, 8);
        let mut fft = FftEngine::new();

        let undecimated = spectrum(base.clone(), 0, 0);
        assert_eq!(
            correlate(&master, &undecimated, &mut fft),
            Err(CorrelationReject::ZeroDecimation)
        );
        let slave = spectrum(delayed(&base, 2), 0, 8);
        assert_eq!(
            correlate(&undecimated, &slave, &mut fft),
            Err(CorrelationReject::ZeroDecimation)
        );
        assert_eq!(correlate_ns(&undecimated, &slave, &mut fft), NO_CORRELATION);

        let short = spectrum(noise(32, 5), 0, 8);
        assert!(matches!(
            correlate(&master, &short, &mut fft),
            Err(CorrelationReject::LengthMismatch { master: 64, slave: 32 })
        ));

        let late = spectrum(base.clone(), 101, 8);
        assert_eq!(
            correlate(&master, &late, &mut fft),
            Err(CorrelationReject::TimestampSkew(101))
        );
        assert_eq!(correlate_ns(&master, &late, &mut fft), NO_CORRELATION);

        let edge = spectrum(base, -100, 8);
        assert_eq!(correlate(&master, &edge, &mut fft), Ok(0));
    }

    #[test]
    fn unrelated_noise_has_weak_peak() {
        let master = spectrum(noise(256, 6), 0, 8);
        let stranger = spectrum(noise(256, 7), 0, 8);
        assert!(matches!(
            correlate(&master, &stranger, &mut FftEngine::new()),
            Err(CorrelationReject::WeakPeak(_))
        ));
    }
}
