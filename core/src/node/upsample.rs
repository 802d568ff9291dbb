use num_complex::Complex64;
use rustfft::num_traits::Zero;

/// Largest interpolation factor ever applied to one capture.
pub const MAX_INTERPOLATION: usize = 1 << 12;

/// Smallest power-of-two factor lifting `rate_hz` to at least `min_rate_hz`.
pub fn interpolation_factor(rate_hz: f64, min_rate_hz: f64) -> usize {
    if !(rate_hz > 0.0) {
        return 1;
    }
    let mut factor = 1;
    let mut rate = rate_hz;
    while rate < min_rate_hz && factor < MAX_INTERPOLATION {
        factor *= 2;
        rate *= 2.0;
    }
    factor
}

/// Zero-pads a spectrum so its inverse transform is resampled `factor` times.
///
/// Equivalent to centring DC, zero-extending both sides, and shifting back:
/// positive frequencies stay at the start, negative frequencies move to the
/// end of the longer buffer. The Nyquist bin is split in half across the two
/// seams so its energy is not doubled. Amplitudes are scaled by `factor` to
/// compensate for the longer inverse transform.
pub fn upsample_spectrum(spectrum: &mut Vec<Complex64>, factor: usize) {
    let n = spectrum.len();
    if factor <= 1 || n == 0 {
        return;
    }

    let total = n * factor;
    let mut padded = vec![Complex64::zero(); total];
    if n == 1 {
        padded[0] = spectrum[0];
    } else {
        let half = n / 2;
        let negatives = n - half - 1;
        padded[..half].copy_from_slice(&spectrum[..half]);
        padded[total - negatives..].copy_from_slice(&spectrum[half + 1..]);
        let nyquist = spectrum[half] / 2.0;
        padded[half] = nyquist;
        padded[total - half] = nyquist;
    }

    let scale = factor as f64;
    padded.iter_mut().for_each(|value| *value *= scale);
    *spectrum = padded;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fft::{FftEngine, SpectralTransform};
    use std::f64::consts::PI;

    #[test]
    fn factor_is_smallest_sufficient_power_of_two() {
        assert_eq!(interpolation_factor(5e6, 10e6), 2);
        assert_eq!(interpolation_factor(5e6, 12e6), 4);
        assert_eq!(interpolation_factor(20e6, 10e6), 1);
        assert_eq!(interpolation_factor(0.0, 10e6), 1);
        assert_eq!(interpolation_factor(1.0, f64::INFINITY), MAX_INTERPOLATION);
    }

    #[test]
    fn band_limited_signal_is_interpolated() {
        let n = 32;
        let factor = 4;
        let tone = |t: f64| (2.0 * PI * 3.0 * t / n as f64).cos() + 0.5 * (2.0 * PI * 5.0 * t / n as f64).sin();

        let mut engine = FftEngine::new();
        let mut spectrum: Vec<Complex64> = (0..n).map(|t| Complex64::new(tone(t as f64), 0.0)).collect();
        engine.transform(&mut spectrum).unwrap();
        upsample_spectrum(&mut spectrum, factor);
        assert_eq!(spectrum.len(), n * factor);
        engine.invert(&mut spectrum).unwrap();

        for (m, value) in spectrum.iter().enumerate() {
            let expected = tone(m as f64 / factor as f64);
            assert!((value.re - expected).abs() < 1e-9, "sample {m}");
            assert!(value.im.abs() < 1e-9);
        }
    }

    #[test]
    fn nyquist_energy_is_split_not_doubled() {
        let n = 8;
        let mut spectrum: Vec<Complex64> = (0..n)
            .map(|t| Complex64::new(if t % 2 == 0 { 1.0 } else { -1.0 }, 0.0))
            .collect();
        let mut engine = FftEngine::new();
        engine.transform(&mut spectrum).unwrap();
        upsample_spectrum(&mut spectrum, 2);
        engine.invert(&mut spectrum).unwrap();

        for (m, value) in spectrum.iter().enumerate() {
            let expected = (PI * m as f64 / 2.0).cos();
            assert!((value.re - expected).abs() < 1e-9, "sample {m}");
        }
    }

    #[test]
    fn unit_factor_leaves_spectrum_untouched() {
        let mut spectrum = vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)];
        let before = spectrum.clone();
        upsample_spectrum(&mut spectrum, 1);
        assert_eq!(spectrum, before);
    }
}
