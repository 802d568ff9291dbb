use num_complex::Complex64;

pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// RMS magnitude of a complex buffer.
    pub fn rms_complex(samples: &[Complex64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|v| v.norm_sqr()).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Index and value of the first maximum.
    pub fn peak(samples: &[f64]) -> Option<(usize, f64)> {
        samples
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (idx, value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((idx, value)),
            })
    }

    /// Peak value divided by the mean; 0 when the mean vanishes.
    pub fn peak_to_mean(samples: &[f64]) -> f64 {
        let mean = Self::mean(samples);
        match Self::peak(samples) {
            Some((_, peak)) if mean > 0.0 => peak / mean,
            _ => 0.0,
        }
    }
}
