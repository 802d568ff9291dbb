use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Length policy violations reported by the transforms.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FftError {
    #[error("transform length {0} is not a power of two")]
    NonPowerOfTwo(usize),
}

/// Forward/inverse complex transform applied in place.
///
/// Implementations may keep per-instance caches, so each thread holds its
/// own instance.
pub trait SpectralTransform: Send {
    fn transform(&mut self, signal: &mut [Complex64]) -> Result<(), FftError>;

    /// Inverse transform: conjugate, forward transform, conjugate, scale by 1/N.
    fn invert(&mut self, signal: &mut [Complex64]) -> Result<(), FftError> {
        conjugate(signal);
        self.transform(signal)?;
        conjugate(signal);
        let scale = 1.0 / signal.len().max(1) as f64;
        signal.iter_mut().for_each(|value| *value *= scale);
        Ok(())
    }
}

/// Selects which transform implementation the pipeline instantiates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FftBackend {
    #[default]
    CooleyTukey,
    Planner,
}

impl FftBackend {
    pub fn build(self) -> Box<dyn SpectralTransform> {
        match self {
            FftBackend::CooleyTukey => Box::new(FftEngine::new()),
            FftBackend::Planner => Box::new(PlannedFft::new()),
        }
    }
}

/// Recursive radix-2 Cooley-Tukey transform with a cached twiddle table.
///
/// The table is sized for the largest transform seen so far and never
/// shrinks; smaller power-of-two sizes stride through it.
pub struct FftEngine {
    twiddles: Vec<Complex64>,
}

impl FftEngine {
    pub fn new() -> Self {
        Self {
            twiddles: Vec::new(),
        }
    }

    /// Largest transform length the twiddle table currently covers.
    pub fn cached_len(&self) -> usize {
        self.twiddles.len() * 2
    }

    fn prepare(&mut self, len: usize) {
        if len / 2 <= self.twiddles.len() {
            return;
        }
        self.twiddles = (0..len / 2)
            .map(|k| Complex64::from_polar(1.0, -2.0 * PI * k as f64 / len as f64))
            .collect();
    }

    fn cooley_tukey(&self, signal: &mut [Complex64]) {
        let n = signal.len();
        if n <= 1 {
            return;
        }

        let half = n / 2;
        let mut even: Vec<Complex64> = signal.iter().step_by(2).copied().collect();
        let mut odd: Vec<Complex64> = signal.iter().skip(1).step_by(2).copied().collect();
        self.cooley_tukey(&mut even);
        self.cooley_tukey(&mut odd);

        let stride = self.cached_len() / n;
        for k in 0..half {
            let t = self.twiddles[k * stride] * odd[k];
            signal[k] = even[k] + t;
            signal[k + half] = even[k] - t;
        }
    }
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTransform for FftEngine {
    fn transform(&mut self, signal: &mut [Complex64]) -> Result<(), FftError> {
        check_len(signal.len())?;
        self.prepare(signal.len());
        self.cooley_tukey(signal);
        Ok(())
    }
}

/// Wraps `rustfft` plans so each length is planned once per instance.
pub struct PlannedFft {
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
    scratch: Vec<Complex64>,
}

impl PlannedFft {
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    fn plan(&mut self, len: usize) -> Arc<dyn Fft<f64>> {
        self.plans
            .entry(len)
            .or_insert_with(|| FftPlanner::new().plan_fft_forward(len))
            .clone()
    }
}

impl Default for PlannedFft {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTransform for PlannedFft {
    fn transform(&mut self, signal: &mut [Complex64]) -> Result<(), FftError> {
        check_len(signal.len())?;
        if signal.len() <= 1 {
            return Ok(());
        }
        let fft = self.plan(signal.len());
        self.scratch
            .resize(fft.get_inplace_scratch_len(), Complex64::zero());
        fft.process_with_scratch(signal, &mut self.scratch);
        Ok(())
    }
}

fn check_len(len: usize) -> Result<(), FftError> {
    if len > 1 && !len.is_power_of_two() {
        return Err(FftError::NonPowerOfTwo(len));
    }
    Ok(())
}

pub fn conjugate(signal: &mut [Complex64]) {
    signal.iter_mut().for_each(|value| *value = value.conj());
}

/// Symmetric four-term Blackman-Harris window applied in place.
pub fn blackman_harris(signal: &mut [Complex64]) {
    let len = signal.len();
    if len < 2 {
        return;
    }
    let span = (len - 1) as f64;
    for i in 0..len / 2 {
        let phase = 2.0 * PI * i as f64 / span;
        let window = 0.35875 - 0.48829 * phase.cos() + 0.14128 * (2.0 * phase).cos()
            - 0.01168 * (3.0 * phase).cos();
        signal[i] *= window;
        signal[len - 1 - i] *= window;
    }
}

pub fn magnitudes(signal: &[Complex64]) -> Vec<f64> {
    signal.iter().map(|value| value.norm()).collect()
}

/// Largest power of two not exceeding `len` (0 for an empty buffer).
pub fn largest_power_of_two_at_most(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - len.leading_zeros())
    }
}
