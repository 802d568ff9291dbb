pub mod fft;
pub mod simplex;
pub mod stats;

pub use fft::{FftBackend, FftEngine, FftError, PlannedFft, SpectralTransform};
pub use simplex::Simplex;
pub use stats::StatsHelper;
