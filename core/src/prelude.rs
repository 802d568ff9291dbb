pub use crate::config::{NodeConfig, TdoaConfig, TdoaParams};
pub use crate::geo::Location;
pub use crate::interface::{Capture, RawCapture, TdoaResult};
use crate::math::FftError;

/// Common error type for configuration and pipeline setup.
///
/// Per-cohort and per-observation failures are not errors: they are logged,
/// counted and dropped.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Fft(#[from] FftError),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("runtime failure: {0}")]
    Runtime(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
