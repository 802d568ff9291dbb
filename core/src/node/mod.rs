//! Per-node acquisition: link or synthetic source, spectral preprocessing,
//! and hand-off to the shared capture queue.

pub mod synthetic;
pub mod upsample;
pub mod worker;

pub use synthetic::{synthesize, SyntheticSource};
pub use upsample::{interpolation_factor, upsample_spectrum};
pub use worker::{preprocess, CaptureSource, LinkState, NodeHandle, NodeSettings, NodeWorker};
