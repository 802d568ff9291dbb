//! Core of the TDOA multilateration pipeline.
//!
//! Node workers turn raw IQ captures into upsampled spectra, the aggregator
//! groups them into time cohorts, correlates each against the strongest
//! capture and solves for the emitter position and its confidence ellipse.

pub mod config;
pub mod geo;
pub mod interface;
pub mod math;
pub mod node;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use pipeline::TdoaSystem;
pub use prelude::{CoreError, CoreResult};
