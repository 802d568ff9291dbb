use super::capture::RawCapture;
use crate::config::NodeConfig;

/// Reference clock the node radios decimate from, Hz.
pub const REFERENCE_CLOCK_HZ: f64 = 40e6;

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("not connected to {0}")]
    NotConnected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed capture: {0}")]
    Malformed(String),
}

/// Capture geometry requested from a node when streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleConfig {
    pub bandwidth_hz: u64,
    pub samples: u32,
    pub decimation: u32,
}

impl SampleConfig {
    /// Decimation is the reference clock divided by the bandwidth, rounded.
    pub fn for_bandwidth(bandwidth_hz: u64, samples: u32) -> Self {
        let decimation = (REFERENCE_CLOCK_HZ / bandwidth_hz.max(1) as f64).round() as u32;
        Self {
            bandwidth_hz,
            samples,
            decimation: decimation.max(1),
        }
    }
}

/// Session with a single sensor node.
///
/// Implementations keep any per-connection counters on the session itself
/// and allow at most one outstanding request.
pub trait NodeLink: Send {
    fn connect(&mut self, host: &str, port: u16) -> bool;
    fn is_connected(&self) -> bool;
    fn send_start_capture(
        &mut self,
        frequency_hz: u64,
        config: &SampleConfig,
        repeat_interval_ms: u32,
    ) -> Result<(), LinkError>;
    fn receive_capture(&mut self) -> Result<RawCapture, LinkError>;
    fn disconnect(&mut self) {}
}

/// Builds one link per live node.
pub trait LinkFactory: Send + Sync {
    fn create(&self, node: &NodeConfig) -> Box<dyn NodeLink>;
}

impl<F> LinkFactory for F
where
    F: Fn(&NodeConfig) -> Box<dyn NodeLink> + Send + Sync,
{
    fn create(&self, node: &NodeConfig) -> Box<dyn NodeLink> {
        self(node)
    }
}
