use super::synthetic::{synthesize, SyntheticSource};
use super::upsample::{interpolation_factor, upsample_spectrum};
use crate::config::{NodeConfig, ReconnectPolicy};
use crate::interface::{Capture, LinkError, NodeLink, RawCapture, SampleConfig};
use crate::math::fft::{FftBackend, FftError, SpectralTransform};
use crate::pipeline::queue::SafeQueue;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

const PAUSE_SLICE: Duration = Duration::from_millis(20);

/// Connection lifecycle of a node session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

/// Acquisition parameters shared between a worker and its handle.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub config: NodeConfig,
    pub min_sample_rate_hz: f64,
    pub reconnect: ReconnectPolicy,
    revision: u64,
}

impl NodeSettings {
    /// `min_sample_rate_hz` applies unless the node config overrides it.
    pub fn new(config: NodeConfig, min_sample_rate_hz: f64) -> Self {
        Self {
            min_sample_rate_hz: config.min_sample_rate_hz.unwrap_or(min_sample_rate_hz),
            config,
            reconnect: ReconnectPolicy::default(),
            revision: 0,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Bumped on every reconfiguration; streaming restarts when it changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

/// Cross-thread view of a running worker.
#[derive(Clone)]
pub struct NodeHandle {
    settings: Arc<Mutex<NodeSettings>>,
    state: Arc<Mutex<LinkState>>,
}

impl NodeHandle {
    fn new(settings: NodeSettings) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
            state: Arc::new(Mutex::new(LinkState::Disconnected)),
        }
    }

    pub fn settings(&self) -> NodeSettings {
        lock(&self.settings).clone()
    }

    pub fn id(&self) -> String {
        lock(&self.settings).id()
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    /// Replaces the node configuration; the worker re-issues its capture
    /// request before the next acquisition.
    pub fn reconfigure(&self, config: NodeConfig) {
        let mut settings = lock(&self.settings);
        if let Some(rate) = config.min_sample_rate_hz {
            settings.min_sample_rate_hz = rate;
        }
        settings.config = config;
        settings.revision += 1;
    }

    pub fn set_min_sample_rate(&self, min_sample_rate_hz: f64) {
        let mut settings = lock(&self.settings);
        settings.min_sample_rate_hz = min_sample_rate_hz;
        settings.revision += 1;
    }

    fn set_state(&self, next: LinkState) {
        let mut state = lock(&self.state);
        if *state != next {
            debug!("{:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

/// Where a worker's raw captures come from.
pub enum CaptureSource {
    Live(Box<dyn NodeLink>),
    Synthetic(SyntheticSource),
}

/// Per-node acquisition loop: acquire, transform, upsample, enqueue.
pub struct NodeWorker {
    handle: NodeHandle,
    source: CaptureSource,
    output: Arc<SafeQueue<Capture>>,
    terminate: Arc<AtomicBool>,
    fft: Box<dyn SpectralTransform>,
    streaming: Option<u64>,
    failures: u32,
}

impl NodeWorker {
    pub fn new(
        settings: NodeSettings,
        source: CaptureSource,
        output: Arc<SafeQueue<Capture>>,
        terminate: Arc<AtomicBool>,
        backend: FftBackend,
    ) -> Self {
        Self {
            handle: NodeHandle::new(settings),
            source,
            output,
            terminate,
            fft: backend.build(),
            streaming: None,
            failures: 0,
        }
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Loops until the terminate flag is raised.
    pub fn run(mut self) {
        info!("node {} started", self.handle.id());
        while !self.terminate.load(Ordering::Relaxed) {
            self.step();
        }
        if let CaptureSource::Live(link) = &mut self.source {
            link.disconnect();
        }
        self.handle.set_state(LinkState::Disconnected);
        info!("node {} stopped", self.handle.id());
    }

    /// One acquisition attempt. Returns whether a capture was enqueued.
    pub fn step(&mut self) -> bool {
        let settings = self.handle.settings();
        let raw = match self.acquire(&settings) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!("node {}: {}", settings.id(), err);
                self.drop_connection();
                let delay = settings.reconnect.delay(self.failures);
                self.failures = self.failures.saturating_add(1);
                pause(delay, &self.terminate);
                return false;
            }
        };
        self.failures = 0;

        match preprocess(raw, &settings, self.fft.as_mut()) {
            Ok(capture) => {
                debug!(
                    "node {} captured {} bins at {}",
                    settings.id(),
                    capture.iq.len(),
                    capture.timestamp_ns
                );
                self.output.push(capture);
                true
            }
            Err(err) => {
                warn!("node {}: dropping capture: {}", settings.id(), err);
                false
            }
        }
    }

    fn acquire(&mut self, settings: &NodeSettings) -> Result<Option<RawCapture>, LinkError> {
        let config = &settings.config;
        let interval = config.measure_interval_ms;
        match &mut self.source {
            CaptureSource::Live(link) => {
                if !link.is_connected() {
                    self.handle.set_state(LinkState::Connecting);
                    if !link.connect(&config.host, config.port) {
                        return Err(LinkError::NotConnected(settings.id()));
                    }
                    self.handle.set_state(LinkState::Connected);
                    self.streaming = None;
                }
                if self.streaming != Some(settings.revision) {
                    let sampling = SampleConfig::for_bandwidth(config.bandwidth_hz, config.samples);
                    link.send_start_capture(config.frequency_hz, &sampling, interval)?;
                    self.streaming = Some(settings.revision);
                    self.handle.set_state(LinkState::Streaming);
                }
                link.receive_capture().map(Some)
            }
            CaptureSource::Synthetic(source) => {
                if self.streaming != Some(settings.revision) {
                    source.reset(interval);
                    self.streaming = Some(settings.revision);
                    self.handle.set_state(LinkState::Streaming);
                }
                let slot = source.next_slot(interval);
                if !pause_until(slot, &self.terminate) {
                    return Ok(None);
                }
                synthesize(settings, slot, self.fft.as_mut())
                    .map(Some)
                    .map_err(|err| LinkError::Malformed(err.to_string()))
            }
        }
    }

    fn drop_connection(&mut self) {
        if let CaptureSource::Live(link) = &mut self.source {
            link.disconnect();
        }
        self.streaming = None;
        self.handle.set_state(LinkState::Disconnected);
    }
}

/// Converts a raw delivery into an enqueue-ready spectrum.
///
/// The sample buffer is transformed in place and then zero-padded until the
/// effective rate reaches `settings.min_sample_rate_hz`; the recorded sample
/// rate grows by the same factor.
pub fn preprocess(
    raw: RawCapture,
    settings: &NodeSettings,
    fft: &mut dyn SpectralTransform,
) -> Result<Capture, FftError> {
    let mut capture = Capture::from_raw(raw, &settings.config.host, settings.config.port);
    fft.transform(&mut capture.iq)?;

    let factor = interpolation_factor(
        capture.effective_sample_rate_hz(),
        settings.min_sample_rate_hz,
    );
    if factor > 1 {
        upsample_spectrum(&mut capture.iq, factor);
        capture.sample_rate_mhz *= factor as i32;
    }
    Ok(capture)
}

/// Sleeps for `duration` in short slices. Returns false if terminated early.
pub(crate) fn pause(duration: Duration, terminate: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if terminate.load(Ordering::Relaxed) {
            return false;
        }
        match deadline.checked_duration_since(Instant::now()) {
            Some(left) if !left.is_zero() => thread::sleep(left.min(PAUSE_SLICE)),
            _ => return true,
        }
    }
}

fn pause_until(epoch_ns: i64, terminate: &AtomicBool) -> bool {
    let wait = epoch_ns.saturating_sub(super::synthetic::now_ns()).max(0);
    pause(Duration::from_nanos(wait as u64), terminate)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
