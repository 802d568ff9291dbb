use super::queue::SafeQueue;
use crate::config::{NodeConfig, TdoaConfig};
use crate::interface::{Capture, LinkFactory, TdoaResult};
use crate::node::{CaptureSource, NodeHandle, NodeSettings, NodeWorker, SyntheticSource};
use crate::prelude::{CoreError, CoreResult};
use crate::processing::Aggregator;
use crate::telemetry::{Metrics, MetricsRecorder};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A running pipeline: one thread per node plus the aggregator thread, all
/// sharing one terminate flag.
///
/// Dropping the system stops it.
pub struct TdoaSystem {
    terminate: Arc<AtomicBool>,
    results: Arc<SafeQueue<TdoaResult>>,
    metrics: Arc<MetricsRecorder>,
    nodes: Vec<NodeHandle>,
    threads: Vec<JoinHandle<()>>,
}

impl TdoaSystem {
    /// Validates `config` and starts every thread.
    ///
    /// Test-mode nodes use the synthetic source; any other node needs a link
    /// from `links`. Nodes repeating a host:port pair are merged, the later
    /// entry winning.
    pub fn start(config: TdoaConfig, links: Option<Arc<dyn LinkFactory>>) -> CoreResult<Self> {
        config.validate()?;
        let TdoaConfig { nodes, tdoa } = config;
        let nodes = merge_nodes(nodes);

        let terminate = Arc::new(AtomicBool::new(false));
        let captures: Arc<SafeQueue<Capture>> = Arc::new(SafeQueue::new());
        let results = Arc::new(SafeQueue::new());

        let mut workers = Vec::with_capacity(nodes.len());
        for node in nodes {
            let source = match (node.test_mode, &links) {
                (true, _) => CaptureSource::Synthetic(SyntheticSource::new()),
                (false, Some(factory)) => CaptureSource::Live(factory.create(&node)),
                (false, None) => {
                    return Err(CoreError::InvalidConfig(format!(
                        "{}:{} is live but no link factory was supplied",
                        node.host, node.port
                    )))
                }
            };
            let settings =
                NodeSettings::new(node, tdoa.min_sample_rate_hz).with_reconnect(tdoa.reconnect);
            workers.push(NodeWorker::new(
                settings,
                source,
                captures.clone(),
                terminate.clone(),
                tdoa.fft_backend,
            ));
        }

        let aggregator = Aggregator::new(tdoa, workers.len(), captures, results.clone())?;
        let mut system = Self {
            terminate: terminate.clone(),
            results,
            metrics: aggregator.metrics(),
            nodes: workers.iter().map(NodeWorker::handle).collect(),
            threads: Vec::new(),
        };

        let flag = terminate.clone();
        system.spawn("tdoa-aggregator".into(), move || aggregator.run(flag))?;
        for worker in workers {
            let name = format!("node-{}", worker.handle().id());
            system.spawn(name, move || worker.run())?;
        }
        info!("pipeline started with {} nodes", system.nodes.len());
        Ok(system)
    }

    fn spawn(&mut self, name: String, body: impl FnOnce() + Send + 'static) -> CoreResult<()> {
        match thread::Builder::new().name(name).spawn(body) {
            Ok(handle) => {
                self.threads.push(handle);
                Ok(())
            }
            Err(err) => {
                self.shutdown();
                Err(err.into())
            }
        }
    }

    /// Published results, oldest first.
    pub fn results(&self) -> Arc<SafeQueue<TdoaResult>> {
        self.results.clone()
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.terminate.load(Ordering::Relaxed)
    }

    /// Raises the terminate flag and waits for every thread to finish its
    /// current step.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("{} panicked", name);
            }
        }
    }
}

impl Drop for TdoaSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn merge_nodes(nodes: Vec<NodeConfig>) -> Vec<NodeConfig> {
    let mut merged: Vec<NodeConfig> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match merged
            .iter_mut()
            .find(|known| known.host == node.host && known.port == node.port)
        {
            Some(known) => *known = node,
            None => merged.push(node),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeoPoint, TdoaParams};
    use crate::geo::Location;
    use crate::interface::{LinkError, NodeLink, RawCapture, SampleConfig};
    use crate::node::LinkState;
    use num_complex::Complex64;
    use std::time::{Duration, Instant};

    struct LoopbackLink {
        connected: bool,
        next_ns: i64,
    }

    impl NodeLink for LoopbackLink {
        fn connect(&mut self, _host: &str, _port: u16) -> bool {
            self.connected = true;
            true
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send_start_capture(
            &mut self,
            _frequency_hz: u64,
            _config: &SampleConfig,
            _repeat_interval_ms: u32,
        ) -> Result<(), LinkError> {
            Ok(())
        }

        fn receive_capture(&mut self) -> Result<RawCapture, LinkError> {
            thread::sleep(Duration::from_millis(5));
            self.next_ns += 1_000_000;
            Ok(RawCapture {
                iq: vec![Complex64::new(1.0, 0.0); 64],
                decimation: 0,
                timestamp_ns: self.next_ns,
                ..Default::default()
            })
        }
    }

    fn wait_for(deadline: Duration, mut ready: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if ready() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn node(host: &str, test_mode: bool) -> NodeConfig {
        NodeConfig {
            host: host.into(),
            test_mode,
            ..Default::default()
        }
    }

    #[test]
    fn live_node_without_factory_is_rejected() {
        let config = TdoaConfig {
            nodes: vec![node("rx", false)],
            tdoa: TdoaParams::default(),
        };
        assert!(matches!(
            TdoaSystem::start(config, None),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn repeated_host_port_is_merged() {
        let mut later = node("rx", true);
        later.frequency_hz = 868_000_000;
        let config = TdoaConfig {
            nodes: vec![node("rx", true), node("other", true), later],
            tdoa: TdoaParams::default(),
        };
        let system = TdoaSystem::start(config, None).unwrap();

        assert_eq!(system.nodes().len(), 2);
        assert_eq!(system.nodes()[0].settings().config.frequency_hz, 868_000_000);
        system.stop();
    }

    #[test]
    fn live_links_feed_the_aggregator() {
        let factory: Arc<dyn LinkFactory> = Arc::new(|_node: &NodeConfig| {
            Box::new(LoopbackLink {
                connected: false,
                next_ns: 0,
            }) as Box<dyn NodeLink>
        });
        let config = TdoaConfig {
            nodes: vec![node("a", false), node("b", false), node("c", false)],
            tdoa: TdoaParams::default(),
        };
        let system = TdoaSystem::start(config, Some(factory)).unwrap();

        assert!(wait_for(Duration::from_secs(10), || system.metrics().cohorts_processed > 0));
        assert!(system
            .nodes()
            .iter()
            .all(|handle| handle.state() == LinkState::Streaming));
        assert!(system.metrics().correlations_rejected > 0);
        assert!(system.results().is_empty());
        system.stop();
    }

    #[test]
    fn synthetic_nodes_locate_transmitter() {
        let transmitter = GeoPoint::new(51.5, -0.1, 0.0);
        let tx = transmitter.to_location();
        let nodes = [(3_000.0, 10.0), (4_000.0, 100.0), (3_500.0, 200.0), (5_000.0, 290.0)]
            .iter()
            .enumerate()
            .map(|(i, &(distance, bearing))| {
                let at = tx.moved(distance, bearing);
                NodeConfig {
                    host: format!("sim-{i}"),
                    test_mode: true,
                    measure_interval_ms: 250,
                    location: GeoPoint::new(at.lat(), at.lon(), 0.0),
                    transmitter: Some(transmitter),
                    ..Default::default()
                }
            })
            .collect();
        let config = TdoaConfig {
            nodes,
            tdoa: TdoaParams {
                heat_map_on: false,
                bad_threshold: 50.0,
                min_sample_rate_hz: 80e6,
                seed: Some(7),
                ..Default::default()
            },
        };
        let system = TdoaSystem::start(config, None).unwrap();
        let result = system.results().pop_timeout(Duration::from_secs(20));
        system.stop();

        let result = result.expect("no result within timeout");
        let error_m = result.centre.distance(&Location::from_spherical(51.5, -0.1, 0.0));
        assert!(error_m < 300.0, "solved {} m away", error_m);
        assert_eq!(result.nodes.len(), 4);
    }
}
