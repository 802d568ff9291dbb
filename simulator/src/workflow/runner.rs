use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tdoacore::geo::Location;
use tdoacore::interface::TdoaResult;
use tdoacore::node::{preprocess, synthesize, NodeSettings};
use tdoacore::pipeline::SafeQueue;
use tdoacore::processing::Aggregator;
use tdoacore::telemetry::Metrics;
use tdoacore::TdoaSystem;

const RESULT_POLL: Duration = Duration::from_millis(250);

pub struct OfflineReport {
    pub result: Option<TdoaResult>,
    pub metrics: Metrics,
    pub transmitter: Option<Location>,
    pub nodes: usize,
}

impl OfflineReport {
    /// Distance between the solved centre and the simulated transmitter.
    pub fn miss_distance_m(&self) -> Option<f64> {
        let result = self.result.as_ref()?;
        let transmitter = self.transmitter.as_ref()?;
        Some(result.centre.distance(transmitter))
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Synthesises one cohort from every node and solves it on this thread.
    pub fn offline(&self, timestamp_ns: i64) -> anyhow::Result<OfflineReport> {
        let pipeline = self.config.resolve()?;
        let params = pipeline.tdoa.clone();
        let results = Arc::new(SafeQueue::new());
        let mut aggregator = Aggregator::new(
            params.clone(),
            pipeline.nodes.len(),
            Arc::new(SafeQueue::new()),
            results.clone(),
        )
        .context("creating aggregator")?;

        let mut fft = params.fft_backend.build();
        for node in &pipeline.nodes {
            if !node.test_mode {
                bail!(
                    "offline runs need test-mode nodes; {}:{} is live",
                    node.host,
                    node.port
                );
            }
            let settings = NodeSettings::new(node.clone(), params.min_sample_rate_hz);
            let raw = synthesize(&settings, timestamp_ns, fft.as_mut())
                .with_context(|| format!("synthesising capture for {}", settings.id()))?;
            let capture = preprocess(raw, &settings, fft.as_mut())
                .with_context(|| format!("preprocessing capture for {}", settings.id()))?;
            aggregator.accept(capture);
        }

        Ok(OfflineReport {
            result: results.try_pop(),
            metrics: aggregator.metrics().snapshot(),
            transmitter: pipeline
                .nodes
                .iter()
                .find_map(|node| node.transmitter)
                .map(|tx| tx.to_location()),
            nodes: pipeline.nodes.len(),
        })
    }

    /// Runs the threaded pipeline until `limit` results arrive or `stop` is
    /// raised. Returns the number of results handed to `on_result`.
    pub fn run(
        &self,
        limit: Option<usize>,
        stop: &AtomicBool,
        mut on_result: impl FnMut(&TdoaResult, Metrics),
    ) -> anyhow::Result<usize> {
        let pipeline = self.config.resolve()?;
        let system = TdoaSystem::start(pipeline, None).context("starting pipeline")?;
        let results = system.results();

        let mut delivered = 0;
        while !stop.load(Ordering::Relaxed) && limit.map_or(true, |max| delivered < max) {
            if let Some(result) = results.pop_timeout(RESULT_POLL) {
                delivered += 1;
                on_result(&result, system.metrics());
            }
        }
        system.stop();
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::scenario::ScenarioConfig;
    use tdoacore::config::NodeConfig;

    fn scenario_config() -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_scenario(ScenarioConfig {
            seed: 21,
            measure_interval_ms: 200,
            ..Default::default()
        });
        cfg.pipeline.tdoa.min_sample_rate_hz = 80e6;
        cfg.pipeline.tdoa.bad_threshold = 50.0;
        cfg.pipeline.tdoa.heat_map_on = false;
        cfg.pipeline.tdoa.seed = Some(8);
        cfg
    }

    #[test]
    fn offline_run_solves_scenario() {
        let report = Runner::new(scenario_config()).offline(1_000_000_000).unwrap();
        assert_eq!(report.nodes, 4);
        assert_eq!(report.metrics.solves, 1);
        let miss = report.miss_distance_m().expect("a solved result");
        assert!(miss < 300.0, "missed by {} m", miss);
    }

    #[test]
    fn offline_run_refuses_live_nodes() {
        let mut cfg = scenario_config();
        cfg.pipeline.nodes = vec![NodeConfig::default(); 3];
        assert!(Runner::new(cfg).offline(0).is_err());
    }

    #[test]
    fn threaded_run_stops_after_limit() {
        let stop = Arc::new(AtomicBool::new(false));
        let watchdog = stop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(30));
            watchdog.store(true, Ordering::Relaxed);
        });
        let mut seen = Vec::new();
        let delivered = Runner::new(scenario_config())
            .run(Some(1), &stop, |result, _| seen.push(result.timestamp_ns))
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(seen.len(), 1);
    }
}
