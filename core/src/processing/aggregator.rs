use super::cohort::{Cohort, CohortBuffer};
use super::correlation::{correlate, CorrelationReject};
use super::solver::{Geometry, Solver};
use crate::config::TdoaParams;
use crate::interface::{Capture, NodeObservation, TdoaResult};
use crate::pipeline::queue::SafeQueue;
use crate::prelude::{CoreError, CoreResult};
use crate::telemetry::{LogManager, MetricsRecorder};
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Fewest observations the optimiser is ever run with.
const MIN_SOLVE_OBSERVATIONS: usize = 3;

/// Consumes captures from every node, groups them into cohorts and turns
/// each usable cohort into a [`TdoaResult`].
pub struct Aggregator {
    params: TdoaParams,
    node_count: usize,
    buffer: CohortBuffer,
    input: Arc<SafeQueue<Capture>>,
    results: Arc<SafeQueue<TdoaResult>>,
    metrics: Arc<MetricsRecorder>,
    log: LogManager,
    runtime: Runtime,
    rng: StdRng,
}

impl Aggregator {
    pub fn new(
        params: TdoaParams,
        node_count: usize,
        input: Arc<SafeQueue<Capture>>,
        results: Arc<SafeQueue<TdoaResult>>,
    ) -> CoreResult<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name("tdoa-correlate")
            .build()
            .map_err(|err| CoreError::Runtime(err.to_string()))?;
        let log = match &params.debug_file {
            Some(path) => LogManager::with_file(path)?,
            None => LogManager::new(),
        };
        let rng = params
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        Ok(Self {
            params,
            node_count,
            buffer: CohortBuffer::new(),
            input,
            results,
            metrics: Arc::new(MetricsRecorder::new()),
            log,
            runtime,
            rng,
        })
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn results(&self) -> Arc<SafeQueue<TdoaResult>> {
        self.results.clone()
    }

    pub fn pending_cohorts(&self) -> usize {
        self.buffer.len()
    }

    /// Drains the capture queue until `terminate` is raised.
    pub fn run(mut self, terminate: Arc<AtomicBool>) {
        info!("aggregator started for {} nodes", self.node_count);
        while !terminate.load(Ordering::Relaxed) {
            if let Some(capture) = self.input.pop_timeout(POLL_INTERVAL) {
                self.accept(capture);
            }
        }
        info!(
            "aggregator stopped with {} cohorts pending",
            self.buffer.len()
        );
    }

    /// Buffers one capture and processes whatever cohorts become due.
    pub fn accept(&mut self, capture: Capture) {
        if capture.is_empty() {
            debug!("empty capture from {}:{} ignored", capture.host, capture.port);
            return;
        }
        let key = self.buffer.insert(capture);
        debug!("cohort {} holds {}", key, self.buffer.cohort_len(key));
        self.manage_buffer();
    }

    fn manage_buffer(&mut self) {
        while let Some(cohort) = self.buffer.next_ready(self.node_count) {
            if cohort.forced {
                self.metrics.record_forced();
                debug!("cohort {} forced with {}", cohort.key, cohort.captures.len());
            }
            self.process(cohort);
        }
    }

    /// Correlates a cohort against its strongest capture and solves for the
    /// emitter. Returns whether a result was published.
    pub fn process(&mut self, cohort: Cohort) -> bool {
        self.metrics.record_processed();
        let Cohort { key, mut captures, .. } = cohort;

        if captures.len() < self.params.min_nodes() {
            self.metrics.record_insufficient();
            debug!("cohort {} dropped with {} captures", key, captures.len());
            return false;
        }

        captures.sort_by(|a, b| b.power.total_cmp(&a.power));
        if let Some(limit) = self.params.max_solve_nodes {
            captures.truncate(limit.max(self.params.min_nodes()));
        }
        let mut master = captures.remove(0);
        master.conjugate();
        let master = Arc::new(master);

        let mut nodes = vec![observe(&master, 0)];
        for (slave, delay) in self.correlate_all(&master, captures) {
            match delay {
                Ok(ns) => nodes.push(observe(&slave, ns)),
                Err(reason) => {
                    self.metrics.record_rejected_correlation();
                    warn!(
                        "{}:{} against {}:{} rejected: {}",
                        slave.host, slave.port, master.host, master.port, reason
                    );
                }
            }
        }
        if nodes.len() < MIN_SOLVE_OBSERVATIONS {
            self.metrics.record_insufficient();
            debug!("cohort {} left {} usable observations", key, nodes.len());
            return false;
        }

        let geometry = Geometry::new(
            nodes.iter().map(|node| node.location).collect(),
            self.params.min_altitude_m,
        );
        let mut solver = Solver::new(geometry, &self.params, &mut self.rng);
        let centre = solver.locate();
        self.metrics.record_solve();
        if centre.error >= self.params.bad_threshold {
            self.metrics.record_low_confidence();
            warn!("bad result {:.3}ns for cohort {}", centre.error, key);
            return false;
        }

        let heatmap = if self.params.heat_map_on {
            solver.heatmap(&centre, &self.params.heatmap)
        } else {
            Vec::new()
        };
        let ellipse = solver.ellipse(&centre);
        self.log.record_solution(&centre, centre.error);

        self.results.push(TdoaResult {
            timestamp_ns: master.timestamp_ns,
            centre,
            confidence: centre.error,
            ellipse,
            nodes,
            heatmap,
        });
        true
    }

    /// One blocking task per slave; results come back in submission order.
    fn correlate_all(
        &self,
        master: &Arc<Capture>,
        slaves: Vec<Capture>,
    ) -> Vec<(Capture, Result<i32, CorrelationReject>)> {
        let backend = self.params.fft_backend;
        let tasks: Vec<_> = slaves
            .into_iter()
            .map(|slave| {
                let master = Arc::clone(master);
                self.runtime.spawn_blocking(move || {
                    let mut fft = backend.build();
                    let delay = correlate(&master, &slave, fft.as_mut());
                    (slave, delay)
                })
            })
            .collect();

        self.runtime.block_on(async {
            let mut joined = Vec::with_capacity(tasks.len());
            for task in tasks {
                match task.await {
                    Ok(pair) => joined.push(pair),
                    Err(err) => warn!("correlation task failed: {}", err),
                }
            }
            joined
        })
    }
}

fn observe(capture: &Capture, delay_ns: i32) -> NodeObservation {
    let mut location = capture.location();
    location.time_delta_ns = delay_ns;
    NodeObservation {
        host: capture.host.clone(),
        port: capture.port,
        location,
        power: capture.power,
        gain: capture.gain,
    }
}
