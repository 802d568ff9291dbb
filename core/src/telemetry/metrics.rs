use std::sync::Mutex;

/// Counters for the aggregator's cohort and correlation outcomes.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub cohorts_processed: usize,
    pub cohorts_insufficient: usize,
    pub cohorts_forced: usize,
    pub solves: usize,
    pub low_confidence: usize,
    pub correlations_rejected: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut Metrics)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_processed(&self) {
        self.update(|m| m.cohorts_processed += 1);
    }

    pub fn record_insufficient(&self) {
        self.update(|m| m.cohorts_insufficient += 1);
    }

    pub fn record_forced(&self) {
        self.update(|m| m.cohorts_forced += 1);
    }

    pub fn record_solve(&self) {
        self.update(|m| m.solves += 1);
    }

    pub fn record_low_confidence(&self) {
        self.update(|m| m.low_confidence += 1);
    }

    pub fn record_rejected_correlation(&self) {
        self.update(|m| m.correlations_rejected += 1);
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
