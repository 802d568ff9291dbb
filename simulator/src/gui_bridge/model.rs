use serde::Serialize;
use tdoacore::interface::TdoaResult;
use tdoacore::telemetry::Metrics;

/// State served to map clients over HTTP.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeModel {
    pub latest: Option<TdoaResult>,
    pub results_published: usize,
    pub status: String,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub results_published: usize,
    pub has_result: bool,
    pub cohorts_processed: usize,
    pub solves: usize,
    pub low_confidence: usize,
    pub correlations_rejected: usize,
}

impl StatusReport {
    pub fn new(model: &BridgeModel, metrics: Metrics) -> Self {
        Self {
            status: model.status.clone(),
            results_published: model.results_published,
            has_result: model.latest.is_some(),
            cohorts_processed: metrics.cohorts_processed,
            solves: metrics.solves,
            low_confidence: metrics.low_confidence,
            correlations_rejected: metrics.correlations_rejected,
        }
    }
}
