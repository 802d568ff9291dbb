use crate::gui_bridge::model::{BridgeModel, StatusReport};
use anyhow::Context;
use log::{error, info};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
};
use tdoacore::interface::TdoaResult;
use tdoacore::telemetry::Metrics;
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

pub fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

#[derive(Default)]
struct BridgeState {
    model: RwLock<BridgeModel>,
    metrics: RwLock<Metrics>,
}

impl BridgeState {
    fn model(&self) -> RwLockReadGuard<'_, BridgeModel> {
        self.model.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn model_mut(&self) -> RwLockWriteGuard<'_, BridgeModel> {
        self.model.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics(&self) -> Metrics {
        *self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Publishes the latest solve over HTTP: `GET /result` and `GET /status`.
#[derive(Clone, Default)]
pub struct ResultBridge {
    state: Arc<BridgeState>,
}

impl ResultBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the routes from a background thread.
    pub fn serve(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let routes = routes(self.state.clone());
        thread::Builder::new()
            .name("result-bridge".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!("bridge runtime failed: {}", err);
                        return;
                    }
                };
                runtime.block_on(async move {
                    warp::serve(routes).run(addr).await;
                });
            })
            .context("spawning HTTP bridge thread")?;
        info!("result bridge listening on http://{}", addr);
        Ok(())
    }

    pub fn publish(&self, result: &TdoaResult) {
        let mut model = self.state.model_mut();
        model.latest = Some(result.clone());
        model.results_published += 1;
        println!(
            "[BRIDGE] result {:.6}, {:.6} confidence {:.2}ns ({} published)",
            result.centre.lat(),
            result.centre.lon(),
            result.confidence,
            model.results_published
        );
    }

    pub fn publish_metrics(&self, metrics: Metrics) {
        if let Ok(mut current) = self.state.metrics.write() {
            *current = metrics;
        }
    }

    pub fn publish_status(&self, message: &str) {
        self.state.model_mut().status = message.to_string();
        println!("[BRIDGE] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> BridgeModel {
        self.state.model().clone()
    }
}

fn routes(
    state: Arc<BridgeState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let result_route = warp::path("result")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: Arc<BridgeState>| {
            let latest = state.model().latest.clone();
            match latest {
                Some(result) => {
                    warp::reply::with_status(warp::reply::json(&result), StatusCode::OK)
                }
                None => warp::reply::with_status(
                    warp::reply::json(&json!({ "status": "no result yet" })),
                    StatusCode::NOT_FOUND,
                ),
            }
        });

    let status_route = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter)
        .map(|state: Arc<BridgeState>| {
            let report = StatusReport::new(&state.model(), state.metrics());
            warp::reply::json(&report)
        });

    result_route.or(status_route)
}
