use anyhow::Context;
use clap::Parser;
use generator::scenario::ScenarioConfig;
use gui_bridge::bridge::{default_bind_address, ResultBridge};
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tdoacore::config::GeoPoint;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{OfflineReport, Runner};

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "TDOA multilateration pipeline driver")]
struct Args {
    /// Load the pipeline config from JSON (.json) or YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Solve a single synthetic cohort in-process and append a report
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Stop after this many results
    #[arg(long)]
    results: Option<usize>,
    /// Publish results over HTTP (GET /result, GET /status)
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value_t = default_bind_address())]
    bind: SocketAddr,
    /// Scenario transmitter latitude, degrees
    #[arg(long, allow_hyphen_values = true)]
    tx_lat: Option<f64>,
    /// Scenario transmitter longitude, degrees
    #[arg(long, allow_hyphen_values = true)]
    tx_lon: Option<f64>,
    /// Number of scenario nodes
    #[arg(long)]
    nodes: Option<usize>,
    /// Scenario node distance from the transmitter, metres
    #[arg(long)]
    spacing: Option<f64>,
    /// Seeds both the scenario layout and the optimiser
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "tools/data/offline_tdoa.log")]
    report: PathBuf,
}

impl Args {
    fn apply_overrides(&self, config: &mut WorkflowConfig) {
        let scenario: &mut ScenarioConfig = &mut config.scenario;
        let lat = self.tx_lat.unwrap_or(scenario.transmitter.lat);
        let lon = self.tx_lon.unwrap_or(scenario.transmitter.lon);
        scenario.transmitter = GeoPoint::new(lat, lon, scenario.transmitter.alt);
        if let Some(nodes) = self.nodes {
            scenario.nodes = nodes;
        }
        if let Some(spacing) = self.spacing {
            scenario.spacing_m = spacing;
        }
        if let Some(seed) = self.seed {
            scenario.seed = seed;
            config.pipeline.tdoa.seed = Some(seed);
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.config {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::synthetic()
    };
    args.apply_overrides(&mut workflow_config);

    let runner = Runner::new(workflow_config);
    let bridge = ResultBridge::new();
    if args.serve {
        bridge.serve(args.bind)?;
    }

    if args.offline {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("reading system clock")?
            .as_nanos() as i64;
        let report = runner.offline(timestamp_ns)?;
        bridge.publish_metrics(report.metrics);
        match &report.result {
            Some(result) => {
                bridge.publish(result);
                bridge.publish_status("Offline solve ready.");
            }
            None => bridge.publish_status("Offline cohort produced no result."),
        }
        println!("{}", summarise(&report));
        append_report(&args.report, &report)?;

        if args.serve {
            wait_for_ctrl_c()?;
        }
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = stop.clone();
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            if let Err(err) = wait_for_ctrl_c() {
                log::error!("{:#}", err);
            }
            stop_on_signal.store(true, Ordering::Relaxed);
        })
        .context("spawning signal handler")?;

    bridge.publish_status("Pipeline running (Ctrl+C to stop)...");
    let delivered = runner.run(args.results, &stop, |result, metrics| {
        bridge.publish_metrics(metrics);
        bridge.publish(result);
    })?;
    info!("pipeline delivered {} results", delivered);
    Ok(())
}

fn summarise(report: &OfflineReport) -> String {
    let solved = match &report.result {
        Some(result) => format!(
            "centre {:.6}, {:.6} confidence {:.2}ns ellipse {:.0}x{:.0}m @ {:.1}deg",
            result.centre.lat(),
            result.centre.lon(),
            result.confidence,
            result.ellipse.major_m,
            result.ellipse.minor_m,
            result.ellipse.angle_deg
        ),
        None => "no result".to_string(),
    };
    let miss = report
        .miss_distance_m()
        .map(|m| format!(" miss {:.1}m", m))
        .unwrap_or_default();
    format!(
        "Offline run -> nodes {}, {}{}, rejected correlations {}",
        report.nodes, solved, miss, report.metrics.correlations_rejected
    )
}

fn append_report(path: &Path, report: &OfflineReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening report {}", path.display()))?;
    writeln!(file, "{}", summarise(report))?;
    Ok(())
}

fn wait_for_ctrl_c() -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    runtime.block_on(async {
        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        Ok::<(), anyhow::Error>(())
    })
}
