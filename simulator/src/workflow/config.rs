use crate::generator::scenario::{build_nodes, ScenarioConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tdoacore::config::TdoaConfig;

const SYNTHETIC_SAMPLE_RATE_HZ: f64 = 80e6;

/// Everything the driver reads from disk: the pipeline configuration plus
/// the synthetic scenario used when no nodes are listed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    #[serde(flatten)]
    pub pipeline: TdoaConfig,
    pub scenario: ScenarioConfig,
}

impl WorkflowConfig {
    /// Reads JSON for `.json` files and YAML for anything else.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let is_json = path_ref
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        let config: WorkflowConfig = if is_json {
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing workflow config {}", path_ref.display()))?
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing workflow config {}", path_ref.display()))?
        };
        Ok(config)
    }

    pub fn from_scenario(scenario: ScenarioConfig) -> Self {
        Self {
            pipeline: TdoaConfig::default(),
            scenario,
        }
    }

    /// Default scenario with the upsampling and reproducibility it needs to
    /// solve: 80 MHz effective rate and a fixed optimiser seed.
    pub fn synthetic() -> Self {
        let mut config = Self::from_scenario(ScenarioConfig::default());
        config.pipeline.tdoa.min_sample_rate_hz = SYNTHETIC_SAMPLE_RATE_HZ;
        config.pipeline.tdoa.seed = Some(config.scenario.seed);
        config
    }

    /// Pipeline configuration to run, with scenario nodes filled in when the
    /// document lists none.
    pub fn resolve(&self) -> anyhow::Result<TdoaConfig> {
        let mut pipeline = self.pipeline.clone();
        if pipeline.nodes.is_empty() {
            pipeline.nodes = build_nodes(&self.scenario).context("building scenario nodes")?;
        }
        pipeline.validate().context("validating pipeline config")?;
        Ok(pipeline)
    }
}
