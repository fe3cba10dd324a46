//! Headless driver plumbing: config loading and single-run execution.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use gameofice_core::{IceConfig, IceEngine, MetricsSnapshot, Step, StepSummary};
use serde::Serialize;
use tracing::{debug, info};

/// Parameters of one headless run on top of the engine configuration.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub config: IceConfig,
    /// Number of `step()` calls.
    pub steps: usize,
    /// Up-spin probability used to seed the lattice.
    pub up_probability: f64,
    /// Log a progress line every this many steps; 0 disables progress lines.
    pub report_every: usize,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            config: IceConfig::default(),
            steps: 200,
            up_probability: 0.5,
            report_every: 25,
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: Step,
    pub temperature: f64,
    pub kernel_coverage: f64,
    pub initial: MetricsSnapshot,
    pub metrics: MetricsSnapshot,
    pub history: Vec<StepSummary>,
}

/// Parse an engine configuration from JSON; missing fields take defaults.
pub fn parse_config(json: &str) -> Result<IceConfig> {
    let config: IceConfig =
        serde_json::from_str(json).context("failed to parse engine configuration")?;
    Ok(config)
}

/// Read and parse a JSON configuration file.
pub fn load_config(path: &Path) -> Result<IceConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

/// Build an engine, seed it, and step it `plan.steps` times.
pub fn run(plan: &RunPlan) -> Result<RunReport> {
    ensure!(
        (0.0..=1.0).contains(&plan.up_probability),
        "up probability {} is outside [0, 1]",
        plan.up_probability
    );
    let mut engine =
        IceEngine::new(plan.config.clone()).context("failed to configure ice engine")?;
    engine.randomize(plan.up_probability)?;
    let initial = engine.metrics();
    info!(
        width = engine.width(),
        height = engine.height(),
        method = ?plan.config.method,
        distribution = plan.config.distribution.name(),
        coverage = engine.kernel().coverage(),
        magnetization = initial.magnetization,
        "seeded lattice"
    );

    for _ in 0..plan.steps {
        let events = engine.step();
        if plan.report_every > 0 && events.step.0 % plan.report_every as u64 == 0 {
            let metrics = engine.metrics();
            info!(
                step = events.step.0,
                temperature = events.temperature,
                flipped = events.flipped,
                magnetization = metrics.magnetization,
                energy = metrics.energy,
                correlation = metrics.correlation,
                "progress"
            );
        } else {
            debug!(step = events.step.0, flipped = events.flipped, "step");
        }
        engine.clear_dirty();
    }

    Ok(RunReport {
        steps: engine.step_count(),
        temperature: engine.temperature(),
        kernel_coverage: engine.kernel().coverage(),
        initial,
        metrics: engine.metrics(),
        history: engine.history().copied().collect(),
    })
}
