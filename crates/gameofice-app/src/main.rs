use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use gameofice_app::{RunPlan, load_config, run};
use gameofice_core::{Boundary, Distribution, IceConfig, LocalSweep, UpdateMethod};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "gameofice",
    version,
    about = "Run a headless Game of Ice spin lattice simulation"
)]
struct Cli {
    /// JSON engine configuration; flags below override its fields.
    #[arg(short, long, env = "GAMEOFICE_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// Kernel neighbourhood radius.
    #[arg(long)]
    radius: Option<usize>,
    #[arg(long, value_enum)]
    method: Option<MethodArg>,
    /// Read order for the local method.
    #[arg(long, value_enum)]
    sweep: Option<SweepArg>,
    /// Kernel distribution (grid-scaled default parameters).
    #[arg(long, value_enum)]
    distribution: Option<DistributionArg>,
    #[arg(long, value_enum)]
    boundary: Option<BoundaryArg>,
    /// Constant used outside the lattice whenever the boundary is `fill`.
    #[arg(long, allow_negative_numbers = true)]
    fill: Option<f64>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    decay_steps: Option<u32>,
    #[arg(long)]
    coupling: Option<f64>,
    #[arg(long, env = "GAMEOFICE_SEED")]
    seed: Option<u64>,
    /// Number of steps to run.
    #[arg(long, default_value_t = 200)]
    steps: usize,
    /// Probability of an up spin when seeding the lattice.
    #[arg(long, default_value_t = 0.5)]
    up_probability: f64,
    /// Log progress every N steps (0 disables).
    #[arg(long, default_value_t = 25)]
    report_every: usize,
    /// Print the final report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SweepArg {
    Synchronous,
    Sequential,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DistributionArg {
    Gaussian,
    ExpDecay,
    Uniform,
    Rayleigh,
    LogNormal,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BoundaryArg {
    Wrap,
    Fill,
}

impl Cli {
    fn into_plan(self) -> Result<(RunPlan, bool)> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => IceConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(radius) = self.radius {
            config.neighbourhood_radius = radius;
        }
        if let Some(method) = self.method {
            config.method = match method {
                MethodArg::Global => UpdateMethod::Global,
                MethodArg::Local => UpdateMethod::Local,
            };
        }
        if let Some(sweep) = self.sweep {
            config.local_sweep = match sweep {
                SweepArg::Synchronous => LocalSweep::Synchronous,
                SweepArg::Sequential => LocalSweep::Sequential,
            };
        }
        if let Some(distribution) = self.distribution {
            config.distribution = match distribution {
                DistributionArg::Gaussian => Distribution::Gaussian { std: None },
                DistributionArg::ExpDecay => Distribution::ExpDecay { decay_rate: None },
                DistributionArg::Uniform => Distribution::Uniform,
                DistributionArg::Rayleigh => Distribution::Rayleigh { sigma: None },
                DistributionArg::LogNormal => Distribution::LogNormal {
                    sigma: None,
                    mu: None,
                },
            };
        }
        if let Some(boundary) = self.boundary {
            config.boundary = match (boundary, config.boundary) {
                (BoundaryArg::Wrap, _) => Boundary::Wrap,
                (BoundaryArg::Fill, Boundary::Fill { value }) => Boundary::Fill { value },
                (BoundaryArg::Fill, Boundary::Wrap) => Boundary::Fill { value: 0.0 },
            };
        }
        if let Some(fill) = self.fill {
            match &mut config.boundary {
                Boundary::Fill { value } => *value = fill,
                Boundary::Wrap => warn!(fill, "fill value ignored with a wrap boundary"),
            }
        }
        if let Some(temperature) = self.temperature {
            config.initial_temperature = temperature;
        }
        if let Some(decay_steps) = self.decay_steps {
            config.temperature_decay_steps = decay_steps;
        }
        if let Some(coupling) = self.coupling {
            config.coupling_constant = coupling;
        }
        if self.seed.is_some() {
            config.rng_seed = self.seed;
        }
        if config.rng_seed.is_none() {
            warn!("no RNG seed supplied; run will not be reproducible");
        }
        let plan = RunPlan {
            config,
            steps: self.steps,
            up_probability: self.up_probability,
            report_every: self.report_every,
        };
        Ok((plan, self.json))
    }
}

fn main() -> Result<()> {
    init_tracing();
    let (plan, json) = Cli::parse().into_plan()?;
    let report = run(&plan)?;
    info!(
        steps = report.steps.0,
        temperature = report.temperature,
        magnetization = report.metrics.magnetization,
        energy = report.metrics.energy,
        correlation = report.metrics.correlation,
        "run complete"
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
