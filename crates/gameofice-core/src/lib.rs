//! Core types for the Game of Ice spin lattice simulation.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod engine;
pub mod kernel;
pub mod metrics;
pub mod perturb;

pub use engine::{
    Annealer, EnginePhase, IceEngine, StepEvents, StepSummary, flip_probability,
};
pub use kernel::{Distribution, Kernel, Mesh};
pub use metrics::MetricsSnapshot;
pub use perturb::PerturbationShape;

/// Errors raised while configuring or seeding an engine.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The kernel crop window does not fit inside the lattice.
    #[error("neighbourhood radius {radius} must be below half of the smallest lattice side ({min_side})")]
    NeighbourhoodTooLarge { radius: usize, min_side: usize },
    /// The distribution produced no usable weight mass.
    #[error("degenerate {distribution} kernel: total weight {total}")]
    DegenerateKernel {
        distribution: &'static str,
        total: f64,
    },
    /// A probability argument fell outside `[0, 1]`.
    #[error("probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
    /// A raw cell value other than -1 or +1.
    #[error("spin value {0} is not -1 or +1")]
    InvalidSpin(i8),
    /// Supplied cell buffer does not match the requested dimensions.
    #[error("expected {expected} cells, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Binary cell orientation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum Spin {
    #[default]
    Down = -1,
    Up = 1,
}

impl Spin {
    /// Signed integer value of the spin.
    #[inline]
    #[must_use]
    pub const fn value(self) -> i8 {
        self as i8
    }

    #[inline]
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self as i8 as f64
    }

    /// The opposite orientation.
    #[inline]
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Up => Self::Down,
        }
    }
}

impl TryFrom<i8> for Spin {
    type Error = EngineError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            1 => Ok(Self::Up),
            other => Err(EngineError::InvalidSpin(other)),
        }
    }
}

/// 2D spin grid stored row-major.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lattice {
    width: usize,
    height: usize,
    cells: Vec<Spin>,
}

impl Lattice {
    /// Construct a `width * height` lattice with every cell set to `spin`.
    pub fn uniform(width: usize, height: usize, spin: Spin) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidConfig(
                "lattice dimensions must be non-zero",
            ));
        }
        Ok(Self {
            width,
            height,
            cells: vec![spin; width * height],
        })
    }

    /// Build a lattice from row-major spins.
    pub fn from_cells(width: usize, height: usize, cells: Vec<Spin>) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidConfig(
                "lattice dimensions must be non-zero",
            ));
        }
        if cells.len() != width * height {
            return Err(EngineError::DimensionMismatch {
                expected: width * height,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a lattice from raw row-major `-1`/`+1` values.
    pub fn from_values(width: usize, height: usize, values: &[i8]) -> Result<Self, EngineError> {
        let cells = values
            .iter()
            .map(|&value| Spin::try_from(value))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_cells(width, height, cells)
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cells(&self) -> &[Spin] {
        &self.cells
    }

    #[must_use]
    pub fn cells_mut(&mut self) -> &mut [Spin] {
        &mut self.cells
    }

    /// Returns the flat index for `(x, y)` without bounds checks.
    #[inline]
    pub(crate) const fn offset(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Spin at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<Spin> {
        if x < self.width && y < self.height {
            Some(self.cells[self.offset(x, y)])
        } else {
            None
        }
    }

    /// Spin at `(x, y)` with toroidal wrap-around on both axes.
    #[inline]
    #[must_use]
    pub fn get_wrapped(&self, x: isize, y: isize) -> Spin {
        let col = x.rem_euclid(self.width as isize) as usize;
        let row = y.rem_euclid(self.height as isize) as usize;
        self.cells[self.offset(col, row)]
    }

    /// Overwrite a single cell. Returns `false` when `(x, y)` is out of bounds.
    pub fn set(&mut self, x: usize, y: usize, spin: Spin) -> bool {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            self.cells[idx] = spin;
            true
        } else {
            false
        }
    }

    /// Fills the lattice with the provided spin.
    pub fn fill(&mut self, spin: Spin) {
        self.cells.fill(spin);
    }

    /// Iterate over rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[Spin]> {
        self.cells.chunks(self.width)
    }
}

/// Update algorithm applied by [`IceEngine::step`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMethod {
    /// Kernel cross-correlation drives probabilistic flips toward the field sign.
    #[default]
    Global,
    /// Nearest-neighbour Boltzmann flips controlled by temperature.
    Local,
}

/// Read order used by the local update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocalSweep {
    /// Every cell reads the pre-step lattice.
    #[default]
    Synchronous,
    /// Raster-order in-place update; later cells see earlier flips.
    Sequential,
}

/// Treatment of kernel samples that fall outside the lattice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Toroidal addressing.
    Wrap,
    /// Constant value outside the lattice.
    Fill { value: f64 },
}

impl Default for Boundary {
    fn default() -> Self {
        Self::Fill { value: 0.0 }
    }
}

/// Simulation step counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Step(pub u64);

impl Step {
    /// Returns the next sequential step.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Static configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IceConfig {
    /// Lattice width in cells.
    pub width: usize,
    /// Lattice height in cells.
    pub height: usize,
    /// Kernel radius `k`; the kernel is `(2k + 1)` cells on each side.
    pub neighbourhood_radius: usize,
    /// Update algorithm.
    pub method: UpdateMethod,
    /// Read order for the local update.
    pub local_sweep: LocalSweep,
    /// Temperature at step zero.
    pub initial_temperature: f64,
    /// Temperature the annealer will not cross.
    pub temperature_floor: f64,
    /// Number of steps over which the initial temperature is ramped down.
    pub temperature_decay_steps: u32,
    /// Multiplier applied to the local field.
    pub coupling_constant: f64,
    /// Spatial distribution used to build the influence kernel.
    pub distribution: Distribution,
    /// Boundary handling for the kernel cross-correlation.
    pub boundary: Boundary,
    /// Stamp applied by [`IceEngine::perturb`].
    pub perturbation: PerturbationShape,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of step summaries retained; 0 disables history.
    pub history_capacity: usize,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 50,
            neighbourhood_radius: 1,
            method: UpdateMethod::Global,
            local_sweep: LocalSweep::Synchronous,
            initial_temperature: 1.0,
            temperature_floor: 0.0,
            temperature_decay_steps: 100,
            coupling_constant: 1.0,
            distribution: Distribution::default(),
            boundary: Boundary::default(),
            perturbation: PerturbationShape::Circle,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl IceConfig {
    /// Checks every field that would otherwise fail mid-run.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidConfig(
                "lattice dimensions must be non-zero",
            ));
        }
        let min_side = self.width.min(self.height);
        if self.neighbourhood_radius * 2 >= min_side {
            return Err(EngineError::NeighbourhoodTooLarge {
                radius: self.neighbourhood_radius,
                min_side,
            });
        }
        if self.temperature_decay_steps == 0 {
            return Err(EngineError::InvalidConfig(
                "temperature_decay_steps must be positive",
            ));
        }
        if !self.initial_temperature.is_finite() || self.initial_temperature < 0.0 {
            return Err(EngineError::InvalidConfig(
                "initial_temperature must be finite and non-negative",
            ));
        }
        if !self.temperature_floor.is_finite()
            || self.temperature_floor < 0.0
            || self.temperature_floor > self.initial_temperature
        {
            return Err(EngineError::InvalidConfig(
                "temperature_floor must be in [0, initial_temperature]",
            ));
        }
        if !self.coupling_constant.is_finite() {
            return Err(EngineError::InvalidConfig(
                "coupling_constant must be finite",
            ));
        }
        if let Boundary::Fill { value } = self.boundary {
            if !value.is_finite() {
                return Err(EngineError::InvalidConfig("fill value must be finite"));
            }
        }
        self.distribution.validate()
    }

    /// Returns the configured RNG, seeding from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Side of the interactive ice block stamp: a tenth of the smaller lattice side.
    #[must_use]
    pub fn default_block_side(&self) -> usize {
        (self.width.min(self.height) / 10).max(1)
    }
}
