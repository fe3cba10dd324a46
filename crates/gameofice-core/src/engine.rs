//! Simulation engine owning the lattice, temperature and kernel.
//!
//! Every step draws one seed from the engine RNG and derives an independent
//! generator per lattice row, so the parallel passes produce the same result
//! regardless of how rayon schedules the rows.

use std::collections::VecDeque;
use std::fmt;

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::kernel::Kernel;
use crate::metrics::MetricsSnapshot;
use crate::perturb::PerturbationShape;
use crate::{Boundary, EngineError, IceConfig, Lattice, LocalSweep, Spin, Step, UpdateMethod};

const ROW_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Linear temperature ramp with a floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Annealer {
    initial: f64,
    floor: f64,
    decay_step: f64,
    current: f64,
}

impl Annealer {
    /// Ramp from `initial` toward `floor` by `initial / decay_steps` per step.
    pub fn new(initial: f64, floor: f64, decay_steps: u32) -> Result<Self, EngineError> {
        if decay_steps == 0 {
            return Err(EngineError::InvalidConfig(
                "temperature_decay_steps must be positive",
            ));
        }
        if !initial.is_finite() || initial < 0.0 {
            return Err(EngineError::InvalidConfig(
                "initial_temperature must be finite and non-negative",
            ));
        }
        if !floor.is_finite() || floor < 0.0 || floor > initial {
            return Err(EngineError::InvalidConfig(
                "temperature_floor must be in [0, initial_temperature]",
            ));
        }
        Ok(Self {
            initial,
            floor,
            decay_step: initial / f64::from(decay_steps),
            current: initial,
        })
    }

    /// Applies one decrement unless it would reach the floor; returns the new temperature.
    pub fn advance(&mut self) -> f64 {
        let next = self.current - self.decay_step;
        if next > self.floor {
            self.current = next;
        }
        self.current
    }

    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.current
    }

    #[must_use]
    pub const fn initial(&self) -> f64 {
        self.initial
    }

    #[must_use]
    pub const fn floor(&self) -> f64 {
        self.floor
    }

    #[must_use]
    pub const fn decay_step(&self) -> f64 {
        self.decay_step
    }

    /// True once further steps leave the temperature unchanged.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.current - self.decay_step <= self.floor
    }
}

/// Boltzmann flip probability `1 / (1 + exp(2e / T))`.
///
/// `T <= 0` returns the frozen limit: 1 for negative `e`, 0 for positive,
/// 0.5 when `e` is exactly zero.
#[must_use]
pub fn flip_probability(energy: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return if energy < 0.0 {
            1.0
        } else if energy > 0.0 {
            0.0
        } else {
            0.5
        };
    }
    let x = 2.0 * energy / temperature;
    if x >= 0.0 {
        let e = (-x).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + x.exp())
    }
}

/// Cross-correlates `lattice` with `kernel` into `out` (row-major, one value per cell).
pub fn cross_correlate(lattice: &Lattice, kernel: &Kernel, boundary: Boundary, out: &mut [f64]) {
    let width = lattice.width();
    let height = lattice.height();
    let cells = lattice.cells();
    let taps = kernel.taps();

    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for &(dx, dy, weight) in &taps {
                let sx = x as isize + dx;
                let sy = y as isize + dy;
                let sample = match boundary {
                    Boundary::Wrap => lattice.get_wrapped(sx, sy).as_f64(),
                    Boundary::Fill { value } => {
                        if sx < 0 || sy < 0 || sx as usize >= width || sy as usize >= height {
                            value
                        } else {
                            cells[sy as usize * width + sx as usize].as_f64()
                        }
                    }
                };
                acc += weight * sample;
            }
            *slot = acc;
        }
    });
}

/// Sum of the four wrapped neighbours of `(x, y)` scaled by `coupling`.
#[inline]
fn neighbour_field(
    cells: &[Spin],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    coupling: f64,
) -> f64 {
    let up = if y == 0 { height - 1 } else { y - 1 };
    let down = if y + 1 == height { 0 } else { y + 1 };
    let left = if x == 0 { width - 1 } else { x - 1 };
    let right = if x + 1 == width { 0 } else { x + 1 };
    let sum = cells[up * width + x].as_f64()
        + cells[down * width + x].as_f64()
        + cells[y * width + left].as_f64()
        + cells[y * width + right].as_f64();
    coupling * sum
}

fn row_rng(step_seed: u64, row: usize) -> SmallRng {
    SmallRng::seed_from_u64(step_seed ^ (row as u64 + 1).wrapping_mul(ROW_SEED_MIX))
}

/// Lifecycle stage of an engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum EnginePhase {
    /// Kernel built, lattice untouched.
    #[default]
    Configured,
    /// Lattice written by the caller.
    Seeded,
    /// At least one step has run.
    Running,
}

/// Result of a single [`IceEngine::step`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StepEvents {
    pub step: Step,
    pub temperature: f64,
    pub flipped: usize,
}

/// Per-step record retained in the engine history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub step: Step,
    pub temperature: f64,
    pub flipped: usize,
    pub metrics: MetricsSnapshot,
}

/// Spin lattice simulation with a fixed kernel and annealing schedule.
pub struct IceEngine<R = SmallRng> {
    config: IceConfig,
    kernel: Kernel,
    lattice: Lattice,
    influence: Vec<f64>,
    scratch: Vec<Spin>,
    annealer: Annealer,
    rng: R,
    step: Step,
    phase: EnginePhase,
    dirty: bool,
    history: VecDeque<StepSummary>,
}

impl<R> fmt::Debug for IceEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceEngine")
            .field("config", &self.config)
            .field("step", &self.step)
            .field("phase", &self.phase)
            .field("temperature", &self.annealer.temperature())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl IceEngine<SmallRng> {
    /// Instantiate an engine seeded from `config.rng_seed`.
    pub fn new(config: IceConfig) -> Result<Self, EngineError> {
        let rng = config.seeded_rng();
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> IceEngine<R> {
    /// Instantiate an engine driven by a caller-supplied RNG.
    pub fn with_rng(config: IceConfig, rng: R) -> Result<Self, EngineError> {
        config.validate()?;
        let kernel = Kernel::build(
            config.width,
            config.height,
            config.neighbourhood_radius,
            &config.distribution,
        )?;
        let lattice = Lattice::uniform(config.width, config.height, Spin::Down)?;
        let annealer = Annealer::new(
            config.initial_temperature,
            config.temperature_floor,
            config.temperature_decay_steps,
        )?;
        let cells = config.width * config.height;
        debug!(
            width = config.width,
            height = config.height,
            method = ?config.method,
            distribution = config.distribution.name(),
            radius = config.neighbourhood_radius,
            "configured ice engine"
        );
        Ok(Self {
            kernel,
            lattice,
            influence: vec![0.0; cells],
            scratch: Vec::with_capacity(cells),
            annealer,
            rng,
            step: Step::zero(),
            phase: EnginePhase::Configured,
            dirty: false,
            history: VecDeque::with_capacity(config.history_capacity),
            config,
        })
    }

    /// Replace every cell: `Up` with probability `prob`, otherwise `Down`.
    pub fn randomize(&mut self, prob: f64) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(EngineError::InvalidProbability(prob));
        }
        for cell in self.lattice.cells_mut() {
            *cell = if self.rng.random_bool(prob) {
                Spin::Up
            } else {
                Spin::Down
            };
        }
        self.mark_seeded();
        Ok(())
    }

    /// Copy `block` into the lattice with its top-left corner at column `x`, row `y`.
    ///
    /// Cells falling outside the lattice are skipped; returns the number written.
    pub fn write_block(&mut self, block: &Lattice, x: usize, y: usize) -> usize {
        let width = self.lattice.width();
        let height = self.lattice.height();
        let mut written = 0;
        for (row_offset, row) in block.rows().enumerate() {
            let ty = y.saturating_add(row_offset);
            if ty >= height {
                break;
            }
            for (col_offset, &spin) in row.iter().enumerate() {
                let tx = x.saturating_add(col_offset);
                if tx >= width {
                    break;
                }
                self.lattice.set(tx, ty, spin);
                written += 1;
            }
        }
        self.mark_seeded();
        written
    }

    /// Stamp the configured perturbation shape centered on column `x`, row `y`.
    pub fn perturb(&mut self, x: usize, y: usize, radius: usize, value: Spin) -> usize {
        self.perturb_with(self.config.perturbation, x, y, radius, value)
    }

    /// Stamp an explicit perturbation shape centered on column `x`, row `y`.
    pub fn perturb_with(
        &mut self,
        shape: PerturbationShape,
        x: usize,
        y: usize,
        radius: usize,
        value: Spin,
    ) -> usize {
        let written = shape.apply(&mut self.lattice, y, x, radius, value);
        self.mark_seeded();
        written
    }

    /// Anneal, then update every cell with the configured method.
    pub fn step(&mut self) -> StepEvents {
        let temperature = self.annealer.advance();
        let step_seed: u64 = self.rng.random();
        let flipped = match self.config.method {
            UpdateMethod::Global => self.global_update(step_seed),
            UpdateMethod::Local => match self.config.local_sweep {
                LocalSweep::Synchronous => self.local_update_synchronous(temperature, step_seed),
                LocalSweep::Sequential => self.local_update_sequential(temperature),
            },
        };

        self.step = self.step.next();
        self.phase = EnginePhase::Running;
        self.dirty = true;
        trace!(step = self.step.0, temperature, flipped, "advanced lattice");
        self.record_history(temperature, flipped);

        StepEvents {
            step: self.step,
            temperature,
            flipped,
        }
    }

    fn global_update(&mut self, step_seed: u64) -> usize {
        cross_correlate(
            &self.lattice,
            &self.kernel,
            self.config.boundary,
            &mut self.influence,
        );
        let width = self.lattice.width();
        let influence = &self.influence;
        self.lattice
            .cells_mut()
            .par_chunks_mut(width)
            .zip(influence.par_chunks(width))
            .enumerate()
            .map(|(row, (cells, field))| {
                let mut rng = row_rng(step_seed, row);
                let mut flipped = 0_usize;
                for (cell, &n) in cells.iter_mut().zip(field) {
                    let r1: f64 = rng.random();
                    let r2: f64 = rng.random();
                    let next = if r1 < n && n > 0.0 {
                        Spin::Up
                    } else if r2 < -n {
                        Spin::Down
                    } else {
                        *cell
                    };
                    if next != *cell {
                        *cell = next;
                        flipped += 1;
                    }
                }
                flipped
            })
            .sum()
    }

    fn local_update_synchronous(&mut self, temperature: f64, step_seed: u64) -> usize {
        let width = self.lattice.width();
        let height = self.lattice.height();
        let coupling = self.config.coupling_constant;
        self.scratch.clear();
        self.scratch.extend_from_slice(self.lattice.cells());
        let previous = &self.scratch;

        self.lattice
            .cells_mut()
            .par_chunks_mut(width)
            .enumerate()
            .map(|(y, cells)| {
                let mut rng = row_rng(step_seed, y);
                let mut flipped = 0_usize;
                for (x, cell) in cells.iter_mut().enumerate() {
                    let spin = previous[y * width + x];
                    let field = neighbour_field(previous, width, height, x, y, coupling);
                    let p = flip_probability(-field * spin.as_f64(), temperature);
                    let draw: f64 = rng.random();
                    if draw < p {
                        *cell = spin.flipped();
                        flipped += 1;
                    }
                }
                flipped
            })
            .sum()
    }

    fn local_update_sequential(&mut self, temperature: f64) -> usize {
        let width = self.lattice.width();
        let height = self.lattice.height();
        let coupling = self.config.coupling_constant;
        let mut flipped = 0_usize;
        for y in 0..height {
            for x in 0..width {
                let cells = self.lattice.cells();
                let spin = cells[y * width + x];
                let field = neighbour_field(cells, width, height, x, y, coupling);
                let p = flip_probability(-field * spin.as_f64(), temperature);
                let draw: f64 = self.rng.random();
                if draw < p {
                    self.lattice.set(x, y, spin.flipped());
                    flipped += 1;
                }
            }
        }
        flipped
    }

    fn record_history(&mut self, temperature: f64, flipped: usize) {
        let capacity = self.config.history_capacity;
        if capacity == 0 {
            return;
        }
        let summary = StepSummary {
            step: self.step,
            temperature,
            flipped,
            metrics: self.metrics(),
        };
        if self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    fn mark_seeded(&mut self) {
        if self.phase == EnginePhase::Configured {
            self.phase = EnginePhase::Seeded;
        }
        self.dirty = true;
    }

    /// Coupled nearest-neighbour field at column `x`, row `y`.
    #[must_use]
    pub fn local_field(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.lattice.width() || y >= self.lattice.height() {
            return None;
        }
        Some(neighbour_field(
            self.lattice.cells(),
            self.lattice.width(),
            self.lattice.height(),
            x,
            y,
            self.config.coupling_constant,
        ))
    }

    /// Observables for the current lattice and influence snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::measure(&self.lattice, &self.influence)
    }

    #[must_use]
    pub fn config(&self) -> &IceConfig {
        &self.config
    }

    #[must_use]
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    #[must_use]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.lattice.width()
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.lattice.height()
    }

    /// Field computed by the most recent global step (zeros before the first).
    #[must_use]
    pub fn influence(&self) -> &[f64] {
        &self.influence
    }

    /// Influence snapshot value at column `x`, row `y`.
    #[must_use]
    pub fn influence_at(&self, x: usize, y: usize) -> Option<f64> {
        if x < self.lattice.width() && y < self.lattice.height() {
            Some(self.influence[self.lattice.offset(x, y)])
        } else {
            None
        }
    }

    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.annealer.temperature()
    }

    #[must_use]
    pub const fn annealer(&self) -> &Annealer {
        &self.annealer
    }

    /// Steps executed so far.
    #[must_use]
    pub const fn step_count(&self) -> Step {
        self.step
    }

    #[must_use]
    pub const fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Whether the lattice changed since the observer last cleared the flag.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns the dirty flag and clears it.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Iterate over retained step summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StepSummary> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Distribution;

    fn small_config(method: UpdateMethod) -> IceConfig {
        IceConfig {
            width: 4,
            height: 4,
            neighbourhood_radius: 1,
            method,
            boundary: Boundary::Wrap,
            distribution: Distribution::Gaussian { std: None },
            rng_seed: Some(0x1CE),
            ..IceConfig::default()
        }
    }

    #[test]
    fn annealer_decays_linearly_then_holds() {
        let mut annealer = Annealer::new(1.0, 0.0, 4).expect("annealer");
        assert_eq!(annealer.advance(), 0.75);
        assert_eq!(annealer.advance(), 0.5);
        assert_eq!(annealer.advance(), 0.25);
        assert!(annealer.is_frozen());
        for _ in 0..10 {
            assert_eq!(annealer.advance(), 0.25);
        }
    }

    #[test]
    fn annealer_respects_floor() {
        let mut annealer = Annealer::new(10.0, 4.0, 10).expect("annealer");
        let temps: Vec<f64> = (0..12).map(|_| annealer.advance()).collect();
        assert_eq!(&temps[..5], &[9.0, 8.0, 7.0, 6.0, 5.0]);
        assert!(temps[5..].iter().all(|&t| t == 5.0));
        assert!(temps.iter().all(|&t| t >= annealer.floor()));
    }

    #[test]
    fn annealer_rejects_bad_parameters() {
        assert!(Annealer::new(1.0, 0.0, 0).is_err());
        assert!(Annealer::new(-1.0, 0.0, 5).is_err());
        assert!(Annealer::new(1.0, 2.0, 5).is_err());
        let mut cold = Annealer::new(0.0, 0.0, 5).expect("zero temperature");
        assert_eq!(cold.advance(), 0.0);
    }

    #[test]
    fn flip_probability_limits() {
        assert_eq!(flip_probability(-4.0, 1e-9), 1.0);
        assert_eq!(flip_probability(4.0, 1e-9), 0.0);
        assert_eq!(flip_probability(-4.0, 0.0), 1.0);
        assert_eq!(flip_probability(4.0, 0.0), 0.0);
        assert_eq!(flip_probability(0.0, 1.0), 0.5);
        let p = flip_probability(1.0, 2.0);
        let boltzmann = (-0.5f64).exp() / ((-0.5f64).exp() + 0.5f64.exp());
        assert!((p - boltzmann).abs() < 1e-12);
        assert!((flip_probability(1.0, 1e12) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn new_engine_is_configured_and_clean() {
        let engine = IceEngine::new(small_config(UpdateMethod::Global)).expect("engine");
        assert_eq!(engine.phase(), EnginePhase::Configured);
        assert!(!engine.is_dirty());
        assert_eq!(engine.step_count(), Step(0));
        assert_eq!(engine.temperature(), 1.0);
        assert!(engine.lattice().cells().iter().all(|&s| s == Spin::Down));
        assert!(engine.influence().iter().all(|&v| v == 0.0));
        assert_eq!(engine.history().count(), 0);
    }

    #[test]
    fn randomize_validates_probability_before_mutating() {
        let mut engine = IceEngine::new(small_config(UpdateMethod::Global)).expect("engine");
        assert_eq!(
            engine.randomize(1.5),
            Err(EngineError::InvalidProbability(1.5))
        );
        assert!(engine.randomize(f64::NAN).is_err());
        assert_eq!(engine.phase(), EnginePhase::Configured);
        assert!(!engine.is_dirty());

        engine.randomize(1.0).expect("randomize");
        assert!(engine.lattice().cells().iter().all(|&s| s == Spin::Up));
        assert_eq!(engine.phase(), EnginePhase::Seeded);
        assert!(engine.take_dirty());
        assert!(!engine.is_dirty());
    }

    #[test]
    fn write_block_clips_at_lattice_edge() {
        let mut engine = IceEngine::new(small_config(UpdateMethod::Global)).expect("engine");
        let block = Lattice::uniform(3, 3, Spin::Up).expect("block");
        assert_eq!(engine.write_block(&block, 2, 3), 2);
        assert_eq!(engine.lattice().get(2, 3), Some(Spin::Up));
        assert_eq!(engine.lattice().get(3, 3), Some(Spin::Up));
        assert_eq!(engine.lattice().get(1, 3), Some(Spin::Down));
        assert_eq!(engine.lattice().get(2, 2), Some(Spin::Down));
        assert_eq!(engine.write_block(&block, 9, 9), 0);
        assert!(engine.is_dirty());
    }

    #[test]
    fn perturb_uses_configured_shape() {
        let mut config = small_config(UpdateMethod::Global);
        config.width = 9;
        config.height = 9;
        config.perturbation = PerturbationShape::Square;
        let mut engine = IceEngine::new(config).expect("engine");
        assert_eq!(engine.perturb(4, 4, 2, Spin::Up), 4);
        assert_eq!(engine.lattice().get(3, 3), Some(Spin::Up));
        assert_eq!(engine.lattice().get(5, 5), Some(Spin::Down));
        assert_eq!(
            engine.perturb_with(PerturbationShape::Circle, 7, 1, 0, Spin::Up),
            1
        );
        assert_eq!(engine.lattice().get(7, 1), Some(Spin::Up));
        assert_eq!(engine.phase(), EnginePhase::Seeded);
    }

    #[test]
    fn single_dissenting_spin_shapes_neighbour_influence() {
        let mut engine = IceEngine::new(small_config(UpdateMethod::Global)).expect("engine");
        engine.randomize(1.0).expect("randomize");
        let dissent = Lattice::uniform(1, 1, Spin::Down).expect("block");
        engine.write_block(&dissent, 2, 2);

        let events = engine.step();
        assert_eq!(events.step, Step(1));

        let kernel = engine.kernel().clone();
        for (x, y) in [(2, 1), (2, 3), (1, 2), (3, 2), (1, 1), (3, 3)] {
            let dx = 2 - x as isize;
            let dy = 2 - y as isize;
            let weight = kernel.weight(dx, dy).expect("inside window");
            let n = engine.influence_at(x, y).expect("in bounds");
            assert!(weight > 0.0);
            assert!(
                ((n - 1.0) - (-2.0 * weight)).abs() < 1e-12,
                "cell ({x}, {y}) influence {n} vs weight {weight}"
            );
        }
        // The dissenting cell only sees up neighbours; cells outside its window see a full field.
        assert!((engine.influence_at(2, 2).expect("center") - 1.0).abs() < 1e-12);
        assert!((engine.influence_at(0, 0).expect("far") - 1.0).abs() < 1e-12);
        // Every field is positive, so nothing can flip down.
        assert!(engine.lattice().cells().iter().all(|&s| s == Spin::Up));
    }

    #[test]
    fn fill_boundary_weakens_edge_influence() {
        let mut wrap_config = small_config(UpdateMethod::Global);
        wrap_config.width = 8;
        wrap_config.height = 8;
        let mut fill_config = wrap_config.clone();
        fill_config.boundary = Boundary::Fill { value: 0.0 };

        let mut wrap = IceEngine::new(wrap_config).expect("wrap engine");
        let mut fill = IceEngine::new(fill_config).expect("fill engine");
        wrap.randomize(1.0).expect("randomize");
        fill.randomize(1.0).expect("randomize");
        wrap.step();
        fill.step();

        assert!(wrap.influence().iter().all(|&n| (n - 1.0).abs() < 1e-12));
        assert!(fill.influence_at(0, 0).expect("corner") < 1.0 - 1e-6);
        assert!((fill.influence_at(4, 4).expect("interior") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_field_flips_down_at_its_magnitude() {
        const SIDE: usize = 300;
        let config = IceConfig {
            width: SIDE,
            height: SIDE,
            neighbourhood_radius: 1,
            method: UpdateMethod::Global,
            distribution: Distribution::Uniform,
            boundary: Boundary::Wrap,
            rng_seed: Some(0x5715),
            ..IceConfig::default()
        };
        let mut engine = IceEngine::new(config).expect("engine");
        // Columns repeat Up, Down, Down.
        let values: Vec<i8> = (0..SIDE * SIDE)
            .map(|idx| if (idx % SIDE) % 3 == 0 { 1 } else { -1 })
            .collect();
        let stripes = Lattice::from_values(SIDE, SIDE, &values).expect("stripes");
        assert_eq!(engine.write_block(&stripes, 0, 0), SIDE * SIDE);

        let events = engine.step();

        for (x, y) in [(0, 0), (3, 17), (297, 299)] {
            let n = engine.influence_at(x, y).expect("up cell");
            assert!((n + 0.5).abs() < 1e-12, "up cell ({x}, {y}) field {n}");
        }
        for (x, y) in [(1, 0), (2, 5), (299, 299)] {
            let n = engine.influence_at(x, y).expect("down cell");
            assert!((n + 0.25).abs() < 1e-12, "down cell ({x}, {y}) field {n}");
        }
        // Negative fields never raise a spin.
        for (before, after) in stripes.cells().iter().zip(engine.lattice().cells()) {
            if *before == Spin::Down {
                assert_eq!(*after, Spin::Down);
            }
        }
        let up_before = stripes.cells().iter().filter(|&&s| s == Spin::Up).count();
        let up_after = engine
            .lattice()
            .cells()
            .iter()
            .filter(|&&s| s == Spin::Up)
            .count();
        assert_eq!(events.flipped, up_before - up_after);
        // Each of the 30_000 up cells drops with probability 0.5; sd is about 87.
        let expected = SIDE * SIDE / 6;
        assert!(
            events.flipped.abs_diff(expected) < 500,
            "flipped {} vs expected {expected}",
            events.flipped
        );
    }

    #[test]
    fn frozen_local_update_flips_every_aligned_spin() {
        let mut config = small_config(UpdateMethod::Local);
        config.initial_temperature = 1e-9;
        let mut engine = IceEngine::new(config).expect("engine");
        engine.randomize(1.0).expect("randomize");

        assert_eq!(engine.local_field(0, 0), Some(4.0));
        let events = engine.step();
        assert_eq!(events.flipped, 16);
        assert!(engine.lattice().cells().iter().all(|&s| s == Spin::Down));
    }

    #[test]
    fn sequential_sweep_sees_earlier_flips() {
        let mut config = small_config(UpdateMethod::Local);
        config.initial_temperature = 1e-9;
        config.local_sweep = LocalSweep::Sequential;
        let mut engine = IceEngine::new(config).expect("engine");
        engine.randomize(1.0).expect("randomize");
        let events = engine.step();
        // The first cells visited still see a net-up neighbourhood even after
        // earlier flips, so they flip with certainty.
        for (x, y) in [(0, 0), (1, 0), (2, 0), (0, 1)] {
            assert_eq!(engine.lattice().get(x, y), Some(Spin::Down));
        }
        let down = engine
            .lattice()
            .cells()
            .iter()
            .filter(|&&s| s == Spin::Down)
            .count();
        assert_eq!(events.flipped, down);
    }

    #[test]
    fn history_is_bounded() {
        let mut config = small_config(UpdateMethod::Global);
        config.history_capacity = 3;
        let mut engine = IceEngine::new(config).expect("engine");
        engine.randomize(0.5).expect("randomize");
        for _ in 0..5 {
            engine.step();
        }
        let steps: Vec<u64> = engine.history().map(|s| s.step.0).collect();
        assert_eq!(steps, vec![3, 4, 5]);
        assert_eq!(engine.phase(), EnginePhase::Running);

        let mut config = small_config(UpdateMethod::Global);
        config.history_capacity = 0;
        let mut engine = IceEngine::new(config).expect("engine");
        engine.step();
        assert_eq!(engine.history().count(), 0);
    }

    #[test]
    fn caller_supplied_rng_is_reproducible() {
        let config = small_config(UpdateMethod::Global);
        let mut a = IceEngine::with_rng(config.clone(), SmallRng::seed_from_u64(9)).expect("a");
        let mut b = IceEngine::with_rng(config, SmallRng::seed_from_u64(9)).expect("b");
        a.randomize(0.5).expect("randomize");
        b.randomize(0.5).expect("randomize");
        for _ in 0..4 {
            assert_eq!(a.step(), b.step());
        }
        assert_eq!(a.lattice(), b.lattice());
    }
}
