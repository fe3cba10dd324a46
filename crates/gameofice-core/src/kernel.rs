//! Influence kernel construction from parametric spatial distributions.
//!
//! A distribution is sampled at every cell center of a lattice-sized mesh,
//! the center weight is forced to zero, the field is normalized, and a
//! `(2k + 1)²` window around the center becomes the kernel.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::EngineError;

/// Default Rayleigh scale parameter.
pub const DEFAULT_RAYLEIGH_SIGMA: f64 = 5.0;
/// Default log-normal shape parameter.
pub const DEFAULT_LOG_NORMAL_SIGMA: f64 = 1.0;
/// Default log-normal location parameter.
pub const DEFAULT_LOG_NORMAL_MU: f64 = 0.0;

/// Spatial distribution used to weight neighbour offsets.
///
/// `None` parameters fall back to grid-scaled defaults at build time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Distribution {
    /// Axis-aligned Gaussian; `std = [sigma_x, sigma_y]`.
    Gaussian { std: Option<[f64; 2]> },
    /// `exp(-rate * d)`.
    ExpDecay { decay_rate: Option<f64> },
    /// Constant weight everywhere.
    Uniform,
    /// `(d / sigma²) * exp(-d² / (2 sigma²))`.
    Rayleigh { sigma: Option<f64> },
    /// Log-normal radial profile, singular at `d = 0`.
    LogNormal { sigma: Option<f64>, mu: Option<f64> },
}

impl Default for Distribution {
    fn default() -> Self {
        Self::Gaussian { std: None }
    }
}

impl Distribution {
    /// Short name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gaussian { .. } => "gaussian",
            Self::ExpDecay { .. } => "exp_decay",
            Self::Uniform => "uniform",
            Self::Rayleigh { .. } => "rayleigh",
            Self::LogNormal { .. } => "log_normal",
        }
    }

    /// Rejects explicitly supplied parameters that cannot produce a kernel.
    pub fn validate(&self) -> Result<(), EngineError> {
        match *self {
            Self::Gaussian { std: Some([sx, sy]) } => {
                if !(sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0) {
                    return Err(EngineError::InvalidConfig(
                        "gaussian standard deviations must be positive and finite",
                    ));
                }
            }
            Self::ExpDecay {
                decay_rate: Some(rate),
            } => {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(EngineError::InvalidConfig(
                        "decay_rate must be finite and non-negative",
                    ));
                }
            }
            Self::Rayleigh { sigma: Some(sigma) } => {
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(EngineError::InvalidConfig(
                        "rayleigh sigma must be positive and finite",
                    ));
                }
            }
            Self::LogNormal { sigma, mu } => {
                if let Some(sigma) = sigma {
                    if !sigma.is_finite() || sigma <= 0.0 {
                        return Err(EngineError::InvalidConfig(
                            "log-normal sigma must be positive and finite",
                        ));
                    }
                }
                if mu.is_some_and(|mu| !mu.is_finite()) {
                    return Err(EngineError::InvalidConfig("log-normal mu must be finite"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Fills in defaults for a `width * height` lattice.
    #[must_use]
    pub fn resolve(&self, width: usize, height: usize) -> Profile {
        let w = width as f64;
        let h = height as f64;
        match *self {
            Self::Gaussian { std } => {
                let [sigma_x, sigma_y] = std.unwrap_or([w.sqrt(), h.sqrt()]);
                Profile::Gaussian { sigma_x, sigma_y }
            }
            Self::ExpDecay { decay_rate } => Profile::ExpDecay {
                rate: decay_rate.unwrap_or(((w + h) / 2.0).sqrt()),
            },
            Self::Uniform => Profile::Uniform,
            Self::Rayleigh { sigma } => Profile::Rayleigh {
                sigma: sigma.unwrap_or(DEFAULT_RAYLEIGH_SIGMA),
            },
            Self::LogNormal { sigma, mu } => Profile::LogNormal {
                sigma: sigma.unwrap_or(DEFAULT_LOG_NORMAL_SIGMA),
                mu: mu.unwrap_or(DEFAULT_LOG_NORMAL_MU),
            },
        }
    }
}

/// Distribution with every parameter resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    Gaussian { sigma_x: f64, sigma_y: f64 },
    ExpDecay { rate: f64 },
    Uniform,
    Rayleigh { sigma: f64 },
    LogNormal { sigma: f64, mu: f64 },
}

impl Profile {
    /// Raw (unnormalized) weight at offset `(dx, dy)` from the center.
    #[must_use]
    pub fn weight(&self, dx: f64, dy: f64) -> f64 {
        match *self {
            Self::Gaussian { sigma_x, sigma_y } => (-((dx * dx) / (2.0 * sigma_x * sigma_x)
                + (dy * dy) / (2.0 * sigma_y * sigma_y)))
                .exp(),
            Self::ExpDecay { rate } => (-rate * dx.hypot(dy)).exp(),
            Self::Uniform => 1.0,
            Self::Rayleigh { sigma } => {
                let d = dx.hypot(dy);
                let s2 = sigma * sigma;
                (d / s2) * (-(d * d) / (2.0 * s2)).exp()
            }
            Self::LogNormal { sigma, mu } => {
                let d = dx.hypot(dy);
                let z = (d.ln() - mu) / sigma;
                (-0.5 * z * z).exp() / (sigma * d)
            }
        }
    }
}

/// Cell-center sample coordinates over `[0, width) x [0, height)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    width: usize,
    height: usize,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Mesh {
    #[must_use]
    pub fn cell_centers(width: usize, height: usize) -> Self {
        let len = width * height;
        let mut x = Vec::with_capacity(len);
        let mut y = Vec::with_capacity(len);
        for row in 0..height {
            for col in 0..width {
                x.push(col as f64 + 0.5);
                y.push(row as f64 + 0.5);
            }
        }
        Self {
            width,
            height,
            x,
            y,
        }
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Row-major x coordinates.
    #[must_use]
    pub fn xs(&self) -> &[f64] {
        &self.x
    }

    /// Row-major y coordinates.
    #[must_use]
    pub fn ys(&self) -> &[f64] {
        &self.y
    }

    /// Column and row of the center cell.
    #[must_use]
    pub const fn center(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    /// Evaluates `profile` at every sample, with the center sample fixed at 0.
    ///
    /// The profile is never read at the center, so singular distributions
    /// are safe.
    #[must_use]
    pub fn evaluate(&self, profile: &Profile) -> Vec<f64> {
        let (cx, cy) = self.center();
        let center_idx = cy * self.width + cx;
        let (ox, oy) = (self.x[center_idx], self.y[center_idx]);
        self.x
            .iter()
            .zip(&self.y)
            .enumerate()
            .map(|(idx, (&x, &y))| {
                if idx == center_idx {
                    0.0
                } else {
                    profile.weight(x - ox, y - oy)
                }
            })
            .collect()
    }
}

/// Normalized `(2k + 1)²` weight matrix with a zero center.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    weights: Vec<f64>,
    coverage: f64,
}

impl Kernel {
    /// Builds the kernel for a `width * height` lattice.
    ///
    /// Callers are expected to have validated that `2 * radius < min(width, height)`.
    pub fn build(
        width: usize,
        height: usize,
        radius: usize,
        distribution: &Distribution,
    ) -> Result<Self, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidConfig(
                "lattice dimensions must be non-zero",
            ));
        }
        let min_side = width.min(height);
        if radius * 2 >= min_side {
            return Err(EngineError::NeighbourhoodTooLarge { radius, min_side });
        }
        distribution.validate()?;

        let name = distribution.name();
        let mesh = Mesh::cell_centers(width, height);
        let profile = distribution.resolve(width, height);
        let field = mesh.evaluate(&profile);

        if field.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::DegenerateKernel {
                distribution: name,
                total: f64::NAN,
            });
        }
        let total: f64 = field.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(EngineError::DegenerateKernel {
                distribution: name,
                total,
            });
        }

        let (cx, cy) = mesh.center();
        let side = 2 * radius + 1;
        let mut weights = Vec::with_capacity(side * side);
        for row in (cy - radius)..=(cy + radius) {
            let start = row * width + (cx - radius);
            weights.extend(field[start..start + side].iter().map(|w| w / total));
        }

        let coverage: f64 = weights.iter().sum();
        if !coverage.is_finite() || coverage <= 0.0 {
            return Err(EngineError::DegenerateKernel {
                distribution: name,
                total: coverage,
            });
        }
        for w in &mut weights {
            *w /= coverage;
        }

        debug!(
            distribution = name,
            radius,
            coverage,
            ?profile,
            "built influence kernel"
        );
        Ok(Self {
            radius,
            weights,
            coverage,
        })
    }

    #[must_use]
    pub const fn radius(&self) -> usize {
        self.radius
    }

    /// Kernel side length `2k + 1`.
    #[must_use]
    pub const fn side(&self) -> usize {
        2 * self.radius + 1
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Fraction of the full-field mass inside the crop window.
    #[must_use]
    pub const fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Weight applied to the cell at offset `(dx, dy)`; `None` outside the window.
    #[must_use]
    pub fn weight(&self, dx: isize, dy: isize) -> Option<f64> {
        let r = self.radius as isize;
        if dx.abs() > r || dy.abs() > r {
            return None;
        }
        let col = (dx + r) as usize;
        let row = (dy + r) as usize;
        Some(self.weights[row * self.side() + col])
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Non-zero weights with their offsets, used by the convolution hot loop.
    pub(crate) fn taps(&self) -> Vec<(isize, isize, f64)> {
        let r = self.radius as isize;
        let side = self.side();
        self.weights
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0.0)
            .map(|(idx, &w)| ((idx % side) as isize - r, (idx / side) as isize - r, w))
            .collect()
    }
}
