//! Read-only observables computed from a lattice snapshot.

use serde::{Deserialize, Serialize};

use crate::Lattice;

/// Mean spin, in `[-1, 1]`.
#[must_use]
pub fn magnetization(lattice: &Lattice) -> f64 {
    let total: i64 = lattice.cells().iter().map(|s| i64::from(s.value())).sum();
    total as f64 / lattice.len() as f64
}

/// Sum over cells of `spin * (sum of the four wrapped neighbours)`.
///
/// Each interacting pair is counted once from each side; an all-up
/// lattice yields `4 * width * height`.
#[must_use]
pub fn energy(lattice: &Lattice) -> i64 {
    let width = lattice.width() as isize;
    let height = lattice.height() as isize;
    let mut total = 0_i64;
    for y in 0..height {
        for x in 0..width {
            let neighbours = i64::from(lattice.get_wrapped(x, y - 1).value())
                + i64::from(lattice.get_wrapped(x, y + 1).value())
                + i64::from(lattice.get_wrapped(x - 1, y).value())
                + i64::from(lattice.get_wrapped(x + 1, y).value());
            total += i64::from(lattice.get_wrapped(x, y).value()) * neighbours;
        }
    }
    total
}

/// Mean of `spin(x, y) * spin(x, y - 1)` with vertical wrap.
#[must_use]
pub fn correlation(lattice: &Lattice) -> f64 {
    let width = lattice.width();
    let height = lattice.height();
    let cells = lattice.cells();
    let mut total = 0_i64;
    for y in 0..height {
        let above = if y == 0 { height - 1 } else { y - 1 };
        for x in 0..width {
            total += i64::from(cells[y * width + x].value())
                * i64::from(cells[above * width + x].value());
        }
    }
    total as f64 / lattice.len() as f64
}

/// Population standard deviation of the spins.
#[must_use]
pub fn spin_std(lattice: &Lattice) -> f64 {
    let m = magnetization(lattice);
    // Spins are +-1, so E[s^2] = 1.
    (1.0 - m * m).max(0.0).sqrt()
}

/// Arithmetic mean of an influence buffer; 0 when empty.
#[must_use]
pub fn mean_influence(influence: &[f64]) -> f64 {
    if influence.is_empty() {
        return 0.0;
    }
    influence.iter().sum::<f64>() / influence.len() as f64
}

/// All observables for one lattice state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub magnetization: f64,
    pub energy: i64,
    pub correlation: f64,
    pub mean_influence: f64,
    pub spin_std: f64,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn measure(lattice: &Lattice, influence: &[f64]) -> Self {
        Self {
            magnetization: magnetization(lattice),
            energy: energy(lattice),
            correlation: correlation(lattice),
            mean_influence: mean_influence(influence),
            spin_std: spin_std(lattice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Spin;

    fn checkerboard(width: usize, height: usize) -> Lattice {
        let values: Vec<i8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| if (x + y) % 2 == 0 { 1 } else { -1 }))
            .collect();
        Lattice::from_values(width, height, &values).expect("lattice")
    }

    #[test]
    fn all_up_energy_counts_each_pair_twice() {
        let lattice = Lattice::uniform(4, 4, Spin::Up).expect("lattice");
        assert_eq!(energy(&lattice), 4 * 4 * 4);
        assert_eq!(magnetization(&lattice), 1.0);
        assert_eq!(correlation(&lattice), 1.0);
        assert_eq!(spin_std(&lattice), 0.0);
    }

    #[test]
    fn checkerboard_is_anti_aligned() {
        let lattice = checkerboard(4, 4);
        assert_eq!(magnetization(&lattice), 0.0);
        assert_eq!(energy(&lattice), -64);
        assert_eq!(correlation(&lattice), -1.0);
        assert_eq!(spin_std(&lattice), 1.0);
    }

    #[test]
    fn correlation_only_looks_along_rows() {
        // Horizontal stripes: rows alternate, columns constant.
        let values = [1, 1, 1, 1, -1, -1, -1, -1, 1, 1, 1, 1, -1, -1, -1, -1];
        let stripes = Lattice::from_values(4, 4, &values).expect("lattice");
        assert_eq!(correlation(&stripes), -1.0);
        // Vertical stripes: columns alternate, rows constant.
        let values = [1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1];
        let stripes = Lattice::from_values(4, 4, &values).expect("lattice");
        assert_eq!(correlation(&stripes), 1.0);
        assert_eq!(energy(&stripes), 0);
    }

    #[test]
    fn single_flipped_spin_energy() {
        let mut lattice = Lattice::uniform(5, 5, Spin::Up).expect("lattice");
        lattice.set(2, 2, Spin::Down);
        // The flipped cell loses 8 (4 -> -4) and each neighbour loses 2 (4 -> 2).
        assert_eq!(energy(&lattice), 100 - 8 - 4 * 2);
        assert!((magnetization(&lattice) - 23.0 / 25.0).abs() < 1e-12);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let lattice = checkerboard(6, 3);
        let influence = vec![0.25; 18];
        let a = MetricsSnapshot::measure(&lattice, &influence);
        let b = MetricsSnapshot::measure(&lattice, &influence);
        assert_eq!(a, b);
        assert_eq!(a.mean_influence, 0.25);
        assert_eq!(mean_influence(&[]), 0.0);
    }
}
