//! Stamps that force a region of the lattice to one spin.
//!
//! Both stamps clip to the lattice: cells that would fall outside are
//! skipped and the return value counts only the cells actually written.

use serde::{Deserialize, Serialize};

use crate::{Lattice, Spin};

/// Region shape used by [`crate::IceEngine::perturb`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationShape {
    /// Disc of the given radius around the center cell.
    #[default]
    Circle,
    /// Square whose side equals the given radius.
    Square,
}

impl PerturbationShape {
    /// Applies the stamp centered on `(center_row, center_col)`.
    pub fn apply(
        self,
        lattice: &mut Lattice,
        center_row: usize,
        center_col: usize,
        radius: usize,
        value: Spin,
    ) -> usize {
        match self {
            Self::Circle => stamp_circle(lattice, center_row, center_col, radius, value),
            Self::Square => stamp_square(lattice, center_row, center_col, radius, value),
        }
    }
}

/// Sets every cell within Euclidean distance `radius` of the center to `value`.
///
/// The center itself is always included when it lies on the lattice.
pub fn stamp_circle(
    lattice: &mut Lattice,
    center_row: usize,
    center_col: usize,
    radius: usize,
    value: Spin,
) -> usize {
    let row_start = center_row.saturating_sub(radius);
    let row_end = center_row.saturating_add(radius).min(lattice.height() - 1);
    let col_start = center_col.saturating_sub(radius);
    let col_end = center_col.saturating_add(radius).min(lattice.width() - 1);
    let radius_sq = radius.saturating_mul(radius);

    let mut written = 0;
    for row in row_start..=row_end {
        let dr = row.abs_diff(center_row);
        for col in col_start..=col_end {
            let dc = col.abs_diff(center_col);
            let dist_sq = dr.saturating_mul(dr).saturating_add(dc.saturating_mul(dc));
            if dist_sq <= radius_sq && lattice.set(col, row, value) {
                written += 1;
            }
        }
    }
    written
}

/// Sets a `side x side` block whose top-left corner is
/// `(center_row - side / 2, center_col - side / 2)`, clamped at 0.
pub fn stamp_square(
    lattice: &mut Lattice,
    center_row: usize,
    center_col: usize,
    side: usize,
    value: Spin,
) -> usize {
    let top = center_row.saturating_sub(side / 2);
    let left = center_col.saturating_sub(side / 2);
    let bottom = top.saturating_add(side).min(lattice.height());
    let right = left.saturating_add(side).min(lattice.width());

    let mut written = 0;
    for row in top..bottom {
        for col in left..right {
            if lattice.set(col, row, value) {
                written += 1;
            }
        }
    }
    written
}
