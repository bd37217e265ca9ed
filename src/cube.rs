// ─────────────────────────────────────────────────────────────────────
// Rasters → time × latitude × longitude cube
// ─────────────────────────────────────────────────────────────────────

use chrono::NaiveDate;
use ndarray::{stack, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::debug;

use crate::{
    error::CubeError,
    raster::{read_raster, Raster},
};

/// One period stacked in memory. `precip[[t, j, i]]` is the pixel of row `j`,
/// column `i` of the `t`-th raster.
#[derive(Debug, Clone)]
pub struct Cube {
    pub times: Vec<NaiveDate>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub precip: Array3<f32>,
}

impl Cube {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Decode every file (in parallel, order preserved) and stack them.
///
/// `entries` must already be in the order the time axis should have.
pub fn build_cube(period: i32, entries: &[(PathBuf, NaiveDate)]) -> Result<Cube, CubeError> {
    if entries.is_empty() {
        return Err(CubeError::NoRasters { period });
    }

    let slices = entries
        .par_iter()
        .map(|(path, date)| {
            debug!(path = %path.display(), "decoding");
            read_raster(path).map(|r| (*date, r))
        })
        .collect::<Result<Vec<_>, _>>()?;

    assemble(period, slices)
}

/// Validate that all rasters share a grid, then stack them along a new
/// leading time axis. CRS and transform are dropped after validation.
pub fn assemble(period: i32, slices: Vec<(NaiveDate, Raster)>) -> Result<Cube, CubeError> {
    let (times, rasters): (Vec<_>, Vec<_>) = slices.into_iter().unzip();
    let first = rasters.first().ok_or(CubeError::NoRasters { period })?;
    validate_grids(&rasters)?;

    let latitude = first.grid.y_coords();
    let longitude = first.grid.x_coords();

    let views: Vec<ArrayView2<f32>> = rasters.iter().map(|r| r.data.view()).collect();
    let precip = stack(Axis(0), &views).map_err(|e| CubeError::Raster {
        path: first.path.clone(),
        reason: format!("stacking failed: {e}"),
    })?;

    Ok(Cube {
        times,
        latitude,
        longitude,
        precip,
    })
}

/// Pre-flight check: same shape, CRS and transform as the first raster.
pub fn validate_grids(rasters: &[Raster]) -> Result<(), CubeError> {
    let Some(first) = rasters.first() else {
        return Ok(());
    };
    for r in &rasters[1..] {
        if (r.grid.rows, r.grid.cols) != (first.grid.rows, first.grid.cols) {
            return Err(CubeError::ShapeMismatch {
                path: r.path.clone(),
                rows: first.grid.rows,
                cols: first.grid.cols,
                got_rows: r.grid.rows,
                got_cols: r.grid.cols,
            });
        }
        if let Some(reason) = first.grid.mismatch(&r.grid) {
            return Err(CubeError::GridMismatch {
                path: r.path.clone(),
                reason,
            });
        }
    }
    Ok(())
}
