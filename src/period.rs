// ─────────────────────────────────────────────────────────────────────
// One archive per period (calendar year)
// ─────────────────────────────────────────────────────────────────────

use chrono::NaiveDate;
use glob::glob;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::{
    archive::{cube_to_dataset, write_archive},
    config::BuildConfig,
    cube::build_cube,
    error::CubeError,
    timestamp::chronological,
    timing::timeit,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// The archive already existed and was left untouched.
    Skipped { period: i32, path: PathBuf },
    Written {
        period: i32,
        path: PathBuf,
        slices: usize,
    },
}

/// Rasters of `period`, in path order.
pub fn discover(config: &BuildConfig, period: i32) -> Result<Vec<PathBuf>, CubeError> {
    let dir = config.input_dir(period);
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        config.pattern
    );
    let mut v: Vec<_> = glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    v.sort();
    Ok(v)
}

/// Build the archive of one period unless it is already there.
pub fn build_period(config: &BuildConfig, period: i32) -> Result<PeriodOutcome, CubeError> {
    info!(period, "working on period");
    let path = config.output_path(period);
    if path.exists() {
        info!(period, path = %path.display(), "archive exists, skipping");
        return Ok(PeriodOutcome::Skipped { period, path });
    }

    let files = timeit("discover", || discover(config, period))?;
    if files.is_empty() {
        warn!(period, dir = %config.input_dir(period).display(), "no rasters");
    }
    let entries = chronological(files)?;
    let cube = timeit("decode + stack", || build_cube(period, &entries))?;

    let start = NaiveDate::from_ymd_opt(period, 1, 1).ok_or_else(|| CubeError::Config {
        reason: format!("year {period} is out of range"),
    })?;
    let slices = cube.len();
    let dataset = cube_to_dataset(cube, start);
    timeit("write archive", || write_archive(&dataset, &path))?;

    info!(period, slices, path = %path.display(), "archive written");
    Ok(PeriodOutcome::Written {
        period,
        path,
        slices,
    })
}

/// Every period of the configuration, in order. The first failure stops
/// the run; archives already written stay.
pub fn run_build(config: &BuildConfig) -> Result<Vec<PeriodOutcome>, CubeError> {
    config.validate()?;
    let periods = config.periods();
    info!(count = periods.len(), "building periods");

    periods
        .into_iter()
        .map(|period| timeit(&format!("period {period}"), || build_period(config, period)))
        .collect()
}
