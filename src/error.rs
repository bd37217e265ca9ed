// ─────────────────────────────────────────────────────────────────────
// Error type shared by the build and merge pipelines
// ─────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

/// Every failure is fatal to the current unit of work (one period, or the
/// whole merge); nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum CubeError {
    /// File name does not end in `_YYYY_MM_DD`.
    #[error("bad file name {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TIFF could not be decoded, or has a layout we do not stack.
    #[error("raster {}: {reason}", path.display())]
    Raster { path: PathBuf, reason: String },

    #[error(
        "raster {} is {got_rows}×{got_cols}, expected {rows}×{cols} like the first raster of the period",
        path.display()
    )]
    ShapeMismatch {
        path: PathBuf,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    /// Same shape, but a different CRS or geotransform.
    #[error("raster {} is not on the same grid as the first raster: {reason}", path.display())]
    GridMismatch { path: PathBuf, reason: String },

    #[error("no rasters found for period {period}")]
    NoRasters { period: i32 },

    #[error("netcdf error: {reason}")]
    Netcdf { reason: String },

    #[error("variable '{name}' not found in {}", path.display())]
    MissingVariable { name: String, path: PathBuf },

    #[error("variable '{name}' has unsupported type {vartype}")]
    UnsupportedType { name: String, vartype: String },

    #[error("invalid time: {reason}")]
    InvalidTime { reason: String },

    /// Archives that cannot be combined by coordinates.
    #[error("cannot merge archives: {reason}")]
    Merge { reason: String },

    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("bad glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

impl CubeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CubeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn merge(reason: impl Into<String>) -> Self {
        CubeError::Merge {
            reason: reason.into(),
        }
    }
}

impl From<netcdf::Error> for CubeError {
    fn from(e: netcdf::Error) -> Self {
        CubeError::Netcdf {
            reason: e.to_string(),
        }
    }
}
