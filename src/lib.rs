//! Stack dated single-band GeoTIFFs into one NetCDF archive per year, and
//! combine a directory of such archives into one.
//!
//! Files are expected as `<root>/<year>/<month>/..._YYYY_MM_DD.tif`. Each
//! year becomes `<year>_simple.nc` holding `precip(time, latitude,
//! longitude)` with time in days since January 1 of that year.

pub mod archive;
pub mod cftime;
pub mod config;
pub mod cube;
pub mod dataset;
pub mod error;
pub mod merge;
pub mod period;
pub mod raster;
pub mod timestamp;
pub mod timing;

pub use config::{BuildConfig, ConfigFile, MergeConfig};
pub use dataset::Dataset;
pub use error::CubeError;
pub use merge::{combine_by_coords, run_merge};
pub use period::{build_period, run_build, PeriodOutcome};
pub use timestamp::parse_filename_date;
