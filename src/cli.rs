use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tiffs_to_netcdf: daily GeoTIFF rasters to yearly NetCDF archives.
#[derive(Parser)]
#[command(
    name = "tiffs_to_netcdf",
    version,
    about = "Stack dated GeoTIFFs into yearly NetCDF archives and merge them"
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace). Progress is shown by default.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build one archive per year from `<input-root>/<year>/<pattern>`.
    Build(BuildArgs),
    /// Combine every archive in a directory into one.
    Merge(MergeArgs),
}

#[derive(clap::Args)]
pub struct BuildArgs {
    /// TOML file with a `[build]` table.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per year.
    #[arg(long)]
    pub input_root: Option<PathBuf>,

    /// Where `<year>_simple.nc` files are written.
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[arg(long)]
    pub first_year: Option<i32>,

    #[arg(long)]
    pub last_year: Option<i32>,

    /// Build only this year (repeatable).
    #[arg(long)]
    pub only: Vec<i32>,

    /// Stop after this many years.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Raster glob relative to each year directory.
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(clap::Args)]
pub struct MergeArgs {
    /// TOML file with a `[merge]` table.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory of archives to combine.
    #[arg(short, long)]
    pub input_dir: Option<PathBuf>,

    /// Merged archive path (default `<input-dir>/<dir name>.nc`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Archive glob relative to the input directory.
    #[arg(long)]
    pub pattern: Option<String>,
}
