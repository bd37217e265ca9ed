mod cli;
mod logging;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tiffs_to_netcdf::{
    config::{BuildToml, MergeToml},
    run_build, run_merge, BuildConfig, ConfigFile, MergeConfig, PeriodOutcome,
};

use crate::cli::{BuildArgs, Cli, Command, MergeArgs};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Build(args) => build(args),
        Command::Merge(args) => merge(args),
    }
}

fn load(path: Option<&std::path::Path>) -> Result<ConfigFile> {
    match path {
        Some(p) => ConfigFile::load(p)
            .with_context(|| format!("failed to load config: {}", p.display())),
        None => Ok(ConfigFile::default()),
    }
}

fn build(args: BuildArgs) -> Result<()> {
    let file = load(args.config.as_deref())?;
    let toml = BuildToml {
        input_root: args.input_root.or(file.build.input_root),
        output_root: args.output_root.or(file.build.output_root),
        first_year: args.first_year.or(file.build.first_year),
        last_year: args.last_year.or(file.build.last_year),
        only: if args.only.is_empty() { file.build.only } else { args.only },
        limit: args.limit.or(file.build.limit),
        pattern: args.pattern.or(file.build.pattern),
        output_suffix: file.build.output_suffix,
    };
    let config = BuildConfig::try_from(toml).context("invalid build configuration")?;

    let outcomes = run_build(&config).context("build failed")?;
    for outcome in &outcomes {
        match outcome {
            PeriodOutcome::Skipped { period, path } => {
                eprintln!("{period}: exists, skipped ({})", path.display())
            }
            PeriodOutcome::Written { period, path, slices } => {
                eprintln!("{period}: {slices} slices → {}", path.display())
            }
        }
    }
    Ok(())
}

fn merge(args: MergeArgs) -> Result<()> {
    let file = load(args.config.as_deref())?;
    let toml = MergeToml {
        input_dir: args.input_dir.or(file.merge.input_dir),
        output: args.output.or(file.merge.output),
        pattern: args.pattern.or(file.merge.pattern),
    };
    let config = MergeConfig::try_from(toml).context("invalid merge configuration")?;

    let path = run_merge(&config)
        .with_context(|| format!("merge of {} failed", config.input_dir.display()))?;
    eprintln!("merged → {}", path.display());
    Ok(())
}
