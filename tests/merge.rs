mod common;

use std::fs;
use tiffs_to_netcdf::{
    build_period, dataset::Values, merge::discover_archives, run_merge, BuildConfig, CubeError,
    Dataset, MergeConfig,
};

use common::daily;

/// Yearly archives for 1990 (Dec 30, Dec 31) and 1991 (Jan 1, Jan 2)
/// under `<tmp>/archives`.
fn two_years(input: &std::path::Path, archives: &std::path::Path) {
    daily(input, 1990, 12, 30, 1.0);
    daily(input, 1990, 12, 31, 2.0);
    daily(input, 1991, 1, 1, 3.0);
    daily(input, 1991, 1, 2, 4.0);
    let config = BuildConfig::new(input, archives);
    build_period(&config, 1991).unwrap();
    build_period(&config, 1990).unwrap();
}

#[test]
fn disjoint_years_merge_into_sorted_union() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let archives = work.path().join("archives");
    two_years(input.path(), &archives);

    let out = run_merge(&MergeConfig::new(&archives)).unwrap();
    assert_eq!(out.file_name().unwrap(), "archives.nc");

    let ds = Dataset::open(&out).unwrap();
    assert_eq!(ds.dim_len("time"), Some(4));
    let expected: Vec<f64> = [1.0, 2.0, 3.0, 4.0]
        .iter()
        .flat_map(|&v| [v; 4])
        .collect();
    assert_eq!(ds.variable("precip").unwrap().values.keys(), expected);
    assert_eq!(ds.coordinate("latitude").unwrap().values.keys(), vec![21.875, 21.625]);

    let time = ds.coordinate("time").unwrap();
    assert_eq!(
        time.encoding.units.unwrap().to_string(),
        "days since 1990-01-01 00:00:00"
    );
    let file = netcdf::open(&out).unwrap();
    assert_eq!(
        file.variable("time").unwrap().get_values::<i64, _>(..).unwrap(),
        vec![363, 364, 365, 366]
    );
    assert!(matches!(time.values, Values::Time(_)));
}

#[test]
fn rerun_ignores_previous_output() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let archives = work.path().join("archives");
    two_years(input.path(), &archives);

    let config = MergeConfig::new(&archives);
    let first = run_merge(&config).unwrap();
    assert_eq!(discover_archives(&config).unwrap().len(), 2);

    let second = run_merge(&config).unwrap();
    assert_eq!(first, second);
    assert_eq!(Dataset::open(&second).unwrap().dim_len("time"), Some(4));
}

#[test]
fn explicit_output_path() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let archives = work.path().join("archives");
    two_years(input.path(), &archives);

    let target = work.path().join("merged").join("all.nc");
    let out = run_merge(&MergeConfig::new(&archives).with_output(&target)).unwrap();
    assert_eq!(out, target);
    assert!(target.exists());
    assert!(!archives.join("archives.nc").exists());
}

#[test]
fn overlapping_archives_fail() {
    let input = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let archives = work.path().join("archives");
    daily(input.path(), 1990, 1, 1, 1.0);
    daily(input.path(), 1990, 1, 2, 2.0);
    let config = BuildConfig::new(input.path(), &archives);
    build_period(&config, 1990).unwrap();
    fs::copy(config.output_path(1990), archives.join("1990_copy.nc")).unwrap();

    let err = run_merge(&MergeConfig::new(&archives)).unwrap_err();
    assert!(matches!(err, CubeError::Merge { .. }));
    assert!(!archives.join("archives.nc").exists());
}

#[test]
fn empty_directory_fails() {
    let work = tempfile::tempdir().unwrap();
    let err = run_merge(&MergeConfig::new(work.path())).unwrap_err();
    assert!(matches!(err, CubeError::Merge { .. }));
}
