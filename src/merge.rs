// ─────────────────────────────────────────────────────────────────────
// Many archives → one archive, combined by coordinate values
// ─────────────────────────────────────────────────────────────────────

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{
    archive::write_archive,
    config::MergeConfig,
    dataset::{Dataset, Values},
    error::CubeError,
    timing::timeit,
};

/// Combine datasets into one by looking at their coordinate values.
///
/// Datasets are grouped by their set of data variables. Inside a group,
/// every dimension whose coordinate differs between members is concatenated
/// along, members being ordered by the first value of that coordinate.
/// The groups are then merged into one dataset. Attributes and encodings
/// are those of the first dataset.
pub fn combine_by_coords(datasets: Vec<Dataset>) -> Result<Dataset, CubeError> {
    if datasets.is_empty() {
        return Err(CubeError::merge("no archives to combine"));
    }

    let mut groups: Vec<(Vec<String>, Vec<Dataset>)> = Vec::new();
    for ds in datasets {
        let key = ds.data_var_names();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(ds),
            None => groups.push((key, vec![ds])),
        }
    }
    debug!(groups = groups.len(), "grouped by data variables");

    let combined = groups
        .into_iter()
        .map(|(_, members)| combine_group(members))
        .collect::<Result<Vec<_>, _>>()?;
    merge_all(combined)
}

fn combine_group(members: Vec<Dataset>) -> Result<Dataset, CubeError> {
    if members.len() == 1 {
        return Ok(members.into_iter().next().unwrap_or_default());
    }

    let dims = concat_dims(&members)?;
    if dims.is_empty() {
        return Err(CubeError::merge(format!(
            "{} and {} have identical coordinates; nothing to order them by",
            members[0].describe(),
            members[1].describe()
        )));
    }

    let mut current = members;
    for (i, dim) in dims.iter().enumerate() {
        let others = [&dims[..i], &dims[i + 1..]].concat();
        let mut next = Vec::new();
        for row in bin_by(current, &others) {
            next.push(concat_along(dim, row)?);
        }
        current = next;
    }

    match current.len() {
        1 => Ok(current.into_iter().next().unwrap_or_default()),
        n => Err(CubeError::merge(format!(
            "archives do not form a complete hypercube along {}: {n} blocks left",
            dims.join(", ")
        ))),
    }
}

/// Dimensions of the first member whose coordinate differs somewhere in
/// the group. Every member's coordinate must be monotonic, all in the same
/// direction.
fn concat_dims(members: &[Dataset]) -> Result<Vec<String>, CubeError> {
    let first = &members[0];
    let mut dims = Vec::new();

    for (dim, _) in &first.dims {
        let Some(reference) = first.coordinate(dim) else {
            continue;
        };
        let mut differs = false;
        for other in &members[1..] {
            let coord = other.coordinate(dim).ok_or_else(|| CubeError::MissingVariable {
                name: dim.clone(),
                path: other.describe().into(),
            })?;
            differs |= coord.values != reference.values;
        }
        if !differs {
            continue;
        }

        let mut direction = None;
        for ds in members {
            let order = ds.coordinate(dim).and_then(|c| c.values.monotonic());
            match (order, direction) {
                (None, _) => {
                    return Err(CubeError::merge(format!(
                        "coordinate '{dim}' of {} is not monotonic",
                        ds.describe()
                    )))
                }
                (Some(Ordering::Equal), _) => {}
                (Some(o), None) => direction = Some(o),
                (Some(o), Some(d)) if o != d => {
                    return Err(CubeError::merge(format!(
                        "coordinate '{dim}' runs in opposite directions across archives"
                    )))
                }
                _ => {}
            }
        }
        dims.push(dim.clone());
    }
    Ok(dims)
}

/// Split `members` into rows that agree on the coordinates of `others`,
/// keeping first-seen order.
fn bin_by(members: Vec<Dataset>, others: &[String]) -> Vec<Vec<Dataset>> {
    let mut bins: Vec<Vec<Dataset>> = Vec::new();
    for ds in members {
        let slot = bins.iter_mut().find(|bin| {
            others.iter().all(|d| {
                let a = bin[0].coordinate(d).map(|c| &c.values);
                let b = ds.coordinate(d).map(|c| &c.values);
                a == b
            })
        });
        match slot {
            Some(bin) => bin.push(ds),
            None => bins.push(vec![ds]),
        }
    }
    bins
}

fn first_key(ds: &Dataset, dim: &str) -> f64 {
    ds.coordinate(dim)
        .and_then(|c| c.values.keys().first().copied())
        .unwrap_or(f64::NAN)
}

/// Order `row` by the first value of `dim` and join it along `dim`.
fn concat_along(dim: &str, mut row: Vec<Dataset>) -> Result<Dataset, CubeError> {
    if row.len() == 1 {
        return Ok(row.remove(0));
    }

    let descending = row
        .iter()
        .filter_map(|ds| ds.coordinate(dim).and_then(|c| c.values.monotonic()))
        .any(|o| o == Ordering::Greater);
    row.sort_by(|a, b| {
        let ord = first_key(a, dim).total_cmp(&first_key(b, dim));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });

    let first = &row[0];
    let mut out = Dataset {
        dims: first.dims.clone(),
        variables: Vec::with_capacity(first.variables.len()),
        attributes: first.attributes.clone(),
        source: None,
    };

    for other in &row[1..] {
        if let Some(extra) = other
            .variables
            .iter()
            .find(|v| first.variable(&v.name).is_none())
        {
            return Err(CubeError::merge(format!(
                "variable '{}' of {} is missing from {}",
                extra.name,
                other.describe(),
                first.describe()
            )));
        }
    }

    for var in &first.variables {
        let parts = row
            .iter()
            .map(|ds| {
                ds.variable(&var.name).ok_or_else(|| CubeError::MissingVariable {
                    name: var.name.clone(),
                    path: ds.describe().into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let Some(axis) = var.dims.iter().position(|d| d == dim) else {
            if parts[1..].iter().any(|p| !p.same_data(var)) {
                return Err(CubeError::merge(format!(
                    "variable '{}' lacks dimension '{dim}' but differs between archives",
                    var.name
                )));
            }
            out.variables.push(var.clone());
            continue;
        };

        if let Some(odd) = parts.iter().find(|p| p.dims != var.dims) {
            return Err(CubeError::merge(format!(
                "variable '{}' has dimensions ({}) in one archive and ({}) in another",
                var.name,
                var.dims.join(", "),
                odd.dims.join(", ")
            )));
        }
        let values: Vec<&Values> = parts.iter().map(|p| &p.values).collect();
        let mut joined = var.clone();
        joined.values = Values::concatenate(axis, &values)?;
        out.variables.push(joined);
    }

    let len = out
        .coordinate(dim)
        .map(|c| c.values.shape()[0])
        .ok_or_else(|| CubeError::MissingVariable {
            name: dim.to_string(),
            path: first.describe().into(),
        })?;
    if let Some(entry) = out.dims.iter_mut().find(|(n, _)| n == dim) {
        entry.1 = len;
    }

    if out.coordinate(dim).and_then(|c| c.values.monotonic()).is_none() {
        return Err(CubeError::merge(format!(
            "combined coordinate '{dim}' is not strictly monotonic; archives overlap"
        )));
    }
    Ok(out)
}

/// Union of variables. A variable found in several inputs must be identical.
fn merge_all(datasets: Vec<Dataset>) -> Result<Dataset, CubeError> {
    let mut iter = datasets.into_iter();
    let mut out = iter
        .next()
        .ok_or_else(|| CubeError::merge("no archives to combine"))?;

    for ds in iter {
        for (name, len) in &ds.dims {
            match out.dim_len(name) {
                Some(have) if have != *len => {
                    return Err(CubeError::merge(format!(
                        "dimension '{name}' has length {have} in one group and {len} in another"
                    )))
                }
                Some(_) => {}
                None => out.dims.push((name.clone(), *len)),
            }
        }
        for var in ds.variables {
            match out.variable(&var.name) {
                Some(have) if !have.same_data(&var) => {
                    return Err(CubeError::merge(format!(
                        "variable '{}' conflicts between archive groups",
                        var.name
                    )))
                }
                Some(_) => {}
                None => out.variables.push(var),
            }
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────
// Directory driver
// ─────────────────────────────────────────────────────────────────────

/// Archives under `config.input_dir` that take part in the merge, sorted.
/// The merge output is never one of them.
pub fn discover_archives(config: &MergeConfig) -> Result<Vec<PathBuf>, CubeError> {
    let output = config.output_path()?;
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&config.input_dir.to_string_lossy()),
        config.pattern
    );

    let mut paths: Vec<_> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file() && !same_file(p, &output))
        .collect();
    paths.sort();
    Ok(paths)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Open every archive in the directory, combine and write the result.
/// Returns the path written.
pub fn run_merge(config: &MergeConfig) -> Result<PathBuf, CubeError> {
    let output = config.output_path()?;
    let paths = discover_archives(config)?;
    if paths.is_empty() {
        return Err(CubeError::merge(format!(
            "no archives matching '{}' in {}",
            config.pattern,
            config.input_dir.display()
        )));
    }
    info!(count = paths.len(), dir = %config.input_dir.display(), "merging archives");

    let datasets = timeit("open archives", || {
        paths
            .iter()
            .map(|p| Dataset::open(p))
            .collect::<Result<Vec<_>, _>>()
    })?;
    let combined = timeit("combine", || combine_by_coords(datasets))?;
    timeit("write merged", || write_archive(&combined, &output))?;

    info!(path = %output.display(), "merged archive written");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use ndarray::{arr1, ArrayD, IxDyn};

    fn series(name: &str, times: &[f64], vals: &[f32]) -> Dataset {
        Dataset {
            dims: vec![("time".to_string(), times.len()), ("x".to_string(), 1)],
            variables: vec![
                Variable::new("time", &["time"], Values::F64(arr1(times).into_dyn())),
                Variable::new("x", &["x"], Values::F64(arr1(&[0.5]).into_dyn())),
                Variable::new(
                    name,
                    &["time", "x"],
                    Values::F32(ArrayD::from_shape_vec(IxDyn(&[vals.len(), 1]), vals.to_vec()).unwrap()),
                ),
            ],
            ..Dataset::default()
        }
    }

    #[test]
    fn disjoint_spans_sorted_by_first_value() {
        let late = series("p", &[2.0, 3.0], &[20.0, 30.0]);
        let early = series("p", &[0.0, 1.0], &[0.0, 10.0]);
        let out = combine_by_coords(vec![late, early]).unwrap();

        assert_eq!(out.dim_len("time"), Some(4));
        assert_eq!(out.coordinate("time").unwrap().values.keys(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(out.variable("p").unwrap().values.keys(), vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(out.variable("x").unwrap().values.keys(), vec![0.5]);
    }

    #[test]
    fn overlapping_spans_fail() {
        let a = series("p", &[0.0, 1.0], &[0.0, 1.0]);
        let b = series("p", &[1.0, 2.0], &[1.0, 2.0]);
        assert!(matches!(
            combine_by_coords(vec![a, b]).unwrap_err(),
            CubeError::Merge { .. }
        ));
    }

    #[test]
    fn identical_archives_fail() {
        let a = series("p", &[0.0], &[0.0]);
        assert!(combine_by_coords(vec![a.clone(), a]).is_err());
    }

    #[test]
    fn differing_static_variable_fails() {
        let mut a = series("p", &[0.0], &[0.0]);
        let mut b = series("p", &[1.0], &[1.0]);
        b.variables.push(Variable::new("mask", &["x"], Values::I32(arr1(&[1]).into_dyn())));
        a.variables.push(Variable::new("mask", &["x"], Values::I32(arr1(&[0]).into_dyn())));
        assert!(combine_by_coords(vec![a, b]).is_err());
    }

    #[test]
    fn groups_are_merged_by_union() {
        let p = series("p", &[0.0, 1.0], &[1.0, 2.0]);
        let q = series("q", &[0.0, 1.0], &[3.0, 4.0]);
        let out = combine_by_coords(vec![p, q]).unwrap();
        assert_eq!(out.data_var_names(), vec!["p".to_string(), "q".to_string()]);
        assert_eq!(out.dim_len("time"), Some(2));
    }

    #[test]
    fn groups_with_conflicting_coordinates_fail() {
        let p = series("p", &[0.0, 1.0], &[1.0, 2.0]);
        let q = series("q", &[5.0, 6.0], &[3.0, 4.0]);
        assert!(combine_by_coords(vec![p, q]).is_err());
    }

    #[test]
    fn descending_coordinates_keep_their_direction() {
        let a = series("p", &[3.0, 2.0], &[3.0, 2.0]);
        let b = series("p", &[1.0, 0.0], &[1.0, 0.0]);
        let out = combine_by_coords(vec![b, a]).unwrap();
        assert_eq!(out.coordinate("time").unwrap().values.keys(), vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn single_archive_passes_through() {
        let a = series("p", &[0.0], &[7.0]);
        assert_eq!(combine_by_coords(vec![a.clone()]).unwrap(), a);
    }

    #[test]
    fn empty_input_fails() {
        assert!(combine_by_coords(Vec::new()).is_err());
    }

    /// One cell of a (time, x) grid.
    fn tile(t: f64, x: f64, v: f32) -> Dataset {
        Dataset {
            dims: vec![("time".to_string(), 1), ("x".to_string(), 1)],
            variables: vec![
                Variable::new("time", &["time"], Values::F64(arr1(&[t]).into_dyn())),
                Variable::new("x", &["x"], Values::F64(arr1(&[x]).into_dyn())),
                Variable::new(
                    "p",
                    &["time", "x"],
                    Values::F32(ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![v]).unwrap()),
                ),
            ],
            ..Dataset::default()
        }
    }

    #[test]
    fn two_by_two_tiles_form_one_grid() {
        let tiles = vec![
            tile(1.0, 20.0, 120.0),
            tile(0.0, 10.0, 10.0),
            tile(1.0, 10.0, 110.0),
            tile(0.0, 20.0, 20.0),
        ];
        let out = combine_by_coords(tiles).unwrap();

        assert_eq!(out.dim_len("time"), Some(2));
        assert_eq!(out.dim_len("x"), Some(2));
        assert_eq!(out.coordinate("time").unwrap().values.keys(), vec![0.0, 1.0]);
        assert_eq!(out.coordinate("x").unwrap().values.keys(), vec![10.0, 20.0]);
        let p = out.variable("p").unwrap();
        assert_eq!(p.values.shape(), &[2, 2]);
        assert_eq!(p.values.keys(), vec![10.0, 20.0, 110.0, 120.0]);
    }

    #[test]
    fn missing_tile_is_an_incomplete_grid() {
        let tiles = vec![tile(1.0, 20.0, 120.0), tile(0.0, 10.0, 10.0), tile(1.0, 10.0, 110.0)];
        assert!(matches!(
            combine_by_coords(tiles).unwrap_err(),
            CubeError::Merge { .. }
        ));
    }

    #[test]
    fn byte_variables_are_concatenated_and_kept() {
        let with_flags = |times: &[f64], qc: &[u8]| {
            let mut ds = series("p", times, &vec![0.0; times.len()]);
            ds.variables.push(Variable::new(
                "qc",
                &["time", "x"],
                Values::U8(ArrayD::from_shape_vec(IxDyn(&[qc.len(), 1]), qc.to_vec()).unwrap()),
            ));
            ds.variables.push(Variable::new("mask", &["x"], Values::U8(arr1(&[1u8]).into_dyn())));
            ds
        };
        let out = combine_by_coords(vec![with_flags(&[2.0], &[9]), with_flags(&[0.0, 1.0], &[3, 4])])
            .unwrap();

        let qc = out.variable("qc").unwrap();
        assert_eq!(qc.values.dtype(), "u8");
        assert_eq!(qc.values.keys(), vec![3.0, 4.0, 9.0]);
        assert_eq!(out.variable("mask").unwrap().values, Values::U8(arr1(&[1u8]).into_dyn()));
    }
}
