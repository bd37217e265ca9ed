// ─────────────────────────────────────────────────────────────────────
// File-name → calendar date
// ─────────────────────────────────────────────────────────────────────

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::error::CubeError;

/// Turn `rainfall_new_day_statewide_data_map_1990_01_01.tif` → 1990-01-01.
///
/// Only the last three underscore-separated tokens of the stem are looked
/// at, so the prefix may contain any number of underscores.
pub fn parse_filename_date(path: &Path) -> Result<NaiveDate, CubeError> {
    let bad = |reason: String| CubeError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| bad("no utf-8 file stem".to_string()))?;
    let parts: Vec<_> = stem.split('_').collect();
    if parts.len() < 3 {
        return Err(bad(format!(
            "expected at least three '_'-separated tokens, got {}",
            parts.len()
        )));
    }

    let joined = parts[parts.len() - 3..].join("-");
    NaiveDate::parse_from_str(&joined, "%Y-%m-%d")
        .map_err(|e| bad(format!("'{joined}' is not a YYYY-MM-DD date: {e}")))
}

/// One date per path, in the order given.
pub fn time_index(paths: &[PathBuf]) -> Result<Vec<NaiveDate>, CubeError> {
    paths.iter().map(|p| parse_filename_date(p)).collect()
}

/// Pair every path with its date and stable-sort by date.
///
/// Directory listings are not guaranteed to be chronological; paths that
/// share a date keep their relative order.
pub fn chronological(paths: Vec<PathBuf>) -> Result<Vec<(PathBuf, NaiveDate)>, CubeError> {
    let dates = time_index(&paths)?;
    let mut pairs: Vec<_> = paths.into_iter().zip(dates).collect();
    pairs.sort_by_key(|(_, d)| *d);
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_trailing_tokens() {
        let p = Path::new("/x/1990/01/rainfall_new_day_statewide_data_map_1990_01_01.tif");
        assert_eq!(parse_filename_date(p).unwrap(), ymd(1990, 1, 1));
    }

    #[test]
    fn parses_bare_date_stem() {
        assert_eq!(
            parse_filename_date(Path::new("2024_02_29.tif")).unwrap(),
            ymd(2024, 2, 29)
        );
    }

    #[test]
    fn only_last_extension_is_stripped() {
        let p = Path::new("rain_v1.2_2001_12_31.tif");
        assert_eq!(parse_filename_date(p).unwrap(), ymd(2001, 12, 31));
    }

    #[test]
    fn too_few_tokens_fails() {
        let err = parse_filename_date(Path::new("rain_199001.tif")).unwrap_err();
        assert!(matches!(err, CubeError::Format { .. }));
    }

    #[test]
    fn non_date_tail_fails() {
        assert!(parse_filename_date(Path::new("rain_map_data_final.tif")).is_err());
        assert!(parse_filename_date(Path::new("rain_1990_02_30.tif")).is_err());
        assert!(parse_filename_date(Path::new("rain_1990_13_01.tif")).is_err());
    }

    #[test]
    fn time_index_keeps_input_order() {
        let paths = vec![
            PathBuf::from("r_1990_01_03.tif"),
            PathBuf::from("r_1990_01_01.tif"),
        ];
        let idx = time_index(&paths).unwrap();
        assert_eq!(idx, vec![ymd(1990, 1, 3), ymd(1990, 1, 1)]);
    }

    #[test]
    fn time_index_aborts_on_first_bad_name() {
        let paths = vec![PathBuf::from("r_1990_01_01.tif"), PathBuf::from("readme.tif")];
        assert!(time_index(&paths).is_err());
    }

    #[test]
    fn chronological_sorts_stably() {
        let paths = vec![
            PathBuf::from("b_1990_01_02.tif"),
            PathBuf::from("a_1990_01_01.tif"),
            PathBuf::from("c_1990_01_02.tif"),
        ];
        let sorted = chronological(paths).unwrap();
        let names: Vec<_> = sorted
            .iter()
            .map(|(p, _)| p.to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["a_1990_01_01.tif", "b_1990_01_02.tif", "c_1990_01_02.tif"]
        );
    }
}
