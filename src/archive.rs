// ─────────────────────────────────────────────────────────────────────
// Cube → self-describing archive
// ─────────────────────────────────────────────────────────────────────

use chrono::NaiveDate;
use ndarray::Array1;
use std::{fs, io, path::Path};

use crate::{
    cftime::TimeUnits,
    cube::Cube,
    dataset::{Dataset, Encoding, Values, Variable},
    error::CubeError,
};

pub const PRECIP: &str = "precip";
pub const PRECIP_UNITS: &str = "kg m-2 d-1";
pub const TIME: &str = "time";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// Gregorian rules extended before 1582, which is what chrono implements.
const CALENDAR: &str = "proleptic_gregorian";

/// A fresh dataset holding only `precip` and its three coordinates. Time is
/// encoded as whole days since `period_start`; no variable gets a fill value.
pub fn cube_to_dataset(cube: Cube, period_start: NaiveDate) -> Dataset {
    let (nt, ny, nx) = cube.precip.dim();
    let times: Array1<_> = cube
        .times
        .iter()
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .collect();

    let longitude = Variable::new(
        LONGITUDE,
        &[LONGITUDE],
        Values::F64(Array1::from(cube.longitude).into_dyn()),
    )
    .with_attr("standard_name", "longitude")
    .with_attr("long_name", "Longitude")
    .with_attr("units", "degrees_east")
    .with_attr("axis", "X");
    let latitude = Variable::new(
        LATITUDE,
        &[LATITUDE],
        Values::F64(Array1::from(cube.latitude).into_dyn()),
    )
    .with_attr("standard_name", "latitude")
    .with_attr("long_name", "Latitude")
    .with_attr("units", "degrees_north")
    .with_attr("axis", "Y");
    let time = Variable::new(TIME, &[TIME], Values::Time(times.into_dyn()))
        .with_attr("standard_name", "time")
        .with_attr("long_name", "Time")
        .with_encoding(Encoding {
            units: Some(TimeUnits::days_since(period_start)),
            calendar: Some(CALENDAR.to_string()),
            fill_value: None,
        });
    let precip = Variable::new(
        PRECIP,
        &[TIME, LATITUDE, LONGITUDE],
        Values::F32(cube.precip.into_dyn()),
    )
    .with_attr("units", PRECIP_UNITS);

    Dataset {
        dims: vec![
            (TIME.to_string(), nt),
            (LATITUDE.to_string(), ny),
            (LONGITUDE.to_string(), nx),
        ],
        variables: vec![time, latitude, longitude, precip],
        attributes: Vec::new(),
        source: None,
    }
}

/// Write to `<path>.part` and rename into place, so a failed write never
/// leaves a file at `path`.
pub fn write_archive(dataset: &Dataset, path: &Path) -> Result<(), CubeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CubeError::io(parent, e))?;
    }

    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = Path::new(&part);
    remove_if_exists(part)?;

    if let Err(e) = dataset.write(part) {
        let _ = fs::remove_file(part);
        return Err(e);
    }
    fs::rename(part, path).map_err(|e| CubeError::io(path, e))
}

fn remove_if_exists(path: &Path) -> Result<(), CubeError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CubeError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn tiny_cube() -> Cube {
        Cube {
            times: vec![
                NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(1990, 1, 3).unwrap(),
            ],
            latitude: vec![21.5],
            longitude: vec![-158.5, -157.5],
            precip: Array3::from_shape_vec((2, 1, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        }
    }

    #[test]
    fn dataset_layout() {
        let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let ds = cube_to_dataset(tiny_cube(), start);

        assert_eq!(ds.data_var_names(), vec![PRECIP.to_string()]);
        assert_eq!(ds.dim_len(TIME), Some(2));
        let precip = ds.variable(PRECIP).unwrap();
        assert_eq!(precip.dims, vec![TIME, LATITUDE, LONGITUDE]);
        assert_eq!(precip.values.shape(), &[2, 1, 2]);
        assert!(ds.variables.iter().all(|v| v.encoding.fill_value.is_none()));
        assert_eq!(
            ds.coordinate(TIME).unwrap().encoding.units.unwrap().to_string(),
            "days since 1990-01-01 00:00:00"
        );
    }

    #[test]
    fn write_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("1990_simple.nc");
        let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        write_archive(&cube_to_dataset(tiny_cube(), start), &path).unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("out").join("1990_simple.nc.part").exists());
    }
}
