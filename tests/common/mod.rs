#![allow(dead_code)]

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tiff::{
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

/// Write a georeferenced `Gray32Float` GeoTIFF (EPSG:4326, 0.25° pixels,
/// upper-left corner at 160°W 22°N).
pub fn write_tif(path: &Path, rows: u32, cols: u32, data: &[f32]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(path).unwrap();
    let mut tiff = TiffEncoder::new(&mut file).unwrap();
    let mut image = tiff.new_image::<colortype::Gray32Float>(cols, rows).unwrap();
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[0.25f64, 0.25, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, -160.0, 22.0, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(
            Tag::GeoKeyDirectoryTag,
            &[1u16, 1, 0, 2, 1025, 0, 1, 1, 2048, 0, 1, 4326][..],
        )
        .unwrap();
    image.write_data(data).unwrap();
}

/// `<root>/<year>/<month>/rain_<year>_<month>_<day>.tif`, filled with `value`.
pub fn daily(root: &Path, year: i32, month: u32, day: u32, value: f32) -> PathBuf {
    let path = root
        .join(year.to_string())
        .join(format!("{month:02}"))
        .join(format!("rain_{year}_{month:02}_{day:02}.tif"));
    write_tif(&path, 2, 2, &[value; 4]);
    path
}
