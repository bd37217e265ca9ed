// ─────────────────────────────────────────────────────────────────────
// Single-band GeoTIFF reading
// ─────────────────────────────────────────────────────────────────────

// Only the georeferencing needed to rebuild pixel-centre coordinates is
// kept: the axis-aligned transform from `ModelPixelScale` + `ModelTiepoint`
// (or a non-rotated `ModelTransformation`), the raster anchoring from
// `GTRasterTypeGeoKey`, and the EPSG code so that a period's rasters can be
// checked against each other. Nothing of it survives into the archive.

use ndarray::Array2;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    tags::Tag,
    ColorType,
};

use crate::error::CubeError;

const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Axis-aligned affine transform. `(x_origin, y_origin)` is the outer corner
/// of pixel (0, 0); `y_step` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub x_origin: f64,
    pub x_step: f64,
    pub y_origin: f64,
    pub y_step: f64,
}

impl GeoTransform {
    /// What GDAL assumes for a TIFF without geotags.
    pub const IDENTITY: GeoTransform = GeoTransform {
        x_origin: 0.0,
        x_step: 1.0,
        y_origin: 0.0,
        y_step: 1.0,
    };

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0);
        close(self.x_origin, other.x_origin)
            && close(self.x_step, other.x_step)
            && close(self.y_origin, other.y_origin)
            && close(self.y_step, other.y_step)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    /// EPSG code from the GeoKey directory, projected before geographic.
    pub epsg: Option<u16>,
}

impl GridSpec {
    /// Pixel-centre x coordinates, one per column.
    pub fn x_coords(&self) -> Vec<f64> {
        let t = &self.transform;
        (0..self.cols)
            .map(|i| t.x_origin + (i as f64 + 0.5) * t.x_step)
            .collect()
    }

    /// Pixel-centre y coordinates, one per row.
    pub fn y_coords(&self) -> Vec<f64> {
        let t = &self.transform;
        (0..self.rows)
            .map(|j| t.y_origin + (j as f64 + 0.5) * t.y_step)
            .collect()
    }

    /// `None` when both grids line up, otherwise why they don't.
    pub fn mismatch(&self, other: &GridSpec) -> Option<String> {
        if self.epsg != other.epsg {
            return Some(format!(
                "crs EPSG:{} vs EPSG:{}",
                fmt_epsg(self.epsg),
                fmt_epsg(other.epsg)
            ));
        }
        if !self.transform.approx_eq(&other.transform) {
            return Some(format!(
                "transform {:?} vs {:?}",
                self.transform, other.transform
            ));
        }
        None
    }
}

fn fmt_epsg(code: Option<u16>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// One decoded time slice.
#[derive(Debug, Clone)]
pub struct Raster {
    pub path: PathBuf,
    pub grid: GridSpec,
    /// `rows × cols`, north-up as stored in the file.
    pub data: Array2<f32>,
}

pub fn read_raster(path: &Path) -> Result<Raster, CubeError> {
    let bad = |reason: String| CubeError::Raster {
        path: path.to_path_buf(),
        reason,
    };
    let tiff_err = |e: tiff::TiffError| bad(e.to_string());

    let file = File::open(path).map_err(|e| CubeError::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_err)?
        .with_limits(Limits::unlimited());

    match decoder.colortype().map_err(tiff_err)? {
        ColorType::Gray(_) => {}
        other => return Err(bad(format!("expected a single band, got {other:?}"))),
    }
    if decoder.more_images() {
        return Err(bad("expected a single image, file has several".to_string()));
    }

    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let (rows, cols) = (height as usize, width as usize);

    let scale = optional_f64_tag(&mut decoder, Tag::ModelPixelScaleTag).map_err(tiff_err)?;
    let tiepoint = optional_f64_tag(&mut decoder, Tag::ModelTiepointTag).map_err(tiff_err)?;
    let matrix = optional_f64_tag(&mut decoder, Tag::ModelTransformationTag).map_err(tiff_err)?;
    let geokeys = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .map_err(tiff_err)?
        .map(|v| v.into_u16_vec())
        .transpose()
        .map_err(tiff_err)?
        .unwrap_or_default();

    let keys = GeoKeys::parse(&geokeys);
    let transform = match (scale, tiepoint, matrix) {
        (Some(s), Some(t), _) => from_scale_tiepoint(&s, &t).map_err(bad)?,
        (_, _, Some(m)) => from_matrix(&m).map_err(bad)?,
        _ => GeoTransform::IDENTITY,
    };
    let transform = anchored(transform, keys.raster_type);

    let data: Vec<f32> = match decoder.read_image().map_err(tiff_err)? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return Err(bad("unsupported sample format".to_string())),
    };

    let data = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| bad(format!("pixel buffer does not fit {rows}×{cols}: {e}")))?;

    Ok(Raster {
        path: path.to_path_buf(),
        grid: GridSpec {
            rows,
            cols,
            transform,
            epsg: keys.projected.or(keys.geographic),
        },
        data,
    })
}

fn optional_f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> tiff::TiffResult<Option<Vec<f64>>> {
    decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()
}

/// Point-anchored tiepoints address pixel centres; move the origin to the
/// corner so every transform means the same thing.
fn anchored(mut t: GeoTransform, raster_type: Option<u16>) -> GeoTransform {
    if raster_type == Some(RASTER_PIXEL_IS_POINT) {
        t.x_origin -= 0.5 * t.x_step;
        t.y_origin -= 0.5 * t.y_step;
    }
    t
}

fn from_scale_tiepoint(scale: &[f64], tie: &[f64]) -> Result<GeoTransform, String> {
    if scale.len() < 2 || tie.len() < 6 {
        return Err(format!(
            "short georeferencing tags: {} scale / {} tiepoint values",
            scale.len(),
            tie.len()
        ));
    }
    // Tiepoint (I, J, K) → (X, Y, Z): raster point (I, J) sits at (X, Y).
    let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
    Ok(GeoTransform {
        x_origin: x - i * scale[0],
        x_step: scale[0],
        y_origin: y + j * scale[1],
        y_step: -scale[1],
    })
}

fn from_matrix(m: &[f64]) -> Result<GeoTransform, String> {
    if m.len() < 16 {
        return Err(format!("ModelTransformation has {} values, expected 16", m.len()));
    }
    if m[1] != 0.0 || m[4] != 0.0 {
        return Err("rotated rasters are not supported".to_string());
    }
    Ok(GeoTransform {
        x_origin: m[3],
        x_step: m[0],
        y_origin: m[7],
        y_step: m[5],
    })
}

/// The handful of GeoKeys we read. Entries are `[id, location, count, value]`
/// after a four-short header; only inline (location 0) values are used.
#[derive(Debug, Default, PartialEq)]
struct GeoKeys {
    raster_type: Option<u16>,
    geographic: Option<u16>,
    projected: Option<u16>,
}

impl GeoKeys {
    fn parse(dir: &[u16]) -> GeoKeys {
        let mut keys = GeoKeys::default();
        if dir.len() < 4 {
            return keys;
        }
        let n = dir[3] as usize;
        for entry in dir[4..].chunks_exact(4).take(n) {
            if entry[1] != 0 {
                continue;
            }
            match entry[0] {
                GT_RASTER_TYPE_KEY => keys.raster_type = Some(entry[3]),
                GEOGRAPHIC_TYPE_KEY => keys.geographic = Some(entry[3]),
                PROJECTED_CS_TYPE_KEY => keys.projected = Some(entry[3]),
                _ => {}
            }
        }
        keys
    }
}
