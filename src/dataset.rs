// ─────────────────────────────────────────────────────────────────────
// In-memory mirror of a NetCDF file
// ─────────────────────────────────────────────────────────────────────

// A [`Dataset`] keeps dimensions, variables and attributes in file order.
// Variable data lives in typed n-dimensional arrays; time variables with CF
// units on a standard calendar are decoded to date-times on open and
// re-encoded on write, so archives with different reference dates can be
// compared and concatenated directly.
//
// The *encoding* of a variable (time units, calendar, fill value) is kept
// apart from its attributes in [`Encoding`]. Nothing is written for a field
// the encoding leaves empty.

use chrono::NaiveDateTime;
use ndarray::{ArrayD, Axis, IxDyn};
use netcdf::{
    types::{FloatType, IntType, NcVariableType},
    AttributeValue,
};
use std::{
    cmp::Ordering,
    io,
    path::{Path, PathBuf},
};

use crate::{
    cftime::{is_standard_calendar, Encoded, TimeUnits},
    error::CubeError,
};

/// Typed variable data.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    I64(ArrayD<i64>),
    U64(ArrayD<u64>),
    Time(ArrayD<NaiveDateTime>),
}

macro_rules! concat_as {
    ($variant:ident, $axis:expr, $parts:expr) => {{
        let views = $parts
            .iter()
            .map(|p| match p {
                Values::$variant(a) => Ok(a.view()),
                other => Err(CubeError::merge(format!(
                    "cannot concatenate {} with {}",
                    stringify!($variant),
                    other.dtype()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Values::$variant(
            ndarray::concatenate(Axis($axis), &views)
                .map_err(|e| CubeError::merge(format!("concatenation failed: {e}")))?,
        )
    }};
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::F32(a) => a.shape(),
            Values::F64(a) => a.shape(),
            Values::I8(a) => a.shape(),
            Values::U8(a) => a.shape(),
            Values::I16(a) => a.shape(),
            Values::U16(a) => a.shape(),
            Values::I32(a) => a.shape(),
            Values::U32(a) => a.shape(),
            Values::I64(a) => a.shape(),
            Values::U64(a) => a.shape(),
            Values::Time(a) => a.shape(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Values::F32(_) => "f32",
            Values::F64(_) => "f64",
            Values::I8(_) => "i8",
            Values::U8(_) => "u8",
            Values::I16(_) => "i16",
            Values::U16(_) => "u16",
            Values::I32(_) => "i32",
            Values::U32(_) => "u32",
            Values::I64(_) => "i64",
            Values::U64(_) => "u64",
            Values::Time(_) => "datetime",
        }
    }

    /// Join `parts` along `axis`. All parts must hold the same type.
    pub fn concatenate(axis: usize, parts: &[&Values]) -> Result<Values, CubeError> {
        let first = parts
            .first()
            .ok_or_else(|| CubeError::merge("nothing to concatenate"))?;
        Ok(match first {
            Values::F32(_) => concat_as!(F32, axis, parts),
            Values::F64(_) => concat_as!(F64, axis, parts),
            Values::I8(_) => concat_as!(I8, axis, parts),
            Values::U8(_) => concat_as!(U8, axis, parts),
            Values::I16(_) => concat_as!(I16, axis, parts),
            Values::U16(_) => concat_as!(U16, axis, parts),
            Values::I32(_) => concat_as!(I32, axis, parts),
            Values::U32(_) => concat_as!(U32, axis, parts),
            Values::I64(_) => concat_as!(I64, axis, parts),
            Values::U64(_) => concat_as!(U64, axis, parts),
            Values::Time(_) => concat_as!(Time, axis, parts),
        })
    }

    /// Elements as ordering keys (times as milliseconds since 1970), in
    /// logical order.
    pub fn keys(&self) -> Vec<f64> {
        match self {
            Values::F32(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::F64(a) => a.iter().copied().collect(),
            Values::I8(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::U8(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::I16(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::U16(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::I32(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::U32(a) => a.iter().map(|&v| f64::from(v)).collect(),
            Values::I64(a) => a.iter().map(|&v| v as f64).collect(),
            Values::U64(a) => a.iter().map(|&v| v as f64).collect(),
            Values::Time(a) => a
                .iter()
                .map(|t| t.and_utc().timestamp_millis() as f64)
                .collect(),
        }
    }

    /// `Less` for strictly increasing, `Greater` for strictly decreasing,
    /// `Equal` for fewer than two elements, `None` otherwise.
    pub fn monotonic(&self) -> Option<Ordering> {
        let keys = self.keys();
        if keys.len() < 2 {
            return Some(Ordering::Equal);
        }
        let dir = keys[0].partial_cmp(&keys[1])?;
        if dir == Ordering::Equal {
            return None;
        }
        keys.windows(2)
            .all(|w| w[0].partial_cmp(&w[1]) == Some(dir))
            .then_some(dir)
    }
}

/// Per-variable serialization settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoding {
    /// Required for [`Values::Time`].
    pub units: Option<TimeUnits>,
    pub calendar: Option<String>,
    pub fill_value: Option<AttributeValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub values: Values,
    pub attributes: Vec<(String, AttributeValue)>,
    pub encoding: Encoding,
}

impl Variable {
    pub fn new(name: &str, dims: &[&str], values: Values) -> Self {
        Variable {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            values,
            attributes: Vec::new(),
            encoding: Encoding::default(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// One-dimensional and named after its dimension.
    pub fn is_coordinate(&self) -> bool {
        self.dims.len() == 1 && self.dims[0] == self.name
    }

    /// Same dimensions and data; attributes are not compared.
    pub fn same_data(&self, other: &Variable) -> bool {
        self.dims == other.dims && self.values == other.values
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dims: Vec<(String, usize)>,
    pub variables: Vec<Variable>,
    pub attributes: Vec<(String, AttributeValue)>,
    /// File the dataset was opened from, for error messages.
    pub source: Option<PathBuf>,
}

impl Dataset {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn coordinate(&self, dim: &str) -> Option<&Variable> {
        self.variable(dim).filter(|v| v.is_coordinate())
    }

    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dims.iter().find(|(n, _)| n == name).map(|(_, l)| *l)
    }

    /// Names of the non-coordinate variables, sorted.
    pub fn data_var_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .variables
            .iter()
            .filter(|v| !v.is_coordinate())
            .map(|v| v.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn describe(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| "<in-memory dataset>".to_string(), |p| p.display().to_string())
    }

    pub fn open(path: &Path) -> Result<Dataset, CubeError> {
        if !path.exists() {
            return Err(CubeError::io(path, io::Error::from(io::ErrorKind::NotFound)));
        }
        let file = netcdf::open(path)?;

        let dims = file
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();
        let mut attributes = Vec::new();
        for a in file.attributes() {
            attributes.push((a.name().to_string(), a.value()?));
        }
        let variables = file
            .variables()
            .map(|v| read_variable(&v))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dataset {
            dims,
            variables,
            attributes,
            source: Some(path.to_path_buf()),
        })
    }

    /// Create (or truncate) `path` and write everything.
    pub fn write(&self, path: &Path) -> Result<(), CubeError> {
        let mut file = netcdf::create(path)?;
        for (name, len) in &self.dims {
            file.add_dimension(name, *len)?;
        }
        for (name, value) in &self.attributes {
            file.add_attribute(name, value.clone())?;
        }
        for var in &self.variables {
            write_variable(&mut file, var)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// NetCDF → Variable
// ─────────────────────────────────────────────────────────────────────

macro_rules! read_as {
    ($var:expr, $shape:expr, $t:ty, $variant:ident) => {{
        let data = $var.get_values::<$t, _>(..)?;
        Values::$variant(ArrayD::from_shape_vec(IxDyn($shape), data).map_err(|e| {
            CubeError::Netcdf {
                reason: format!("variable '{}' does not fit its dimensions: {e}", $var.name()),
            }
        })?)
    }};
}

fn read_variable(var: &netcdf::Variable) -> Result<Variable, CubeError> {
    let name = var.name().to_string();
    let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

    let mut attributes = Vec::new();
    for a in var.attributes() {
        attributes.push((a.name().to_string(), a.value()?));
    }

    let values = match var.vartype() {
        NcVariableType::Float(FloatType::F32) => read_as!(var, &shape, f32, F32),
        NcVariableType::Float(FloatType::F64) => read_as!(var, &shape, f64, F64),
        NcVariableType::Int(IntType::I8) => read_as!(var, &shape, i8, I8),
        NcVariableType::Int(IntType::U8) => read_as!(var, &shape, u8, U8),
        NcVariableType::Int(IntType::I16) => read_as!(var, &shape, i16, I16),
        NcVariableType::Int(IntType::U16) => read_as!(var, &shape, u16, U16),
        NcVariableType::Int(IntType::I32) => read_as!(var, &shape, i32, I32),
        NcVariableType::Int(IntType::U32) => read_as!(var, &shape, u32, U32),
        NcVariableType::Int(IntType::I64) => read_as!(var, &shape, i64, I64),
        NcVariableType::Int(IntType::U64) => read_as!(var, &shape, u64, U64),
        other => {
            return Err(CubeError::UnsupportedType {
                name,
                vartype: format!("{other:?}"),
            })
        }
    };

    let mut variable = Variable {
        name,
        dims,
        values,
        attributes,
        encoding: Encoding::default(),
    };
    variable.encoding.fill_value = take_attr(&mut variable.attributes, "_FillValue");
    decode_time(&mut variable)?;
    Ok(variable)
}

fn take_attr(attrs: &mut Vec<(String, AttributeValue)>, name: &str) -> Option<AttributeValue> {
    let idx = attrs.iter().position(|(n, _)| n == name)?;
    Some(attrs.remove(idx).1)
}

fn str_attr(attrs: &[(String, AttributeValue)], name: &str) -> Option<String> {
    attrs.iter().find(|(n, _)| n == name).and_then(|(_, v)| match v {
        AttributeValue::Str(s) => Some(s.clone()),
        _ => None,
    })
}

/// Turn numeric offsets with `<unit> since <date>` units into date-times.
/// Variables that don't look like CF time are left alone.
fn decode_time(var: &mut Variable) -> Result<(), CubeError> {
    let Some(units) = str_attr(&var.attributes, "units") else {
        return Ok(());
    };
    if !units.to_ascii_lowercase().contains(" since ") {
        return Ok(());
    }
    let calendar = str_attr(&var.attributes, "calendar");
    if !is_standard_calendar(calendar.as_deref()) {
        return Ok(());
    }
    let parsed: TimeUnits = units.parse()?;

    let shape = var.values.shape().to_vec();
    let times = var
        .values
        .keys()
        .into_iter()
        .map(|v| parsed.decode(v))
        .collect::<Result<Vec<_>, _>>()?;
    var.values = Values::Time(
        ArrayD::from_shape_vec(IxDyn(&shape), times)
            .map_err(|e| CubeError::InvalidTime { reason: e.to_string() })?,
    );

    take_attr(&mut var.attributes, "units");
    take_attr(&mut var.attributes, "calendar");
    var.encoding.units = Some(parsed);
    var.encoding.calendar = calendar;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// Variable → NetCDF
// ─────────────────────────────────────────────────────────────────────

macro_rules! write_as {
    ($file:expr, $var:expr, $dims:expr, $t:ty, $data:expr, $extra:expr, $fill:expr) => {{
        let mut v = $file.add_variable::<$t>(&$var.name, $dims)?;
        for (name, value) in $extra.iter().chain($var.attributes.iter()) {
            v.put_attribute(name, value.clone())?;
        }
        if let Some(fill) = $fill {
            v.put_attribute("_FillValue", fill)?;
        }
        let flat: Vec<$t> = $data.iter().copied().collect();
        v.put_values(&flat, ..)?;
    }};
}

fn write_variable(file: &mut netcdf::FileMut, var: &Variable) -> Result<(), CubeError> {
    let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
    let none: Vec<(String, AttributeValue)> = Vec::new();
    let fill = var.encoding.fill_value.clone();

    match &var.values {
        Values::F32(a) => write_as!(file, var, &dims, f32, a, none, fill),
        Values::F64(a) => write_as!(file, var, &dims, f64, a, none, fill),
        Values::I8(a) => write_as!(file, var, &dims, i8, a, none, fill),
        Values::U8(a) => write_as!(file, var, &dims, u8, a, none, fill),
        Values::I16(a) => write_as!(file, var, &dims, i16, a, none, fill),
        Values::U16(a) => write_as!(file, var, &dims, u16, a, none, fill),
        Values::I32(a) => write_as!(file, var, &dims, i32, a, none, fill),
        Values::U32(a) => write_as!(file, var, &dims, u32, a, none, fill),
        Values::I64(a) => write_as!(file, var, &dims, i64, a, none, fill),
        Values::U64(a) => write_as!(file, var, &dims, u64, a, none, fill),
        Values::Time(a) => {
            let units = var.encoding.units.ok_or_else(|| CubeError::InvalidTime {
                reason: format!("time variable '{}' has no units to encode with", var.name),
            })?;
            let mut extra = vec![(
                "units".to_string(),
                AttributeValue::Str(units.to_string()),
            )];
            if let Some(cal) = &var.encoding.calendar {
                extra.push(("calendar".to_string(), AttributeValue::Str(cal.clone())));
            }
            let times: Vec<NaiveDateTime> = a.iter().copied().collect();
            let fill = fill.as_ref().and_then(numeric_attr);
            match units.encode(&times) {
                Encoded::Int(offsets) => {
                    let fill = fill.map(|f| AttributeValue::Longlong(f as i64));
                    write_as!(file, var, &dims, i64, offsets, extra, fill)
                }
                Encoded::Float(offsets) => {
                    let fill = fill.map(AttributeValue::Double);
                    write_as!(file, var, &dims, f64, offsets, extra, fill)
                }
            }
        }
    }
    Ok(())
}

/// Scalar numeric attribute as `f64`.
fn numeric_attr(value: &AttributeValue) -> Option<f64> {
    match *value {
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        _ => None,
    }
}
