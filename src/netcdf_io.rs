//! NetCDF reading and writing of [`Dataset`]s
//!
//! Time coordinates are decoded from CF units on read and encoded as
//! `hours since 1970-01-01 00:00:00` on write. Fill values become NaN in
//! memory and NaN `_FillValue`s on disk.

use crate::dataset::{AttrValue, Attributes, CoordValues, Coordinate, DataVariable, Dataset};
use crate::errors::{Result, SmnError};
use crate::timing::{decode_times, encode_times, TIME_CALENDAR, TIME_UNITS};
use ndarray::{ArrayD, IxDyn};
use netcdf::{create, AttributeValue};
use std::{fs, path::Path};

/// Per-variable storage options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encoding {
    /// zlib deflate level for data variables, `None` for no compression
    pub zlib_level: Option<i32>,
}

impl Encoding {
    pub fn uncompressed() -> Self {
        Self { zlib_level: None }
    }

    pub fn zlib(level: i32) -> Self {
        Self {
            zlib_level: Some(level.clamp(1, 9)),
        }
    }
}

/// Read every variable of a NetCDF file.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = netcdf::open(path)?;

    let dim_names: Vec<String> = file.dimensions().map(|d| d.name()).collect();

    // Names referenced from `coordinates` attributes are coordinates too
    let mut aux_coords: Vec<String> = Vec::new();
    for var in file.variables() {
        if let Some(AttributeValue::Str(list)) = var
            .attribute("coordinates")
            .and_then(|a| a.value().ok())
        {
            aux_coords.extend(list.split_whitespace().map(str::to_string));
        }
    }

    let mut dataset = Dataset::new();
    for var in file.variables() {
        let name = var.name();
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let mut attrs = read_attributes(var.attributes());

        let is_coord = (dims.len() == 1 && dims[0] == name && dim_names.contains(&name))
            || aux_coords.contains(&name)
            || dims.is_empty();

        if is_coord {
            let raw = var.get_values::<f64, _>(..)?;
            let raw = apply_fill_f64(raw, &mut attrs);
            let values = match attrs.get_str("units") {
                Some(units) if units.contains(" since ") => {
                    let decoded = decode_times(&raw, units)?;
                    attrs.remove("units");
                    attrs.remove("calendar");
                    CoordValues::Time(decoded)
                }
                _ => CoordValues::Numeric(raw),
            };
            dataset.set_coord(Coordinate {
                name,
                dims,
                values,
                attrs,
            });
        } else {
            let raw = var.get_values::<f32, _>(..)?;
            let raw = apply_fill_f32(raw, &mut attrs);
            let data = ArrayD::from_shape_vec(IxDyn(&shape), raw)?;
            dataset.set_data_var(DataVariable {
                name,
                dims,
                data,
                attrs,
            });
        }
    }

    dataset.attrs = read_attributes(file.attributes());
    tracing::debug!(
        path = %path.display(),
        coords = dataset.coords.len(),
        data_vars = dataset.data_vars.len(),
        "read NetCDF dataset"
    );
    Ok(dataset)
}

/// Write a dataset to `path`, replacing any existing file.
pub fn write_dataset(dataset: &Dataset, path: &Path, encoding: Encoding) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = create(path)?;

    for (dim_name, dim_len) in dataset.dims() {
        file.add_dimension(&dim_name, dim_len)?;
    }

    for coord in &dataset.coords {
        let dim_refs: Vec<&str> = coord.dims.iter().map(|s| s.as_str()).collect();
        let mut var = file.add_variable::<f64>(&coord.name, &dim_refs)?;
        let values = match &coord.values {
            CoordValues::Numeric(v) => v.clone(),
            CoordValues::Time(t) => {
                var.put_attribute("units", TIME_UNITS)?;
                var.put_attribute("calendar", TIME_CALENDAR)?;
                encode_times(t)
            }
        };
        for (name, value) in coord.attrs.iter() {
            put_variable_attribute(&mut var, name, value)?;
        }
        var.put_values(&values, ..)?;
    }

    for data_var in &dataset.data_vars {
        let dim_refs: Vec<&str> = data_var.dims.iter().map(|s| s.as_str()).collect();
        let mut var = file.add_variable::<f32>(&data_var.name, &dim_refs)?;
        var.set_fill_value(f32::NAN)?;
        if let Some(level) = encoding.zlib_level {
            var.set_compression(level, true)?;
        }
        for (name, value) in data_var.attrs.iter().filter(|(n, _)| *n != "_FillValue") {
            put_variable_attribute(&mut var, name, value)?;
        }
        let values: Vec<f32> = data_var.data.iter().copied().collect();
        var.put_values(&values, ..)?;
    }

    for (name, value) in dataset.attrs.iter() {
        file.add_attribute(name, to_netcdf_value(value))?;
    }

    tracing::debug!(path = %path.display(), compressed = encoding.zlib_level.is_some(), "wrote NetCDF dataset");
    Ok(())
}

fn put_variable_attribute(
    var: &mut netcdf::VariableMut<'_>,
    name: &str,
    value: &AttrValue,
) -> Result<()> {
    var.put_attribute(name, to_netcdf_value(value))?;
    Ok(())
}

fn to_netcdf_value(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Str(v) => AttributeValue::Str(v.clone()),
        AttrValue::Strs(v) => AttributeValue::Strs(v.clone()),
        AttrValue::Short(v) => AttributeValue::Short(*v),
        AttrValue::Int(v) => AttributeValue::Int(*v),
        AttrValue::Ints(v) => AttributeValue::Ints(v.clone()),
        AttrValue::Float(v) => AttributeValue::Float(*v),
        AttrValue::Floats(v) => AttributeValue::Floats(v.clone()),
        AttrValue::Double(v) => AttributeValue::Double(*v),
        AttrValue::Doubles(v) => AttributeValue::Doubles(v.clone()),
    }
}

fn read_attributes<'a>(attributes: impl Iterator<Item = netcdf::Attribute<'a>>) -> Attributes {
    let mut attrs = Attributes::new();
    for attr in attributes {
        let value = match attr.value() {
            Ok(AttributeValue::Str(v)) => AttrValue::Str(v),
            Ok(AttributeValue::Strs(v)) => AttrValue::Strs(v),
            Ok(AttributeValue::Short(v)) => AttrValue::Short(v),
            Ok(AttributeValue::Int(v)) => AttrValue::Int(v),
            Ok(AttributeValue::Ints(v)) => AttrValue::Ints(v),
            Ok(AttributeValue::Longlong(v)) => AttrValue::Double(v as f64),
            Ok(AttributeValue::Float(v)) => AttrValue::Float(v),
            Ok(AttributeValue::Floats(v)) => AttrValue::Floats(v),
            Ok(AttributeValue::Double(v)) => AttrValue::Double(v),
            Ok(AttributeValue::Doubles(v)) => AttrValue::Doubles(v),
            Ok(_) => {
                tracing::warn!(attribute = attr.name(), "skipped unsupported attribute type");
                continue;
            }
            Err(e) => {
                tracing::warn!(attribute = attr.name(), error = %e, "could not read attribute");
                continue;
            }
        };
        attrs.set(attr.name(), value);
    }
    attrs
}

fn fill_values(attrs: &mut Attributes) -> Vec<f64> {
    ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| attrs.remove(name))
        .filter_map(|v| v.as_f64())
        .filter(|v| !v.is_nan())
        .collect()
}

fn apply_fill_f32(mut values: Vec<f32>, attrs: &mut Attributes) -> Vec<f32> {
    let fills = fill_values(attrs);
    if !fills.is_empty() {
        for v in values.iter_mut() {
            if fills.iter().any(|f| (f64::from(*v) - f).abs() <= f.abs() * 1e-7) {
                *v = f32::NAN;
            }
        }
    }
    values
}

fn apply_fill_f64(mut values: Vec<f64>, attrs: &mut Attributes) -> Vec<f64> {
    let fills = fill_values(attrs);
    if !fills.is_empty() {
        for v in values.iter_mut() {
            if fills.iter().any(|f| *v == *f) {
                *v = f64::NAN;
            }
        }
    }
    values
}

/// Error for a variable missing from a file
pub fn missing_variable(var: &str, path: &Path) -> SmnError {
    SmnError::VariableNotFound {
        var: var.to_string(),
        context: path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_keeps_structure() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t2m_006.nc");

        let valid = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let mut ds = Dataset::new();
        ds.set_coord(Coordinate::dimension("time", CoordValues::Time(vec![valid])));
        ds.set_coord(
            Coordinate::dimension("latitude", CoordValues::Numeric(vec![-6.0, -5.0]))
                .with_attr("units", "degrees_north"),
        );
        ds.set_coord(Coordinate::dimension(
            "longitude",
            CoordValues::Numeric(vec![280.0, 281.0, 282.0]),
        ));
        ds.set_coord(Coordinate::scalar("heightAboveGround", CoordValues::Numeric(vec![2.0])));
        let data = ArrayD::from_shape_vec(
            IxDyn(&[1, 2, 3]),
            vec![280.0, f32::NAN, 282.0, 283.0, 284.0, 285.0],
        )?;
        let mut var = DataVariable::new(
            "t2m",
            vec!["time".into(), "latitude".into(), "longitude".into()],
            data,
        )?;
        var.attrs.set("units", "K");
        var.attrs.set("coordinates", "heightAboveGround");
        ds.set_data_var(var);
        ds.attrs.set("GRIB_edition", 2);

        write_dataset(&ds, &path, Encoding::zlib(5))?;
        let back = read_dataset(&path)?;

        assert_eq!(back.coord("time").unwrap().values, CoordValues::Time(vec![valid]));
        assert!(back.coord("heightAboveGround").unwrap().is_scalar());
        assert_eq!(
            back.coord("latitude").unwrap().attrs.get_str("units"),
            Some("degrees_north")
        );
        let t2m = back.data_var("t2m").unwrap();
        assert_eq!(t2m.data.shape(), &[1, 2, 3]);
        assert!(t2m.data[[0, 0, 1]].is_nan());
        assert_eq!(t2m.data[[0, 1, 2]], 285.0);
        assert_eq!(t2m.attrs.get_str("units"), Some("K"));
        assert!(!t2m.attrs.contains("_FillValue"));
        assert_eq!(back.attrs.get("GRIB_edition"), Some(&AttrValue::Int(2)));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_dataset(&dir.path().join("absent.nc")).is_err());
    }
}
