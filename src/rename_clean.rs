//! Uniform renaming and cleanup of single-variable NetCDF files
//!
//! Extracted files carry whatever dimension names and auxiliary coordinates
//! the GRIB layout produced (`latitude`, `isobaricInhPa`, `step`,
//! `valid_time`, ...). [`rename_and_clean`] maps them positionally onto a
//! fixed set of output dimensions and drops everything else.

use crate::dataset::Dataset;
use crate::errors::{Result, SmnError};
use crate::netcdf_io::{missing_variable, read_dataset};
use std::path::Path;

/// Open `input` and normalise its first data variable.
pub fn rename_and_clean(input: &Path, var_name_out: &str, dims_out: &[String]) -> Result<Dataset> {
    let dataset = read_dataset(input)?;
    if dataset.first_data_var().is_none() {
        return Err(missing_variable("<first data variable>", input));
    }
    normalize(&dataset, var_name_out, dims_out)
}

/// Rename the first data variable of `dataset` and its dimensions.
///
/// A `time` coordinate that is not yet a dimension of the variable becomes a
/// leading axis. Only coordinates named in `dims_out` survive, and
/// `coordinates` attributes are trimmed to match.
pub fn normalize(dataset: &Dataset, var_name_out: &str, dims_out: &[String]) -> Result<Dataset> {
    let mut var = dataset
        .first_data_var()
        .cloned()
        .ok_or_else(|| SmnError::VariableNotFound {
            var: "<first data variable>".to_string(),
            context: "dataset".to_string(),
        })?;

    let time = dataset.coord("time");
    if time.is_some() && var.axis_of("time").is_none() {
        var.expand_leading("time");
    }

    if var.dims.len() != dims_out.len() {
        return Err(SmnError::DimensionMismatch {
            input: var.dims.clone(),
            output: dims_out.to_vec(),
        });
    }
    let renames: Vec<(String, String)> = var
        .dims
        .iter()
        .cloned()
        .zip(dims_out.iter().cloned())
        .collect();

    let mut out = Dataset::new();
    for (old, new) in &renames {
        let Some(coord) = dataset.coord(old) else {
            continue;
        };
        let mut coord = coord.clone();
        if coord.values.len() != var.data.shape()[var.axis_of(old).unwrap_or(0)] {
            return Err(SmnError::DimensionMismatch {
                input: vec![format!("{}[{}]", old, coord.values.len())],
                output: vec![new.clone()],
            });
        }
        coord.name = new.clone();
        coord.dims = vec![new.clone()];
        out.set_coord(coord);
    }

    var.name = var_name_out.to_string();
    var.dims = dims_out.to_vec();
    let kept = var.attrs.get_str("coordinates").map(|list| {
        list.split_whitespace()
            .filter(|c| dims_out.iter().any(|d| d == c))
            .collect::<Vec<_>>()
            .join(" ")
    });
    match kept {
        Some(kept) if kept.is_empty() => {
            var.attrs.remove("coordinates");
        }
        Some(kept) => var.attrs.set("coordinates", kept),
        None => {}
    }
    out.set_data_var(var);
    out.attrs.remove("coordinates");

    tracing::debug!(
        variable = var_name_out,
        renames = ?renames,
        "renamed and cleaned dataset"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CoordValues, Coordinate, DataVariable};
    use chrono::NaiveDate;
    use ndarray::{ArrayD, IxDyn};

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn extracted(with_time_dim: bool) -> Dataset {
        let valid = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let mut ds = Dataset::new();
        let shape: Vec<usize> = if with_time_dim { vec![1, 2, 2] } else { vec![2, 2] };
        let var_dims = if with_time_dim {
            dims(&["time", "latitude", "longitude"])
        } else {
            dims(&["latitude", "longitude"])
        };
        let time = if with_time_dim {
            Coordinate::dimension("time", CoordValues::Time(vec![valid]))
        } else {
            Coordinate::scalar("time", CoordValues::Time(vec![valid]))
        };
        ds.set_coord(time.with_attr("standard_name", "time"));
        ds.set_coord(Coordinate::dimension("latitude", CoordValues::Numeric(vec![-6.0, -5.0])));
        ds.set_coord(Coordinate::dimension("longitude", CoordValues::Numeric(vec![280.0, 281.0])));
        ds.set_coord(Coordinate::scalar("step", CoordValues::Numeric(vec![6.0])));
        ds.set_coord(Coordinate::scalar("valid_time", CoordValues::Time(vec![valid])));
        let data = ArrayD::from_shape_vec(IxDyn(&shape), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut var = DataVariable::new("u10", var_dims, data).unwrap();
        var.attrs.set("coordinates", "step time valid_time");
        var.attrs.set("units", "m s**-1");
        ds.set_data_var(var);
        ds.attrs.set("coordinates", "step");
        ds.attrs.set("GRIB_edition", 2);
        ds
    }

    #[test]
    fn renames_dims_and_drops_extra_coords() {
        let out = normalize(&extracted(true), "10u", &dims(&["time", "lat", "lon"])).unwrap();
        let var = out.data_var("10u").unwrap();
        assert_eq!(var.dims, dims(&["time", "lat", "lon"]));
        assert_eq!(var.attrs.get_str("coordinates"), Some("time"));
        assert_eq!(var.attrs.get_str("units"), Some("m s**-1"));

        let names: Vec<_> = out.coords.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["time", "lat", "lon"]);
        assert_eq!(out.coord("time").unwrap().attrs.get_str("standard_name"), Some("time"));
        assert!(out.attrs.is_empty());
    }

    #[test]
    fn scalar_time_becomes_leading_axis() {
        let out = normalize(&extracted(false), "10u", &dims(&["time", "lat", "lon"])).unwrap();
        let var = out.data_var("10u").unwrap();
        assert_eq!(var.data.shape(), &[1, 2, 2]);
        let time = out.coord("time").unwrap();
        assert_eq!(time.dims, dims(&["time"]));
    }

    #[test]
    fn dimension_count_must_match() {
        let err = normalize(&extracted(true), "u", &dims(&["time", "lev", "lat", "lon"])).unwrap_err();
        match err {
            SmnError::DimensionMismatch { input, output } => {
                assert_eq!(input, dims(&["time", "latitude", "longitude"]));
                assert_eq!(output.len(), 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn coordinates_attribute_removed_when_nothing_left() {
        let mut ds = extracted(true);
        if let Some(var) = ds.data_vars.first_mut() {
            var.attrs.set("coordinates", "step valid_time");
        }
        let out = normalize(&ds, "10u", &dims(&["time", "lat", "lon"])).unwrap();
        assert!(!out.data_var("10u").unwrap().attrs.contains("coordinates"));
    }
}
