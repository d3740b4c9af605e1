//! Concatenation of per-lead-time files into one time series per variable

use crate::dataset::{CoordValues, Coordinate, DataVariable, Dataset};
use crate::errors::{Result, SmnError};
use crate::netcdf_io::{write_dataset, Encoding};
use crate::rename_clean::rename_and_clean;
use ndarray::{concatenate, ArrayViewD, Axis};
use std::path::{Path, PathBuf};

/// Coordinates removed from every processed file if still present
const LEFTOVER_COORDS: [&str; 5] = [
    "valid_time",
    "step",
    "forecast_reference_time",
    "meanSea",
    "surface",
];

/// Default output dimensions for surface variables
pub fn surface_dims() -> Vec<String> {
    vec!["time".into(), "lat".into(), "lon".into()]
}

/// Default output dimensions for pressure-level variables
pub fn pressure_dims() -> Vec<String> {
    vec!["time".into(), "lev".into(), "lat".into(), "lon".into()]
}

/// Variable name encoded in a per-lead-time file name (`10u_006.nc` -> `10u`)
pub fn variable_from_file_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SmnError::InvalidPath {
            path: path.to_path_buf(),
            message: "no file name".to_string(),
        })?;
    let stem = name.split('_').next().unwrap_or(name);
    Ok(stem.trim_end_matches(".nc").to_string())
}

/// Normalise, order and concatenate the files of one variable.
///
/// Writes `<dir of first file>/<prefix_out>_tmp_<var>.nc` with zlib level 5
/// and returns its path.
pub fn process_netcdf_files(
    files: &[PathBuf],
    prefix_out: &str,
    new_dims: &[String],
) -> Result<PathBuf> {
    let first = files
        .first()
        .ok_or_else(|| SmnError::Concat("no input files".to_string()))?;
    let time_dim = new_dims
        .first()
        .ok_or_else(|| SmnError::InvalidConfig("empty output dimension list".to_string()))?;

    let mut datasets = Vec::with_capacity(files.len());
    for file in files {
        let var_name = variable_from_file_name(file)?;
        let ds = rename_and_clean(file, &var_name, new_dims)?;
        tracing::debug!(file = %file.display(), variable = %var_name, dims = ?ds.dims(), "normalised");
        datasets.push(ds);
    }

    let mut combined = concat(datasets, time_dim)?;
    add_cf_attributes(&mut combined, new_dims);
    for extra in LEFTOVER_COORDS {
        combined.drop_var(extra);
    }

    let var_name_out = combined
        .first_data_var()
        .map(|v| v.name.clone())
        .ok_or_else(|| SmnError::Concat("no data variable after concatenation".to_string()))?;
    let out_dir = first.parent().unwrap_or_else(|| Path::new("."));
    let out_file = out_dir.join(format!("{}_tmp_{}.nc", prefix_out, var_name_out));

    write_dataset(&combined, &out_file, Encoding::zlib(5))?;
    tracing::info!(path = %out_file.display(), steps = combined.dim_len(time_dim).unwrap_or(0), "generated");
    Ok(out_file)
}

/// Concatenate single-variable datasets along `dim`, ordered by their first
/// value on that dimension. All other coordinates must agree.
pub fn concat(mut datasets: Vec<Dataset>, dim: &str) -> Result<Dataset> {
    if datasets.is_empty() {
        return Err(SmnError::Concat("nothing to concatenate".to_string()));
    }
    datasets.sort_by(|a, b| {
        let key = |ds: &Dataset| ds.coord(dim).map(|c| c.values.clone());
        match (key(a), key(b)) {
            (Some(CoordValues::Time(x)), Some(CoordValues::Time(y))) => x.first().cmp(&y.first()),
            (Some(CoordValues::Numeric(x)), Some(CoordValues::Numeric(y))) => x
                .first()
                .zip(y.first())
                .map_or(std::cmp::Ordering::Equal, |(p, q)| p.total_cmp(q)),
            _ => std::cmp::Ordering::Equal,
        }
    });

    let reference = &datasets[0];
    let ref_var = reference
        .first_data_var()
        .ok_or_else(|| SmnError::Concat("dataset without data variable".to_string()))?;
    let axis = ref_var.axis_of(dim).ok_or_else(|| {
        SmnError::Concat(format!("variable '{}' has no '{}' dimension", ref_var.name, dim))
    })?;

    for ds in &datasets[1..] {
        let var = ds
            .first_data_var()
            .ok_or_else(|| SmnError::Concat("dataset without data variable".to_string()))?;
        if var.name != ref_var.name || var.dims != ref_var.dims {
            return Err(SmnError::Concat(format!(
                "'{}' {:?} does not line up with '{}' {:?}",
                var.name, var.dims, ref_var.name, ref_var.dims
            )));
        }
        for coord in reference.coords.iter().filter(|c| c.name != dim && !c.is_scalar()) {
            let same = ds
                .coord(&coord.name)
                .map_or(false, |other| other.values.approx_eq(&coord.values));
            if !same {
                return Err(SmnError::Concat(format!(
                    "coordinate '{}' differs between inputs",
                    coord.name
                )));
            }
        }
    }

    let views: Vec<ArrayViewD<'_, f32>> = datasets
        .iter()
        .filter_map(|ds| ds.first_data_var().map(|v| v.data.view()))
        .collect();
    let data = concatenate(Axis(axis), &views)?;

    let mut out = Dataset::new();
    out.attrs = reference.attrs.clone();
    for coord in &reference.coords {
        if coord.name == dim {
            out.set_coord(Coordinate {
                values: join_values(&datasets, dim)?,
                ..coord.clone()
            });
        } else {
            out.set_coord(coord.clone());
        }
    }
    out.set_data_var(DataVariable {
        data,
        ..ref_var.clone()
    });
    Ok(out)
}

fn join_values(datasets: &[Dataset], dim: &str) -> Result<CoordValues> {
    let mut numeric = Vec::new();
    let mut times = Vec::new();
    for ds in datasets {
        match ds.coord(dim).map(|c| &c.values) {
            Some(CoordValues::Numeric(v)) => numeric.extend_from_slice(v),
            Some(CoordValues::Time(v)) => times.extend_from_slice(v),
            None => {
                return Err(SmnError::Concat(format!("input without '{}' coordinate", dim)));
            }
        }
    }
    match (numeric.is_empty(), times.is_empty()) {
        (true, _) => Ok(CoordValues::Time(times)),
        (false, true) => Ok(CoordValues::Numeric(numeric)),
        (false, false) => Err(SmnError::Concat(format!(
            "'{}' mixes time and numeric values",
            dim
        ))),
    }
}

/// Minimal CF metadata on the normalised dimensions
pub fn add_cf_attributes(dataset: &mut Dataset, dims: &[String]) {
    let has = |name: &str| dims.iter().any(|d| d == name);
    if let Some(time_dim) = dims.first() {
        if let Some(coord) = dataset.coord_mut(time_dim) {
            coord.attrs.set("standard_name", "time");
            coord.attrs.set("long_name", "time");
        }
    }
    let cf: [(&str, &str, &str); 3] = [
        ("lat", "latitude", "degrees_north"),
        ("lon", "longitude", "degrees_east"),
        ("lev", "air_pressure", "hPa"),
    ];
    for (name, standard_name, units) in cf {
        if !has(name) {
            continue;
        }
        if let Some(coord) = dataset.coord_mut(name) {
            coord.attrs.set("standard_name", standard_name);
            coord.attrs.set("units", units);
        }
    }
}
