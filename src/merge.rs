//! Merge of processed variable files into one consolidated run file

use crate::dataset::{CoordValues, Coordinate, DataVariable, Dataset};
use crate::errors::{Result, SmnError};
use crate::netcdf_io::{read_dataset, write_dataset, Encoding};
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};

pub const DEFAULT_INSTITUTION: &str = "SENAMHI";
const HISTORY: &str = "Generado con SMN_tools";
const REFERENCES: &str = "https://www.senamhi.gob.pe/";

/// Global metadata written on merged files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMetadata {
    pub institution: String,
    /// Defaults to a token of the output file name, see [`source_from_output`]
    pub source: Option<String>,
}

impl Default for MergeMetadata {
    fn default() -> Self {
        Self {
            institution: DEFAULT_INSTITUTION.to_string(),
            source: None,
        }
    }
}

/// Source label deduced from the output name: the second `_`-separated
/// token (`PERU_WRF22_2025010106_sfc.nc` -> `WRF22`), or the file stem
/// when there is none.
pub fn source_from_output(output: &Path) -> String {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match name.split('_').nth(1) {
        Some(token) => token.trim_end_matches(".nc").to_string(),
        None => output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Merge every variable of `files` into `output`, compressed with zlib 5.
pub fn merge_files(files: &[PathBuf], output: &Path, metadata: &MergeMetadata) -> Result<PathBuf> {
    if files.is_empty() {
        return Err(SmnError::Merge("no input files".to_string()));
    }
    let datasets = files
        .iter()
        .map(|f| read_dataset(f))
        .collect::<Result<Vec<_>>>()?;

    let mut combined = merge(&datasets)?;
    let source = metadata
        .source
        .clone()
        .unwrap_or_else(|| source_from_output(output));
    combined.attrs.set("institution", metadata.institution.as_str());
    combined.attrs.set("source", source);
    combined.attrs.set("history", HISTORY);
    combined.attrs.set("references", REFERENCES);
    combined.attrs.set("Conventions", "CF-1.8");

    write_dataset(&combined, output, Encoding::zlib(5))?;
    tracing::info!(
        path = %output.display(),
        variables = combined.data_vars.len(),
        "merged file generated"
    );
    Ok(output.to_path_buf())
}

/// Outer-join merge: dimension coordinates become the union of all inputs
/// and every variable is reindexed onto them with NaN where it has no data.
/// When names collide the first dataset wins.
pub fn merge(datasets: &[Dataset]) -> Result<Dataset> {
    let mut out = Dataset::new();
    if let Some(first) = datasets.first() {
        out.attrs = first.attrs.clone();
    }

    // union of dimension coordinates, first occurrence keeps its attributes
    for ds in datasets {
        for coord in &ds.coords {
            match out.coord(&coord.name) {
                None => out.set_coord(coord.clone()),
                Some(existing) if existing.is_scalar() || coord.is_scalar() => {}
                Some(existing) => {
                    let values = union(&existing.values, &coord.values).ok_or_else(|| {
                        SmnError::Merge(format!(
                            "coordinate '{}' mixes time and numeric values",
                            coord.name
                        ))
                    })?;
                    let widened = Coordinate {
                        values,
                        ..existing.clone()
                    };
                    out.set_coord(widened);
                }
            }
        }
    }

    for ds in datasets {
        for var in &ds.data_vars {
            if out.data_var(&var.name).is_some() {
                tracing::debug!(variable = %var.name, "duplicate variable, keeping the first");
                continue;
            }
            let reindexed = reindex(var, ds, &out)?;
            out.set_data_var(reindexed);
        }
    }
    Ok(out)
}

/// Union of two coordinate value lists; identical inputs keep their order,
/// otherwise the result is sorted ascending.
fn union(a: &CoordValues, b: &CoordValues) -> Option<CoordValues> {
    if a.approx_eq(b) {
        return Some(a.clone());
    }
    match (a, b) {
        (CoordValues::Numeric(x), CoordValues::Numeric(y)) => {
            let mut all: Vec<f64> = x.iter().chain(y).copied().collect();
            all.sort_by(f64::total_cmp);
            all.dedup_by(|p, q| (*p - *q).abs() < 1e-6);
            Some(CoordValues::Numeric(all))
        }
        (CoordValues::Time(x), CoordValues::Time(y)) => {
            let mut all: Vec<_> = x.iter().chain(y).copied().collect();
            all.sort();
            all.dedup();
            Some(CoordValues::Time(all))
        }
        _ => None,
    }
}

/// Place `var` (from `source`) onto the coordinates of `target`.
fn reindex(var: &DataVariable, source: &Dataset, target: &Dataset) -> Result<DataVariable> {
    // For each axis, target index -> source index
    let mut maps: Vec<Vec<Option<usize>>> = Vec::with_capacity(var.dims.len());
    let mut shape = Vec::with_capacity(var.dims.len());
    for (axis, dim) in var.dims.iter().enumerate() {
        let len = var.data.shape()[axis];
        match (source.coord(dim), target.coord(dim)) {
            (Some(src), Some(dst)) if !dst.is_scalar() => {
                let map: Vec<Option<usize>> =
                    (0..dst.values.len()).map(|i| src.values.position_of(&dst.values, i)).collect();
                shape.push(map.len());
                maps.push(map);
            }
            _ => {
                shape.push(len);
                maps.push((0..len).map(Some).collect());
            }
        }
    }

    let identity = maps
        .iter()
        .zip(var.data.shape())
        .all(|(m, &len)| m.len() == len && m.iter().enumerate().all(|(i, s)| *s == Some(i)));
    if identity {
        return Ok(var.clone());
    }

    let mut data = ArrayD::from_elem(IxDyn(&shape), f32::NAN);
    let mut src_idx = vec![0usize; shape.len()];
    for (idx, value) in data.indexed_iter_mut() {
        let mut present = true;
        for (axis, map) in maps.iter().enumerate() {
            match map[idx[axis]] {
                Some(s) => src_idx[axis] = s,
                None => {
                    present = false;
                    break;
                }
            }
        }
        if present {
            *value = var.data[IxDyn(&src_idx)];
        }
    }

    Ok(DataVariable {
        data,
        ..var.clone()
    })
}
