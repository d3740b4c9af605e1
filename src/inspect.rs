//! Human-readable description of produced NetCDF files
//!
//! Used by the `inspect` subcommand to check an extracted, processed or
//! merged file without leaving the tool.

use crate::errors::Result;
use crate::netcdf_io::missing_variable;
use netcdf::AttributeValue;
use std::path::Path;

/// Dimension name and length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Quick statistics of a variable, NaN values excluded
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    pub valid: usize,
    pub missing: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Compute min/max/mean of a variable, ignoring missing values.
pub fn summarize_variable(path: &Path, var_name: &str) -> Result<VariableSummary> {
    let file = netcdf::open(path)?;
    let var = file
        .variable(var_name)
        .ok_or_else(|| missing_variable(var_name, path))?;
    let data: Vec<f32> = var.get_values::<f32, _>(..)?;
    let fill = var
        .attribute("_FillValue")
        .and_then(|a| a.value().ok())
        .and_then(|v| match v {
            AttributeValue::Float(f) => Some(f),
            AttributeValue::Double(d) => Some(d as f32),
            _ => None,
        });

    let valid: Vec<f32> = data
        .iter()
        .copied()
        .filter(|v| !v.is_nan() && Some(*v) != fill)
        .collect();
    let (min, max, mean) = if valid.is_empty() {
        (f32::NAN, f32::NAN, f32::NAN)
    } else {
        let min = valid.iter().copied().fold(f32::INFINITY, f32::min);
        let max = valid.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = (valid.iter().map(|v| f64::from(*v)).sum::<f64>() / valid.len() as f64) as f32;
        (min, max, mean)
    };

    Ok(VariableSummary {
        name: var_name.to_string(),
        valid: valid.len(),
        missing: data.len() - valid.len(),
        min,
        max,
        mean,
    })
}

/// Dimensions of a file, sorted by name
pub fn list_dimensions(path: &Path) -> Result<Vec<DimensionInfo>> {
    let file = netcdf::open(path)?;
    let mut dims: Vec<DimensionInfo> = file
        .dimensions()
        .map(|d| DimensionInfo {
            name: d.name(),
            length: d.len(),
            is_unlimited: d.is_unlimited(),
        })
        .collect();
    dims.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dims)
}

/// Report of dimensions, variables and global attributes.
pub fn describe_file(path: &Path) -> Result<String> {
    let file = netcdf::open(path)?;
    let mut lines = vec![format!("File: {}", path.display())];

    lines.push(String::new());
    lines.push("Dimensions".to_string());
    let dims = list_dimensions(path)?;
    if dims.is_empty() {
        lines.push("  (none)".to_string());
    }
    for dim in dims {
        let unlimited = if dim.is_unlimited { " (unlimited)" } else { "" };
        lines.push(format!("  {} = {}{}", dim.name, dim.length, unlimited));
    }

    lines.push(String::new());
    lines.push("Variables".to_string());
    let mut variables: Vec<_> = file.variables().collect();
    variables.sort_by_key(|v| v.name());
    for var in variables {
        let dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| format!("{}[{}]", d.name(), d.len()))
            .collect();
        let data_type = format!("{:?}", var.vartype()).to_lowercase();
        if dims.is_empty() {
            lines.push(format!("  {} ({}): scalar", var.name(), data_type));
        } else {
            lines.push(format!("  {} ({}): {}", var.name(), data_type, dims.join(", ")));
        }

        let key_attrs: Vec<String> = ["units", "long_name", "standard_name"]
            .iter()
            .filter_map(|name| match var.attribute(name).and_then(|a| a.value().ok()) {
                Some(AttributeValue::Str(s)) => Some(format!("{}: {}", name, s)),
                _ => None,
            })
            .collect();
        if !key_attrs.is_empty() {
            lines.push(format!("    {}", key_attrs.join(", ")));
        }
    }

    lines.push(String::new());
    lines.push("Global attributes".to_string());
    for attr in file.attributes() {
        match attr.value() {
            Ok(AttributeValue::Str(s)) => lines.push(format!("  {}: \"{}\"", attr.name(), s)),
            Ok(value) => lines.push(format!("  {}: {:?}", attr.name(), value)),
            Err(e) => lines.push(format!("  {}: (error reading value: {})", attr.name(), e)),
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CoordValues, Coordinate, DataVariable, Dataset};
    use crate::netcdf_io::{write_dataset, Encoding};
    use ndarray::{ArrayD, IxDyn};
    use tempfile::tempdir;

    fn sample(path: &Path) -> Result<()> {
        let mut ds = Dataset::new();
        ds.set_coord(
            Coordinate::dimension("lat", CoordValues::Numeric(vec![-6.0, -5.0]))
                .with_attr("units", "degrees_north"),
        );
        let data = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.5, f32::NAN])?;
        let mut var = DataVariable::new("tp", vec!["lat".into()], data)?;
        var.attrs.set("units", "kg m**-2");
        ds.set_data_var(var);
        ds.attrs.set("institution", "SENAMHI");
        write_dataset(&ds, path, Encoding::zlib(5))
    }

    #[test]
    fn report_lists_structure() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.nc");
        sample(&path)?;

        let report = describe_file(&path)?;
        assert!(report.contains("lat = 2"));
        assert!(report.contains("  tp ("));
        assert!(report.contains("lat[2]"));
        assert!(report.contains("units: kg m**-2"));
        assert!(report.contains("institution: \"SENAMHI\""));
        Ok(())
    }

    #[test]
    fn summary_skips_missing_values() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sample.nc");
        sample(&path)?;

        let summary = summarize_variable(&path, "tp")?;
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.max, 1.5);
        assert!(summarize_variable(&path, "t2m").is_err());
        Ok(())
    }
}
