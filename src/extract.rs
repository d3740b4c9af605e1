//! Extraction of selected fields from ETA and WRF GRIB output
//!
//! Each requested product of a GRIB file becomes one NetCDF file named
//! `<stem>_<tag>.nc`, holding a single variable on a leading `time` axis of
//! length one (the valid time), with scalar `step`/`valid_time`/level
//! coordinates the way a GRIB-to-xarray reader lays them out.

use crate::dataset::{AttrValue, CoordValues, Coordinate, DataVariable, Dataset};
use crate::errors::{Result, SmnError};
use crate::grib::{GribFile, GribMessage, Grid, LevelKind, MessageSource};
use crate::model::{Model, Product, VariableGroup, PRESSURE_LEVELS};
use crate::netcdf_io::{write_dataset, Encoding};
use crate::timing::ForecastTiming;
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Extract the requested groups from one GRIB file on disk.
pub fn extract_file(
    model: Model,
    grib_path: &Path,
    out_dir: &Path,
    groups: &[VariableGroup],
) -> Result<Extraction> {
    let source = GribFile::open(grib_path)?;
    extract(model, &source, out_dir, groups)
}

/// Files written for one GRIB file, and the products that could not be
/// extracted from it
#[derive(Debug, Default)]
pub struct Extraction {
    pub written: Vec<PathBuf>,
    /// Output stem and error of every failed product
    pub failures: Vec<(String, SmnError)>,
}

/// Extract the requested groups from any message source.
///
/// Timing comes from the source's path. A product that cannot be extracted
/// (typically a field missing from this lead time, such as accumulated
/// precipitation at lead 0) is logged and recorded, and the remaining
/// products are still written.
pub fn extract(
    model: Model,
    source: &dyn MessageSource,
    out_dir: &Path,
    groups: &[VariableGroup],
) -> Result<Extraction> {
    let mut extraction = Extraction::default();
    if groups.is_empty() {
        tracing::warn!(path = %source.origin().display(), "no variable groups requested");
        return Ok(extraction);
    }
    let timing = ForecastTiming::from_path(model, source.origin())?;
    std::fs::create_dir_all(out_dir)?;

    for group in groups {
        let products = group.products(model);
        if products.is_empty() {
            tracing::warn!(%model, group = %group, "group not available for this model");
            continue;
        }
        for product in &products {
            match extract_product(model, source, product, &timing, out_dir) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), variable = product.var_name, "extracted");
                    extraction.written.push(path);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %source.origin().display(),
                        variable = product.stem,
                        error = %e,
                        "product skipped"
                    );
                    extraction.failures.push((product.stem.to_string(), e));
                }
            }
        }
    }
    Ok(extraction)
}

fn extract_product(
    model: Model,
    source: &dyn MessageSource,
    product: &Product,
    timing: &ForecastTiming,
    out_dir: &Path,
) -> Result<PathBuf> {
    let messages = source.select_required(&product.selector)?;
    let dataset = build_dataset(model, product, &messages, timing)?;
    let path = out_dir.join(format!("{}_{}.nc", product.stem, timing.tag));
    write_dataset(&dataset, &path, Encoding::uncompressed())?;
    Ok(path)
}

/// Outcome of extracting one file as part of a batch
#[derive(Debug)]
pub struct FileExtraction {
    pub grib_path: PathBuf,
    pub result: Result<Extraction>,
}

/// Extract many GRIB files concurrently; a failing file does not stop the
/// others. Results keep the input order.
pub fn extract_many<F, S>(
    model: Model,
    grib_paths: &[PathBuf],
    out_dir: &Path,
    groups: &[VariableGroup],
    open: F,
) -> Vec<FileExtraction>
where
    F: Fn(&Path) -> Result<S> + Sync,
    S: MessageSource,
{
    grib_paths
        .par_iter()
        .map(|grib_path| {
            let result = open(grib_path).and_then(|source| extract(model, &source, out_dir, groups));
            if let Err(e) = &result {
                tracing::error!(path = %grib_path.display(), error = %e, "extraction failed");
            }
            FileExtraction {
                grib_path: grib_path.clone(),
                result,
            }
        })
        .collect()
}

/// Assemble the per-lead-time dataset of one product.
pub fn build_dataset(
    model: Model,
    product: &Product,
    messages: &[GribMessage],
    timing: &ForecastTiming,
) -> Result<Dataset> {
    let first = messages.first().ok_or_else(|| SmnError::NoMatchingMessage {
        selector: product.selector.to_string(),
        path: PathBuf::new(),
    })?;
    if messages.len() > 1 && !product.is_pressure_level() {
        tracing::debug!(
            variable = product.var_name,
            count = messages.len(),
            "several messages matched, keeping the first"
        );
    }

    let (lats, lons) = axes(model, &first.grid);
    let mut dims: Vec<String> = Vec::new();
    let mut shape: Vec<usize> = Vec::new();
    let mut values: Vec<f32> = Vec::new();

    let mut dataset = Dataset::new();
    let valid_time = timing.valid_time();
    if let Some(valid) = valid_time {
        dims.push("time".to_string());
        shape.push(1);
        dataset.set_coord(
            Coordinate::dimension("time", CoordValues::Time(vec![valid]))
                .with_attr("long_name", "time")
                .with_attr("standard_name", "time"),
        );
    }

    let level_name = product.selector.level.as_str();
    if product.is_pressure_level() {
        let mut levels: Vec<f64> = Vec::new();
        for message in messages {
            if levels.iter().any(|l| (l - message.level_value).abs() < 1e-6) {
                continue;
            }
            levels.push(message.level_value);
            values.extend(layout(model, &message.grid, &lats, &lons)?);
        }
        dims.push(level_name.to_string());
        shape.push(levels.len());
        dataset.set_coord(
            Coordinate::dimension(level_name, CoordValues::Numeric(levels))
                .with_attr("long_name", "pressure")
                .with_attr("units", "hPa")
                .with_attr("positive", "down")
                .with_attr("stored_direction", "decreasing")
                .with_attr("standard_name", "air_pressure"),
        );
    } else {
        values = layout(model, &first.grid, &lats, &lons)?;
    }

    dims.push("latitude".to_string());
    dims.push("longitude".to_string());
    shape.push(lats.len());
    shape.push(lons.len());
    dataset.set_coord(
        Coordinate::dimension("latitude", CoordValues::Numeric(lats))
            .with_attr("units", "degrees_north")
            .with_attr("standard_name", "latitude")
            .with_attr("long_name", "latitude"),
    );
    dataset.set_coord(
        Coordinate::dimension("longitude", CoordValues::Numeric(lons))
            .with_attr("units", "degrees_east")
            .with_attr("standard_name", "longitude")
            .with_attr("long_name", "longitude"),
    );

    // scalar coordinates
    let mut scalars = vec!["step".to_string()];
    dataset.set_coord(
        Coordinate::scalar("step", CoordValues::Numeric(vec![timing.lead_hours as f64]))
            .with_attr("long_name", "time since forecast_reference_time")
            .with_attr("units", "hours")
            .with_attr("standard_name", "forecast_period"),
    );
    if !product.is_pressure_level() {
        let mut level = Coordinate::scalar(level_name, CoordValues::Numeric(vec![first.level_value]));
        if product.selector.level == LevelKind::HeightAboveGround {
            level = level
                .with_attr("long_name", "height above the surface")
                .with_attr("units", "m")
                .with_attr("positive", "up")
                .with_attr("standard_name", "height");
        } else {
            level = level.with_attr("long_name", "original GRIB coordinate for key: level");
        }
        dataset.set_coord(level);
        scalars.push(level_name.to_string());
    }
    if let Some(valid) = valid_time {
        dataset.set_coord(
            Coordinate::scalar("valid_time", CoordValues::Time(vec![valid]))
                .with_attr("standard_name", "time")
                .with_attr("long_name", "time"),
        );
        scalars.push("valid_time".to_string());
    }

    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
    let mut var = DataVariable::new(product.var_name, dims, data)?;
    let selector = &product.selector;
    var.attrs.set("GRIB_shortName", selector.short_name);
    var.attrs.set("GRIB_discipline", i32::from(selector.discipline));
    var.attrs.set("GRIB_parameterCategory", i32::from(selector.category));
    var.attrs.set("GRIB_parameterNumber", i32::from(selector.number));
    var.attrs.set("GRIB_typeOfLevel", level_name);
    var.attrs.set(
        "GRIB_stepType",
        product.step_type(first.step),
    );
    var.attrs.set("GRIB_Nx", first.grid.cols as i32);
    var.attrs.set("GRIB_Ny", first.grid.rows as i32);
    var.attrs.set("long_name", product.long_name);
    var.attrs.set("units", product.units);
    var.attrs.set("coordinates", scalars.join(" "));
    dataset.set_data_var(var);

    dataset.attrs.set("GRIB_edition", 2);
    dataset.attrs.set("GRIB_model", AttrValue::from(model.to_string()));
    dataset.attrs.set("Conventions", "CF-1.7");

    if product.is_pressure_level() {
        dataset.sel_nearest(level_name, &PRESSURE_LEVELS)?;
    }
    Ok(dataset)
}

/// Latitude and longitude axes of a grid.
///
/// ETA keeps the native scan order. WRF uses the unique latitudes and
/// longitudes in ascending order.
fn axes(model: Model, grid: &Grid) -> (Vec<f64>, Vec<f64>) {
    if model.restructures_grid() {
        (unique_sorted(&grid.lats), unique_sorted(&grid.lons))
    } else {
        (grid.row_latitudes(), grid.column_longitudes())
    }
}

/// Values of `grid` laid out on the `lats` x `lons` axes.
fn layout(model: Model, grid: &Grid, lats: &[f64], lons: &[f64]) -> Result<Vec<f32>> {
    if !model.restructures_grid() {
        if grid.rows != lats.len() || grid.cols != lons.len() {
            return Err(SmnError::Grib(format!(
                "grid {}x{} differs from the first message's {}x{}",
                grid.rows,
                grid.cols,
                lats.len(),
                lons.len()
            )));
        }
        return Ok(grid.values.clone());
    }

    let mut out = vec![f32::NAN; lats.len() * lons.len()];
    for ((lat, lon), value) in grid.lats.iter().zip(&grid.lons).zip(&grid.values) {
        let (Some(i), Some(j)) = (find_sorted(lats, *lat), find_sorted(lons, *lon)) else {
            return Err(SmnError::Grib(format!(
                "point ({}, {}) lies outside the grid of the first message",
                lat, lon
            )));
        };
        out[i * lons.len() + j] = *value;
    }
    Ok(out)
}

fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    sorted
}

fn find_sorted(axis: &[f64], value: f64) -> Option<usize> {
    let idx = axis.partition_point(|x| *x < value - 1e-6);
    (idx < axis.len() && (axis[idx] - value).abs() < 1e-6).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grib::{MemorySource, StepKind};
    use crate::netcdf_io::read_dataset;
    use crate::process::surface_dims;
    use crate::rename_clean::rename_and_clean;
    use tempfile::tempdir;

    fn grid(values: Vec<f32>) -> Grid {
        // north-to-south rows, as GRIB files usually scan
        let latlons = vec![
            (-5.0, 280.0),
            (-5.0, 281.0),
            (-6.0, 280.0),
            (-6.0, 281.0),
        ];
        Grid::from_points(latlons, values).unwrap()
    }

    fn msg(category: u8, number: u8, level: LevelKind, value: f64, step: StepKind, data: Vec<f32>) -> GribMessage {
        GribMessage {
            discipline: 0,
            category,
            number,
            level: Some(level),
            level_value: value,
            step,
            grid: grid(data),
        }
    }

    fn source(path: &str) -> MemorySource {
        let mut messages = vec![
            msg(0, 0, LevelKind::HeightAboveGround, 2.0, StepKind::Instant, vec![300.0, 301.0, 302.0, 303.0]),
            msg(1, 8, LevelKind::Surface, 0.0, StepKind::Statistical, vec![0.0, 1.0, 2.0, 3.0]),
        ];
        for (i, level) in [1000.0, 925.0, 850.0, 700.0, 500.0, 250.0].iter().enumerate() {
            let base = i as f32 * 10.0;
            messages.push(msg(2, 2, LevelKind::IsobaricInhPa, *level, StepKind::Instant, vec![base, base + 1.0, base + 2.0, base + 3.0]));
        }
        MemorySource::new(path, messages)
    }

    #[test]
    fn eta_keeps_native_grid_order() -> Result<()> {
        let dir = tempdir()?;
        let src = source("/runs/PERU_ETA22/2025/202501/2025010106/latlon_006");
        let written = extract(Model::Eta, &src, dir.path(), &[VariableGroup::T2m])?.written;
        assert_eq!(written, vec![dir.path().join("t2m_006.nc")]);

        let ds = read_dataset(&written[0])?;
        let t2m = ds.data_var("t2m").unwrap();
        assert_eq!(t2m.dims, vec!["time", "latitude", "longitude"]);
        assert_eq!(t2m.data[[0, 0, 0]], 300.0);
        assert_eq!(
            ds.coord("latitude").unwrap().values,
            CoordValues::Numeric(vec![-5.0, -6.0])
        );
        assert_eq!(t2m.attrs.get_str("coordinates"), Some("step heightAboveGround valid_time"));
        assert!(ds.coord("valid_time").unwrap().is_scalar());
        Ok(())
    }

    #[test]
    fn wrf_restructures_to_ascending_axes() -> Result<()> {
        let dir = tempdir()?;
        let src = source("/runs/PERU_WRF22/202501/2025010106/WRFPRS_d01.03");
        let written = extract(Model::Wrf, &src, dir.path(), &[VariableGroup::T2m])?.written;
        assert_eq!(written, vec![dir.path().join("t2m_003.nc")]);

        let ds = read_dataset(&written[0])?;
        assert_eq!(
            ds.coord("latitude").unwrap().values,
            CoordValues::Numeric(vec![-6.0, -5.0])
        );
        let t2m = ds.data_var("t2m").unwrap();
        // the southern row moved first, each value stays with its point
        assert_eq!(t2m.data[[0, 0, 0]], 302.0);
        assert_eq!(t2m.data[[0, 1, 1]], 301.0);
        Ok(())
    }

    #[test]
    fn pressure_levels_use_nearest_match() -> Result<()> {
        let dir = tempdir()?;
        let src = source("/runs/PERU_ETA22/2025/202501/2025010106/latlon_000");
        let extraction = extract(Model::Eta, &src, dir.path(), &[VariableGroup::LevelVars])?;
        // v is not in the source, u is still written
        assert_eq!(extraction.written, vec![dir.path().join("u_000.nc")]);
        assert_eq!(extraction.failures.len(), 1);
        assert_eq!(extraction.failures[0].0, "v");
        assert!(matches!(extraction.failures[0].1, SmnError::NoMatchingMessage { .. }));

        let u = VariableGroup::LevelVars.products(Model::Eta)[0].clone();
        let timing = ForecastTiming::from_path(Model::Eta, src.origin())?;
        let ds = build_dataset(Model::Eta, &u, &src.select(&u.selector)?, &timing)?;
        assert_eq!(
            ds.coord("isobaricInhPa").unwrap().values,
            CoordValues::Numeric(vec![925.0, 850.0, 500.0, 250.0])
        );
        let var = ds.data_var("u").unwrap();
        assert_eq!(var.data.shape(), &[1, 4, 2, 2]);
        assert_eq!(var.data[[0, 3, 0, 0]], 50.0);
        Ok(())
    }

    #[test]
    fn unavailable_groups_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let src = source("/runs/PERU_WRF22/202501/2025010106/WRFPRS_d01.00");
        let extraction = extract(Model::Wrf, &src, dir.path(), &[VariableGroup::Ssrd])?;
        assert!(extraction.written.is_empty());
        assert!(extraction.failures.is_empty());
        assert!(extract(Model::Wrf, &src, dir.path(), &[])?.written.is_empty());
        Ok(())
    }

    #[test]
    fn batch_extraction_reports_each_file() {
        let dir = tempdir().unwrap();
        let paths = vec![
            PathBuf::from("/runs/PERU_WRF22/202501/2025010106/WRFPRS_d01.00"),
            PathBuf::from("/runs/PERU_WRF22/202501/2025010106/WRFPRS_d01.03"),
            PathBuf::from("/runs/PERU_WRF22/202501/2025010106/WRFPRS_d01"),
        ];
        let results = extract_many(
            Model::Wrf,
            &paths,
            dir.path(),
            &[VariableGroup::Precipitation],
            |p: &Path| Ok(source(&p.to_string_lossy())),
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].result.as_ref().is_ok_and(|e| e.failures.is_empty()));
        assert!(results[1].result.is_ok());
        // no lead time suffix
        assert!(results[2].result.is_err());
        assert!(dir.path().join("tp_003.nc").exists());
    }

    #[test]
    fn missing_product_does_not_stop_the_file() -> Result<()> {
        let dir = tempdir()?;
        // lead 0 carries no accumulated precipitation
        let src = MemorySource::new(
            "/runs/PERU_ETA22/2025/202501/2025010106/latlon_000",
            vec![msg(0, 0, LevelKind::HeightAboveGround, 2.0, StepKind::Instant, vec![300.0; 4])],
        );
        let extraction = extract(
            Model::Eta,
            &src,
            dir.path(),
            &[VariableGroup::Precipitation, VariableGroup::T2m],
        )?;
        assert_eq!(extraction.written, vec![dir.path().join("t2m_000.nc")]);
        assert_eq!(extraction.failures.len(), 1);
        let (stem, error) = &extraction.failures[0];
        assert_eq!(stem, "tp");
        assert!(error.to_string().contains("tp"));
        assert!(!dir.path().join("tp_000.nc").exists());
        Ok(())
    }

    #[test]
    fn wrf_without_run_directory_has_no_time_axis() -> Result<()> {
        let dir = tempdir()?;
        let src = source("/tmp/WRFPRS_d01.06");
        let written = extract(Model::Wrf, &src, dir.path(), &[VariableGroup::T2m])?.written;
        assert_eq!(written, vec![dir.path().join("t2m_006.nc")]);

        let ds = read_dataset(&written[0])?;
        let t2m = ds.data_var("t2m").unwrap();
        assert_eq!(t2m.dims, vec!["latitude", "longitude"]);
        assert!(ds.coord("valid_time").is_none());
        assert!(ds.coord("time").is_none());

        // the file cannot be brought to (time, lat, lon)
        assert!(matches!(
            rename_and_clean(&written[0], "t2m", &surface_dims()),
            Err(SmnError::DimensionMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn step_type_follows_the_product() -> Result<()> {
        let src = MemorySource::new(
            "/runs/PERU_ETA22/2025/202501/2025010106/latlon_006",
            vec![
                msg(1, 8, LevelKind::Surface, 0.0, StepKind::Statistical, vec![1.0; 4]),
                msg(4, 7, LevelKind::Surface, 0.0, StepKind::Statistical, vec![200.0; 4]),
            ],
        );
        let timing = ForecastTiming::from_path(Model::Eta, src.origin())?;
        for (group, expected) in [(VariableGroup::Precipitation, "accum"), (VariableGroup::Ssrd, "avg")] {
            let product = group.products(Model::Eta)[0].clone();
            let ds = build_dataset(Model::Eta, &product, &src.select(&product.selector)?, &timing)?;
            let var = ds.data_var(product.var_name).unwrap();
            assert_eq!(var.attrs.get_str("GRIB_stepType"), Some(expected));
        }
        Ok(())
    }
}
