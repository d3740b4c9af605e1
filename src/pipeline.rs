//! End-to-end processing of one forecast run
//!
//! A run is identified by its model name (`PERU_WRF22`) and initialisation
//! time (`2025010106`). [`run`] locates the run's GRIB files, extracts the
//! requested variables, builds one time series per variable and merges them
//! into `<HH>Z/<model_name>_<run>_{prs,sfc}.nc` next to the work directory.

use crate::clean::clean_outdir;
use crate::errors::{Result, SmnError};
use crate::extract::extract_many;
use crate::grib::{GribFile, MessageSource};
use crate::merge::{merge_files, MergeMetadata, DEFAULT_INSTITUTION};
use crate::model::{processed_stems, Model, VariableGroup};
use crate::process::{pressure_dims, process_netcdf_files, surface_dims};
use crate::timing::parse_run;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Parameters of one pipeline run, usually read from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding one sub-directory per model
    pub data_root: PathBuf,
    /// Model directory name, e.g. `PERU_ETA22`
    pub model_name: String,
    /// Initialisation time as `YYYYMMDDHH`
    pub run: String,
    /// Variable group keywords
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
    /// Work directory, `<data_root>/out/<model_name>` when absent
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default = "default_institution")]
    pub institution: String,
}

fn default_groups() -> Vec<String> {
    ["tp", "level_vars", "wind10m", "t2m", "r2m", "ssrd", "mslp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_institution() -> String {
    DEFAULT_INSTITUTION.to_string()
}

impl RunConfig {
    pub fn new(data_root: impl Into<PathBuf>, model_name: &str, run: &str) -> Self {
        Self {
            data_root: data_root.into(),
            model_name: model_name.to_string(),
            run: run.to_string(),
            groups: default_groups(),
            out_dir: None,
            institution: default_institution(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model()?;
        self.run_time()?;
        Ok(())
    }

    pub fn model(&self) -> Result<Model> {
        Model::from_run_name(&self.model_name).ok_or_else(|| {
            SmnError::InvalidConfig(format!(
                "model name '{}' names neither ETA nor WRF",
                self.model_name
            ))
        })
    }

    pub fn run_time(&self) -> Result<NaiveDateTime> {
        parse_run(&self.run)
    }

    pub fn variable_groups(&self) -> Vec<VariableGroup> {
        VariableGroup::parse_list(&self.groups)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| self.data_root.join("out").join(&self.model_name))
    }

    /// `<parent of work dir>/<HH>Z`
    pub fn run_dir(&self) -> Result<PathBuf> {
        let hour = self.run_time()?.hour();
        let work_dir = self.work_dir();
        let parent = work_dir.parent().unwrap_or_else(|| Path::new("."));
        Ok(parent.join(format!("{:02}Z", hour)))
    }

    /// Directory holding the run's GRIB files
    pub fn grib_dir(&self) -> Result<PathBuf> {
        let model = self.model()?;
        let t = self.run_time()?;
        let base = self.data_root.join(&self.model_name);
        let month = format!("{:04}{:02}", t.year(), t.month());
        Ok(match model {
            Model::Eta => base.join(format!("{:04}", t.year())).join(month).join(&self.run),
            Model::Wrf => base.join(month).join(&self.run),
        })
    }
}

/// The two consolidated outputs of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSet {
    Prs,
    Sfc,
}

impl ProductSet {
    pub const ALL: [ProductSet; 2] = [ProductSet::Prs, ProductSet::Sfc];

    pub fn prefix(&self) -> &'static str {
        match self {
            ProductSet::Prs => "prs",
            ProductSet::Sfc => "sfc",
        }
    }

    pub fn dims(&self) -> Vec<String> {
        match self {
            ProductSet::Prs => pressure_dims(),
            ProductSet::Sfc => surface_dims(),
        }
    }
}

/// A step of the run that failed without stopping it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: String,
    pub target: String,
    pub error: String,
}

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub model_name: String,
    pub run: String,
    pub grib_files: usize,
    pub extracted: Vec<PathBuf>,
    pub processed: Vec<PathBuf>,
    pub merged: Vec<PathBuf>,
    /// Variable stems that had no extracted files
    pub skipped: Vec<String>,
    pub failures: Vec<StageFailure>,
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// GRIB files of `model` in `dir`: names starting with the model's prefix,
/// excluding index and control files, sorted.
pub fn locate_grib_files(model: Model, dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SmnError::InvalidPath {
            path: dir.to_path_buf(),
            message: "run directory not found".to_string(),
        });
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(model.grib_prefix())
            && !name.contains("idx")
            && !name.contains("ctl")
            && path.is_file()
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// NetCDF files in `dir` whose names start with `<prefix>_`, sorted.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let wanted = format!("{}_", prefix);
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(&wanted) && n.ends_with(".nc"));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Run the full pipeline on GRIB files read from disk.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    run_with(config, |path| GribFile::open(path))
}

/// Run the full pipeline, opening each located file with `open`.
pub fn run_with<F, S>(config: &RunConfig, open: F) -> Result<RunSummary>
where
    F: Fn(&Path) -> Result<S> + Sync,
    S: MessageSource,
{
    let model = config.model()?;
    let groups = config.variable_groups();
    let work_dir = config.work_dir();
    let run_dir = config.run_dir()?;

    let mut summary = RunSummary {
        model_name: config.model_name.clone(),
        run: config.run.clone(),
        ..RunSummary::default()
    };

    let grib_files = locate_grib_files(model, &config.grib_dir()?)?;
    summary.grib_files = grib_files.len();
    tracing::info!(
        %model,
        run = %config.run,
        files = grib_files.len(),
        groups = ?groups.iter().map(|g| g.keyword()).collect::<Vec<_>>(),
        "starting run"
    );

    fs::create_dir_all(&work_dir)?;
    clean_outdir(&work_dir)?;

    for outcome in extract_many(model, &grib_files, &work_dir, &groups, open) {
        let grib_path = outcome.grib_path.display().to_string();
        match outcome.result {
            Ok(extraction) => {
                summary.extracted.extend(extraction.written);
                for (stem, e) in extraction.failures {
                    summary.failures.push(StageFailure {
                        stage: "extract".to_string(),
                        target: format!("{}:{}", grib_path, stem),
                        error: e.to_string(),
                    });
                }
            }
            Err(e) => summary.failures.push(StageFailure {
                stage: "extract".to_string(),
                target: grib_path,
                error: e.to_string(),
            }),
        }
    }

    for set in ProductSet::ALL {
        let dims = set.dims();
        for stem in processed_stems(&groups, set == ProductSet::Prs) {
            let files = files_with_prefix(&work_dir, stem)?;
            if files.is_empty() {
                tracing::warn!(variable = stem, "no files for variable");
                summary.skipped.push(stem.to_string());
                continue;
            }
            match process_netcdf_files(&files, set.prefix(), &dims) {
                Ok(path) => summary.processed.push(path),
                Err(e) => {
                    tracing::error!(variable = stem, error = %e, "processing failed");
                    summary.failures.push(StageFailure {
                        stage: "process".to_string(),
                        target: stem.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let metadata = MergeMetadata {
        institution: config.institution.clone(),
        source: None,
    };
    for set in ProductSet::ALL {
        let files = files_with_prefix(&work_dir, set.prefix())?;
        if files.is_empty() {
            tracing::warn!(set = set.prefix(), "no files to merge");
            continue;
        }
        let output = run_dir.join(format!(
            "{}_{}_{}.nc",
            config.model_name,
            config.run,
            set.prefix()
        ));
        match merge_files(&files, &output, &metadata) {
            Ok(path) => summary.merged.push(path),
            Err(e) => {
                tracing::error!(set = set.prefix(), error = %e, "merge failed");
                summary.failures.push(StageFailure {
                    stage: "merge".to_string(),
                    target: output.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        merged = summary.merged.len(),
        failures = summary.failures.len(),
        "run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directories_follow_model_layout() -> Result<()> {
        let eta = RunConfig::new("/data", "PERU_ETA22", "2025010106");
        assert_eq!(
            eta.grib_dir()?,
            PathBuf::from("/data/PERU_ETA22/2025/202501/2025010106")
        );
        assert_eq!(eta.work_dir(), PathBuf::from("/data/out/PERU_ETA22"));
        assert_eq!(eta.run_dir()?, PathBuf::from("/data/out/06Z"));

        let wrf = RunConfig::new("/data", "PERU_WRF22", "2025010112");
        assert_eq!(wrf.grib_dir()?, PathBuf::from("/data/PERU_WRF22/202501/2025010112"));
        assert_eq!(wrf.run_dir()?, PathBuf::from("/data/out/12Z"));
        Ok(())
    }

    #[test]
    fn config_from_json_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{"data_root": "/data", "model_name": "PERU_WRF22", "run": "2025010106", "groups": ["tp", "t2m"]}"#,
        )?;
        let config = RunConfig::from_json_file(&path)?;
        assert_eq!(config.institution, "SENAMHI");
        assert_eq!(config.out_dir, None);
        assert_eq!(
            config.variable_groups(),
            vec![VariableGroup::Precipitation, VariableGroup::T2m]
        );
        Ok(())
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(RunConfig::new("/data", "PERU_GFS", "2025010106").validate().is_err());
        assert!(RunConfig::new("/data", "PERU_WRF22", "20250101").validate().is_err());
    }

    #[test]
    fn grib_files_skip_index_and_control() -> Result<()> {
        let dir = tempdir()?;
        for name in ["WRFPRS_d01.06", "WRFPRS_d01.03", "WRFPRS_d01.03.idx", "WRFPRS.ctl", "other"] {
            fs::write(dir.path().join(name), b"")?;
        }
        let files = locate_grib_files(Model::Wrf, dir.path())?;
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["WRFPRS_d01.03", "WRFPRS_d01.06"]);
        assert!(locate_grib_files(Model::Wrf, &dir.path().join("absent")).is_err());
        Ok(())
    }

    #[test]
    fn prefix_matching_is_exact() -> Result<()> {
        let dir = tempdir()?;
        for name in ["u_006.nc", "u10_006.nc", "10u_006.nc", "u_003.nc", "sfc_tmp_u.nc"] {
            fs::write(dir.path().join(name), b"")?;
        }
        let files = files_with_prefix(dir.path(), "u")?;
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("u_003.nc"));
        Ok(())
    }
}
