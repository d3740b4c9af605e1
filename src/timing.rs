//! Forecast timestamps derived from run directory and file naming conventions
//!
//! Model output is laid out as `.../<YYYYMMDDHH>/<file>`, where the directory
//! name is the run (initialisation) time and the file name carries the lead
//! time: `latlon_018` for ETA and `WRFPRS_d01.18` for WRF.

use crate::errors::{Result, SmnError};
use crate::model::Model;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::Path;

/// Format of run directories and run identifiers.
pub const RUN_FORMAT: &str = "%Y%m%d%H";

/// CF units used for every time coordinate written by this crate.
pub const TIME_UNITS: &str = "hours since 1970-01-01 00:00:00";

/// Calendar attribute paired with [`TIME_UNITS`].
pub const TIME_CALENDAR: &str = "proleptic_gregorian";

/// Timing information for one forecast file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastTiming {
    pub init_time: Option<NaiveDateTime>,
    pub lead_hours: i64,
    /// Three character lead tag used in output file names (`006`)
    pub tag: String,
}

impl ForecastTiming {
    /// Derive timing for a GRIB file of the given model.
    ///
    /// ETA requires a parseable run directory; WRF tolerates a missing one and
    /// leaves `init_time` empty.
    pub fn from_path(model: Model, path: &Path) -> Result<Self> {
        let init_time = match (model, init_time_from_path(path)) {
            (_, Ok(t)) => Some(t),
            (Model::Wrf, Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "run time not found, writing without time axis");
                None
            }
            (Model::Eta, Err(e)) => return Err(e),
        };

        Ok(Self {
            init_time,
            lead_hours: lead_hours(model, path),
            tag: forecast_tag(model, path)?,
        })
    }

    /// Run time plus lead time, when the run time is known
    pub fn valid_time(&self) -> Option<NaiveDateTime> {
        self.init_time
            .map(|t| t + Duration::hours(self.lead_hours))
    }
}

/// Parse a run identifier such as `2025010106`.
pub fn parse_run(run: &str) -> Result<NaiveDateTime> {
    if run.len() != 10 || !run.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SmnError::InvalidTime(format!(
            "run '{}' is not formatted as YYYYMMDDHH",
            run
        )));
    }
    let date = NaiveDate::parse_from_str(&run[..8], "%Y%m%d")
        .map_err(|e| SmnError::InvalidTime(format!("run '{}': {}", run, e)))?;
    let hour: u32 = run[8..]
        .parse()
        .map_err(|_| SmnError::InvalidTime(format!("run '{}': bad hour", run)))?;
    date.and_hms_opt(hour, 0, 0)
        .ok_or_else(|| SmnError::InvalidTime(format!("run '{}': hour out of range", run)))
}

/// Initialisation time from the name of the file's parent directory.
pub fn init_time_from_path(path: &Path) -> Result<NaiveDateTime> {
    let dir = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .ok_or_else(|| SmnError::InvalidPath {
            path: path.to_path_buf(),
            message: "no run directory".to_string(),
        })?;
    parse_run(dir)
}

/// Lead time in hours encoded in the file name, 0 when absent.
pub fn lead_hours(model: Model, path: &Path) -> i64 {
    let digits = match model {
        Model::Eta => file_name(path).and_then(|name| {
            let (_, rest) = name.split_once("latlon_")?;
            Some(leading_digits(rest))
        }),
        Model::Wrf => numeric_suffix(path),
    };
    digits
        .filter(|d| !d.is_empty())
        .and_then(|d| d.parse().ok())
        .unwrap_or(0)
}

/// Three character tag identifying the lead time in output names.
///
/// ETA keeps the last three characters of the file name; WRF zero-pads the
/// numeric suffix (`WRFPRS_d01.6` -> `006`).
pub fn forecast_tag(model: Model, path: &Path) -> Result<String> {
    match model {
        Model::Eta => {
            let name = file_name(path).ok_or_else(|| invalid(path, "no file name"))?;
            let chars: Vec<char> = name.chars().collect();
            let start = chars.len().saturating_sub(3);
            Ok(chars[start..].iter().collect())
        }
        Model::Wrf => {
            let digits = numeric_suffix(path)
                .filter(|d| !d.is_empty())
                .ok_or_else(|| invalid(path, "no numeric lead suffix"))?;
            let hours: u32 = digits
                .parse()
                .map_err(|_| invalid(path, "lead suffix out of range"))?;
            Ok(format!("{:03}", hours))
        }
    }
}

/// Encode timestamps as CF hours since the Unix epoch.
pub fn encode_times(times: &[NaiveDateTime]) -> Vec<f64> {
    let epoch = epoch();
    times
        .iter()
        .map(|t| (*t - epoch).num_seconds() as f64 / 3600.0)
        .collect()
}

/// Decode numeric CF time values given a `<unit> since <date>` units string.
pub fn decode_times(values: &[f64], units: &str) -> Result<Vec<NaiveDateTime>> {
    let (unit, origin) = units
        .split_once(" since ")
        .ok_or_else(|| SmnError::InvalidTime(format!("units '{}' lack 'since'", units)))?;

    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" | "min" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        other => {
            return Err(SmnError::InvalidTime(format!(
                "unsupported time unit '{}'",
                other
            )))
        }
    };
    let origin = parse_origin(origin.trim())?;

    Ok(values
        .iter()
        .map(|v| origin + Duration::milliseconds((v * seconds_per_unit * 1000.0).round() as i64))
        .collect())
}

fn parse_origin(origin: &str) -> Result<NaiveDateTime> {
    // Accept "1970-01-01", "1970-01-01 00:00:00", "1970-01-01T00:00:00" and
    // trailing zone designators that CF writers sometimes append.
    let cleaned = origin
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .replace('T', " ");
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| SmnError::InvalidTime(format!("bad time origin '{}'", origin)))
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// Digits after the final `.` of the path, if the path ends in them.
fn numeric_suffix(path: &Path) -> Option<&str> {
    let name = file_name(path)?;
    let (_, suffix) = name.rsplit_once('.')?;
    suffix
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then_some(suffix)
}

fn invalid(path: &Path, message: &str) -> SmnError {
    SmnError::InvalidPath {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn eta_timing() {
        let path = PathBuf::from("/data/PERU_ETA22/2025/202501/2025010106/latlon_018");
        let timing = ForecastTiming::from_path(Model::Eta, &path).unwrap();
        assert_eq!(timing.init_time, Some(dt(2025, 1, 1, 6)));
        assert_eq!(timing.lead_hours, 18);
        assert_eq!(timing.tag, "018");
        assert_eq!(timing.valid_time(), Some(dt(2025, 1, 2, 0)));
    }

    #[test]
    fn eta_requires_run_directory() {
        let path = PathBuf::from("/data/latest/latlon_018");
        assert!(ForecastTiming::from_path(Model::Eta, &path).is_err());
    }

    #[test]
    fn wrf_timing() {
        let path = PathBuf::from("/data/PERU_WRF22/202501/2025010106/WRFPRS_d01.06");
        let timing = ForecastTiming::from_path(Model::Wrf, &path).unwrap();
        assert_eq!(timing.lead_hours, 6);
        assert_eq!(timing.tag, "006");
        assert_eq!(timing.valid_time(), Some(dt(2025, 1, 1, 12)));
    }

    #[test]
    fn wrf_without_run_directory_has_no_valid_time() {
        let path = PathBuf::from("/tmp/WRFPRS_d01.120");
        let timing = ForecastTiming::from_path(Model::Wrf, &path).unwrap();
        assert_eq!(timing.init_time, None);
        assert_eq!(timing.valid_time(), None);
        assert_eq!(timing.tag, "120");
    }

    #[test]
    fn missing_lead_defaults_to_zero() {
        assert_eq!(lead_hours(Model::Eta, Path::new("/r/2025010100/other")), 0);
        assert_eq!(lead_hours(Model::Wrf, Path::new("/r/2025010100/WRFPRS")), 0);
    }

    #[test]
    fn run_parsing_rejects_garbage() {
        assert!(parse_run("20250101").is_err());
        assert!(parse_run("2025013106").is_ok());
        assert!(parse_run("2025010125").is_err());
        assert!(parse_run("2025a10106").is_err());
    }

    #[test]
    fn cf_time_round_trip() {
        let times = vec![dt(2025, 1, 1, 6), dt(2025, 1, 1, 9)];
        let encoded = encode_times(&times);
        assert_eq!(encoded[1] - encoded[0], 3.0);
        let decoded = decode_times(&encoded, TIME_UNITS).unwrap();
        assert_eq!(decoded, times);
    }

    #[test]
    fn decodes_other_units() {
        let decoded = decode_times(&[1.0, 86400.0], "seconds since 2025-01-01").unwrap();
        assert_eq!(decoded[0], dt(2025, 1, 1, 0) + Duration::seconds(1));
        assert_eq!(decoded[1], dt(2025, 1, 2, 0));
        assert!(decode_times(&[1.0], "fortnights since 2025-01-01").is_err());
        assert!(decode_times(&[1.0], "hours").is_err());
    }
}
