//! GRIB2 message selection
//!
//! Fields are picked out of a GRIB file with a [`Selector`], the equivalent of
//! filtering by short name, level type, level value and step type. Decoding is
//! delegated to the `grib` crate; [`MessageSource`] is the seam that lets the
//! extraction code run against any other source of decoded messages.

use crate::errors::{Result, SmnError};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Type of the first fixed surface (GRIB2 code table 4.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelKind {
    Surface,
    IsobaricInhPa,
    MeanSea,
    HeightAboveGround,
}

impl LevelKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LevelKind::Surface),
            100 => Some(LevelKind::IsobaricInhPa),
            101 => Some(LevelKind::MeanSea),
            103 => Some(LevelKind::HeightAboveGround),
            _ => None,
        }
    }

    /// Level type name as used for coordinate names
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelKind::Surface => "surface",
            LevelKind::IsobaricInhPa => "isobaricInhPa",
            LevelKind::MeanSea => "meanSea",
            LevelKind::HeightAboveGround => "heightAboveGround",
        }
    }

    /// Convert a raw fixed surface value to the unit of this level type.
    /// Isobaric surfaces are stored in Pa and reported in hPa.
    pub fn scale(&self, raw: f64) -> f64 {
        match self {
            LevelKind::IsobaricInhPa => raw / 100.0,
            _ => raw,
        }
    }
}

/// Instantaneous fields use product template 4.0; accumulations and
/// averages use the statistically processed templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Instant,
    Statistical,
}

impl StepKind {
    pub fn from_template(template: u16) -> Self {
        match template {
            8 | 11 | 12 | 15 => StepKind::Statistical,
            _ => StepKind::Instant,
        }
    }
}

/// Criteria a GRIB message must meet to be extracted
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub short_name: &'static str,
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub level: LevelKind,
    /// Required level value; `None` accepts every level of `level`
    pub level_value: Option<f64>,
    /// Required step type; `None` accepts both
    pub step: Option<StepKind>,
}

impl Selector {
    pub fn matches(&self, message: &GribMessage) -> bool {
        message.discipline == self.discipline
            && message.category == self.category
            && message.number == self.number
            && message.level == Some(self.level)
            && self
                .level_value
                .map_or(true, |v| (message.level_value - v).abs() < 1e-6)
            && self.step.map_or(true, |s| message.step == s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.short_name, self.level.as_str())?;
        if let Some(v) = self.level_value {
            write!(f, "={}", v)?;
        }
        if let Some(step) = self.step {
            write!(f, " ({:?})", step)?;
        }
        Ok(())
    }
}

/// Decoded values of one message on its grid, in scan order
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    /// Latitude of every point
    pub lats: Vec<f64>,
    /// Longitude of every point
    pub lons: Vec<f64>,
    pub values: Vec<f32>,
}

impl Grid {
    /// Build a grid from per-point coordinates, inferring the row length from
    /// the run of points sharing the first latitude.
    pub fn from_points(latlons: Vec<(f64, f64)>, values: Vec<f32>) -> Result<Self> {
        if latlons.len() != values.len() || values.is_empty() {
            return Err(SmnError::Grib(format!(
                "{} grid points for {} values",
                latlons.len(),
                values.len()
            )));
        }
        let first_lat = latlons[0].0;
        let cols = latlons
            .iter()
            .take_while(|(lat, _)| (lat - first_lat).abs() < 1e-6)
            .count();
        if values.len() % cols != 0 {
            return Err(SmnError::Grib(format!(
                "grid of {} points is not a regular latitude/longitude grid",
                values.len()
            )));
        }
        let (lats, lons) = latlons.into_iter().unzip();
        Ok(Self {
            rows: values.len() / cols,
            cols,
            lats,
            lons,
            values,
        })
    }

    /// Latitude of each row, in native order
    pub fn row_latitudes(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.lats[r * self.cols]).collect()
    }

    /// Longitude of each column, in native order
    pub fn column_longitudes(&self) -> Vec<f64> {
        self.lons[..self.cols].to_vec()
    }
}

/// A GRIB message reduced to the keys used for selection plus its data
#[derive(Debug, Clone, PartialEq)]
pub struct GribMessage {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub level: Option<LevelKind>,
    /// Level value in the unit of `level` (hPa for isobaric levels)
    pub level_value: f64,
    pub step: StepKind,
    pub grid: Grid,
}

/// Anything that can hand out decoded messages matching a selector
pub trait MessageSource {
    /// Where the messages come from, for diagnostics
    fn origin(&self) -> &Path;

    /// All messages matching `selector`, in file order
    fn select(&self, selector: &Selector) -> Result<Vec<GribMessage>>;

    /// Like [`MessageSource::select`] but a missing field is an error
    fn select_required(&self, selector: &Selector) -> Result<Vec<GribMessage>> {
        let found = self.select(selector)?;
        if found.is_empty() {
            return Err(SmnError::NoMatchingMessage {
                selector: selector.to_string(),
                path: self.origin().to_path_buf(),
            });
        }
        Ok(found)
    }
}

/// A GRIB2 file on disk, decoded with the `grib` crate
#[derive(Debug, Clone)]
pub struct GribFile {
    path: PathBuf,
}

impl GribFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(SmnError::InvalidPath {
                path,
                message: "GRIB file does not exist".to_string(),
            });
        }
        Ok(Self { path })
    }
}

impl MessageSource for GribFile {
    fn origin(&self) -> &Path {
        &self.path
    }

    fn select(&self, selector: &Selector) -> Result<Vec<GribMessage>> {
        let f = BufReader::new(File::open(&self.path)?);
        let grib2 = grib::from_reader(f)?;

        let mut found = Vec::new();
        for ((message_idx, submessage_idx), submsg) in grib2.iter() {
            let prod_def = submsg.prod_def();
            let (Some(category), Some(number)) =
                (prod_def.parameter_category(), prod_def.parameter_number())
            else {
                continue;
            };
            let (level, raw_level) = match prod_def.fixed_surfaces() {
                Some((first, _)) => (LevelKind::from_code(first.surface_type), first.value()),
                None => (None, f64::NAN),
            };
            let level_value = level.map_or(raw_level, |l| l.scale(raw_level));

            let mut message = GribMessage {
                discipline: submsg.indicator().discipline,
                category,
                number,
                level,
                level_value,
                step: StepKind::from_template(prod_def.prod_tmpl_num()),
                grid: Grid {
                    rows: 0,
                    cols: 0,
                    lats: Vec::new(),
                    lons: Vec::new(),
                    values: Vec::new(),
                },
            };
            if !selector.matches(&message) {
                continue;
            }

            tracing::debug!(
                message = message_idx,
                submessage = submessage_idx,
                %selector,
                level = level_value,
                "decoding GRIB submessage"
            );
            let context = |e: &dyn fmt::Display| {
                SmnError::Grib(format!("{} ({} in {}): {}", selector, message_idx, self.path.display(), e))
            };
            let latlons: Vec<(f64, f64)> = submsg
                .latlons()
                .map_err(|e| context(&e))?
                .map(|(lat, lon)| (f64::from(lat), f64::from(lon)))
                .collect();
            let decoder = grib::Grib2SubmessageDecoder::from(submsg).map_err(|e| context(&e))?;
            let values: Vec<f32> = decoder
                .dispatch()
                .map_err(|e| context(&e))?
                .collect();
            message.grid = Grid::from_points(latlons, values)?;
            found.push(message);
        }
        Ok(found)
    }
}

/// Messages already held in memory, e.g. decoded elsewhere or synthesised
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub origin: PathBuf,
    pub messages: Vec<GribMessage>,
}

impl MemorySource {
    pub fn new(origin: impl Into<PathBuf>, messages: Vec<GribMessage>) -> Self {
        Self {
            origin: origin.into(),
            messages,
        }
    }
}

impl MessageSource for MemorySource {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn select(&self, selector: &Selector) -> Result<Vec<GribMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| selector.matches(m))
            .cloned()
            .collect())
    }
}
