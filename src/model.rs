//! Forecast models, variable groups and the GRIB products behind them

use crate::errors::{Result, SmnError};
use crate::grib::{LevelKind, Selector, StepKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pressure levels (hPa) kept for upper-air variables
pub const PRESSURE_LEVELS: [f64; 4] = [925.0, 850.0, 500.0, 200.0];

/// Regional model that produced a GRIB file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "ETA")]
    Eta,
    #[serde(rename = "WRF")]
    Wrf,
}

impl Model {
    /// Recognise the model from a run name such as `PERU_WRF22`.
    pub fn from_run_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        if upper.contains("ETA") {
            Some(Model::Eta)
        } else if upper.contains("WRF") {
            Some(Model::Wrf)
        } else {
            None
        }
    }

    /// File name prefix of the model's GRIB output
    pub fn grib_prefix(&self) -> &'static str {
        match self {
            Model::Eta => "latlon_",
            Model::Wrf => "WRFPRS_",
        }
    }

    /// WRF output is put back onto unique, sorted latitude/longitude axes
    pub fn restructures_grid(&self) -> bool {
        matches!(self, Model::Wrf)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Eta => write!(f, "ETA"),
            Model::Wrf => write!(f, "WRF"),
        }
    }
}

impl FromStr for Model {
    type Err = SmnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ETA" => Ok(Model::Eta),
            "WRF" => Ok(Model::Wrf),
            other => Err(SmnError::InvalidConfig(format!(
                "unknown model '{}', expected ETA or WRF",
                other
            ))),
        }
    }
}

/// Group of variables requested together on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableGroup {
    Precipitation,
    LevelVars,
    Mslp,
    Wind10m,
    T2m,
    D2m,
    R2m,
    Ssrd,
}

impl VariableGroup {
    pub fn keyword(&self) -> &'static str {
        match self {
            VariableGroup::Precipitation => "tp",
            VariableGroup::LevelVars => "level_vars",
            VariableGroup::Mslp => "mslp",
            VariableGroup::Wind10m => "wind10m",
            VariableGroup::T2m => "t2m",
            VariableGroup::D2m => "d2m",
            VariableGroup::R2m => "r2m",
            VariableGroup::Ssrd => "ssrd",
        }
    }

    /// Pressure-level groups go to the `prs` file, the rest to `sfc`
    pub fn is_pressure_level(&self) -> bool {
        matches!(self, VariableGroup::LevelVars)
    }

    /// Parse keywords, warning about and skipping unknown ones.
    pub fn parse_list<S: AsRef<str>>(keywords: &[S]) -> Vec<VariableGroup> {
        let mut groups = Vec::new();
        for keyword in keywords {
            match keyword.as_ref().parse::<VariableGroup>() {
                Ok(g) if !groups.contains(&g) => groups.push(g),
                Ok(_) => {}
                Err(_) => tracing::warn!(keyword = keyword.as_ref(), "unrecognised variable group"),
            }
        }
        groups
    }

    /// Products written for this group by the given model
    pub fn products(&self, model: Model) -> Vec<Product> {
        PRODUCTS
            .iter()
            .filter(|p| p.group == *self && p.models.contains(&model))
            .cloned()
            .collect()
    }
}

impl fmt::Display for VariableGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for VariableGroup {
    type Err = SmnError;

    fn from_str(s: &str) -> Result<Self> {
        // "pr" is the older name of the precipitation group
        match s {
            "tp" | "pr" => Ok(VariableGroup::Precipitation),
            "level_vars" | "level_wind" => Ok(VariableGroup::LevelVars),
            "mslp" => Ok(VariableGroup::Mslp),
            "wind10m" => Ok(VariableGroup::Wind10m),
            "t2m" => Ok(VariableGroup::T2m),
            "d2m" => Ok(VariableGroup::D2m),
            "r2m" => Ok(VariableGroup::R2m),
            "ssrd" => Ok(VariableGroup::Ssrd),
            other => Err(SmnError::InvalidConfig(format!(
                "unknown variable group '{}'",
                other
            ))),
        }
    }
}

/// One extracted field: which messages to read and how to name the output
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub group: VariableGroup,
    pub models: &'static [Model],
    /// Prefix of the per-lead-time file, `<stem>_<tag>.nc`
    pub stem: &'static str,
    /// Variable name inside the file
    pub var_name: &'static str,
    pub long_name: &'static str,
    pub units: &'static str,
    pub selector: Selector,
}

impl Product {
    pub fn is_pressure_level(&self) -> bool {
        self.selector.level == LevelKind::IsobaricInhPa
    }

    /// `GRIB_stepType` attribute for a message of this product. Solar
    /// radiation is a time mean, other statistical fields are accumulations.
    pub fn step_type(&self, step: StepKind) -> &'static str {
        match (step, self.group) {
            (StepKind::Instant, _) => "instant",
            (StepKind::Statistical, VariableGroup::Ssrd) => "avg",
            (StepKind::Statistical, _) => "accum",
        }
    }
}

const BOTH: &[Model] = &[Model::Eta, Model::Wrf];
const ETA_ONLY: &[Model] = &[Model::Eta];
const WRF_ONLY: &[Model] = &[Model::Wrf];

const fn selector(
    short_name: &'static str,
    category: u8,
    number: u8,
    level: LevelKind,
    level_value: Option<f64>,
    step: Option<StepKind>,
) -> Selector {
    Selector {
        short_name,
        discipline: 0,
        category,
        number,
        level,
        level_value,
        step,
    }
}

const PRODUCTS: &[Product] = &[
    Product {
        group: VariableGroup::Precipitation,
        models: BOTH,
        stem: "tp",
        var_name: "tp",
        long_name: "Total Precipitation",
        units: "kg m**-2",
        selector: selector("tp", 1, 8, LevelKind::Surface, None, None),
    },
    Product {
        group: VariableGroup::LevelVars,
        models: BOTH,
        stem: "u",
        var_name: "u",
        long_name: "U component of wind",
        units: "m s**-1",
        selector: selector("u", 2, 2, LevelKind::IsobaricInhPa, None, None),
    },
    Product {
        group: VariableGroup::LevelVars,
        models: BOTH,
        stem: "v",
        var_name: "v",
        long_name: "V component of wind",
        units: "m s**-1",
        selector: selector("v", 2, 3, LevelKind::IsobaricInhPa, None, None),
    },
    Product {
        group: VariableGroup::Mslp,
        models: BOTH,
        stem: "mslp",
        var_name: "mslet",
        long_name: "MSLP (Eta model reduction)",
        units: "Pa",
        selector: selector("mslet", 3, 192, LevelKind::MeanSea, None, None),
    },
    Product {
        group: VariableGroup::Wind10m,
        models: ETA_ONLY,
        stem: "10u",
        var_name: "u10",
        long_name: "10 metre U wind component",
        units: "m s**-1",
        selector: selector(
            "10u",
            2,
            2,
            LevelKind::HeightAboveGround,
            Some(10.0),
            Some(StepKind::Instant),
        ),
    },
    Product {
        group: VariableGroup::Wind10m,
        models: ETA_ONLY,
        stem: "10v",
        var_name: "v10",
        long_name: "10 metre V wind component",
        units: "m s**-1",
        selector: selector(
            "10v",
            2,
            3,
            LevelKind::HeightAboveGround,
            Some(10.0),
            Some(StepKind::Instant),
        ),
    },
    Product {
        group: VariableGroup::Wind10m,
        models: WRF_ONLY,
        stem: "10u",
        var_name: "u10",
        long_name: "10 metre U wind component",
        units: "m s**-1",
        selector: selector("10u", 2, 2, LevelKind::HeightAboveGround, Some(10.0), None),
    },
    Product {
        group: VariableGroup::Wind10m,
        models: WRF_ONLY,
        stem: "10v",
        var_name: "v10",
        long_name: "10 metre V wind component",
        units: "m s**-1",
        selector: selector("10v", 2, 3, LevelKind::HeightAboveGround, Some(10.0), None),
    },
    Product {
        group: VariableGroup::T2m,
        models: BOTH,
        stem: "t2m",
        var_name: "t2m",
        long_name: "2 metre temperature",
        units: "K",
        selector: selector("2t", 0, 0, LevelKind::HeightAboveGround, Some(2.0), None),
    },
    Product {
        group: VariableGroup::D2m,
        models: WRF_ONLY,
        stem: "d2m",
        var_name: "d2m",
        long_name: "2 metre dewpoint temperature",
        units: "K",
        selector: selector("2d", 0, 6, LevelKind::HeightAboveGround, Some(2.0), None),
    },
    Product {
        group: VariableGroup::R2m,
        models: BOTH,
        stem: "r2m",
        var_name: "r2m",
        long_name: "2 metre relative humidity",
        units: "%",
        selector: selector("2r", 1, 1, LevelKind::HeightAboveGround, Some(2.0), None),
    },
    Product {
        group: VariableGroup::Ssrd,
        models: ETA_ONLY,
        stem: "ssrd",
        var_name: "avg_sdswrf",
        long_name: "Time-mean surface downward short-wave radiation flux",
        units: "W m**-2",
        selector: selector(
            "avg_sdswrf",
            4,
            7,
            LevelKind::Surface,
            None,
            Some(StepKind::Statistical),
        ),
    },
];

/// Stems of the per-variable files processed into the `prs` or `sfc` set.
///
/// The pressure set is always u and v; the surface set follows the requested
/// groups, with `wind10m` expanding to its two components.
pub fn processed_stems(groups: &[VariableGroup], pressure: bool) -> Vec<&'static str> {
    if pressure {
        return vec!["u", "v"];
    }
    let mut stems = Vec::new();
    for group in groups.iter().filter(|g| !g.is_pressure_level()) {
        match group {
            VariableGroup::Wind10m => stems.extend(["10u", "10v"]),
            other => stems.push(other.keyword()),
        }
    }
    stems
}
