//! smn_tools: ETA/WRF GRIB forecast output to CF NetCDF
//!
//! Turns the GRIB files of a regional forecast run into two consolidated
//! NetCDF files, one for pressure-level variables and one for surface
//! variables, ready for plotting.
//!
//! ## Processing chain
//!
//! 1. [`extract`]: one small NetCDF file per variable and lead time, named
//!    `<stem>_<tag>.nc`, with the valid time derived from the run directory
//!    and file name ([`timing`]).
//! 2. [`rename_clean`]: every file of a variable gets the same dimension
//!    names (`time`, `lev`, `lat`, `lon`) and loses auxiliary coordinates.
//! 3. [`process`]: the files of a variable are concatenated along time into
//!    `<prefix>_tmp_<var>.nc`.
//! 4. [`merge`]: all processed files of a prefix become one file with
//!    institutional metadata.
//!
//! [`pipeline`] runs the whole chain for one run; [`clean`] and [`inspect`]
//! are small helpers around it.
//!
//! ## Module Organization
//!
//! - [`model`]: models, variable groups and their GRIB products
//! - [`grib`]: GRIB message selection behind the [`grib::MessageSource`] trait
//! - [`dataset`] and [`netcdf_io`]: in-memory datasets and their NetCDF form
//! - [`parallel`]: thread pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//! ```rust,no_run
//! use smn_tools::prelude::*;
//!
//! let config = RunConfig::new("/data/regional", "PERU_WRF22", "2025010106");
//! let summary = smn_tools::pipeline::run(&config).unwrap();
//! println!("{}", summary.to_json().unwrap());
//! ```

pub mod clean;
pub mod dataset;
pub mod errors;
pub mod extract;
pub mod grib;
pub mod inspect;
pub mod merge;
pub mod model;
pub mod netcdf_io;
pub mod parallel;
pub mod pipeline;
pub mod process;
pub mod rename_clean;
pub mod timing;

pub use errors::{Result, SmnError};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::dataset::{CoordValues, Coordinate, DataVariable, Dataset};
    pub use crate::errors::{Result, SmnError};
    pub use crate::extract::{extract, extract_file};
    pub use crate::grib::{GribFile, MemorySource, MessageSource};
    pub use crate::merge::{merge_files, MergeMetadata};
    pub use crate::model::{Model, VariableGroup};
    pub use crate::netcdf_io::{read_dataset, write_dataset, Encoding};
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{RunConfig, RunSummary};
    pub use crate::process::process_netcdf_files;
    pub use crate::rename_clean::rename_and_clean;
}
