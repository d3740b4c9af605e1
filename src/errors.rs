//! Centralized error handling for SMN tools
//!
//! Every stage of the pipeline (GRIB selection, NetCDF I/O, renaming,
//! concatenation, merging) reports failures through [`SmnError`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for SMN tools operations
#[derive(Debug, Error)]
pub enum SmnError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// GRIB decoding errors reported by the grib crate
    #[error("GRIB error: {0}")]
    Grib(String),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run configuration (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Variable or coordinate not found in a dataset
    #[error("Variable '{var}' not found in {context}")]
    VariableNotFound { var: String, context: String },

    /// Input and requested dimension lists differ in length
    #[error("Dimension count mismatch: input {input:?}, output {output:?}")]
    DimensionMismatch {
        input: Vec<String>,
        output: Vec<String>,
    },

    /// No GRIB message matched a selector
    #[error("No GRIB message matches {selector} in {}", path.display())]
    NoMatchingMessage { selector: String, path: PathBuf },

    /// A path does not follow the expected naming convention
    #[error("Invalid path {}: {message}", path.display())]
    InvalidPath { path: PathBuf, message: String },

    /// A timestamp or CF time unit could not be parsed
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Datasets cannot be concatenated
    #[error("Concatenation error: {0}")]
    Concat(String),

    /// Datasets cannot be merged
    #[error("Merge error: {0}")]
    Merge(String),

    /// Invalid run configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl From<grib::GribError> for SmnError {
    fn from(error: grib::GribError) -> Self {
        SmnError::Grib(error.to_string())
    }
}

/// Result type alias for SMN tools operations
pub type Result<T> = std::result::Result<T, SmnError>;
