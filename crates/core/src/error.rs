//! Error types for ThermoScale
//!
//! All failures in the downscaling pipeline are typed and detected as close
//! to their origin as possible. Nothing in the core retries or downgrades an
//! error to a default value.

use thiserror::Error;

/// Main error type for ThermoScale operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Raster alignment error: {0}")]
    Alignment(String),

    #[error("Insufficient valid samples: {actual} after cleaning, {required} required")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate regression fit: {0}")]
    DegenerateFit(String),

    #[error("Aggregation coverage too low: {valid_fraction:.3} of coarse cells valid (minimum {required:.3})")]
    Coverage { valid_fraction: f64, required: f64 },

    #[error("Scene is missing band '{band}' for sensor {sensor}")]
    MissingBand { band: String, sensor: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for ThermoScale operations
pub type Result<T> = std::result::Result<T, Error>;
