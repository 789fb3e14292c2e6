//! # ThermoScale Core
//!
//! Core types and I/O for the ThermoScale LST downscaling library.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine georeferencing for north-up grids
//! - `Crs`: Coordinate Reference System handling
//! - Typed pipeline errors
//! - Native single-band GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterStatistics};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
