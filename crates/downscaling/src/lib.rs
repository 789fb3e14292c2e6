//! # ThermoScale Downscaling
//!
//! Statistical downscaling of Land Surface Temperature: fuses a coarse
//! (30 m) thermal-derived LST product with fine (10 m) spectral indices
//! correlated with surface temperature.
//!
//! ## Pipeline stages
//!
//! - **indices**: normalized-difference indices (NDVI, NDBI, NDWI) from
//!   reflectance bands
//! - **resample**: area-weighted aggregation to the coarse grid and
//!   bilinear disaggregation back to the fine grid
//! - **regression**: per-scene OLS fit of LST against coarse-resampled
//!   indices, with sigma-clipping outlier rejection
//! - **downscale**: pixel-wise model application at fine resolution
//! - **residual**: coarse residual field, interpolated and added back
//! - **pipeline**: the whole run as one deterministic, fail-fast call
//!
//! Everything operates on immutable [`thermoscale_core::Raster`] values;
//! independent runs share no state.

pub mod downscale;
pub mod indices;
mod maybe_rayon;
pub mod pipeline;
pub mod regression;
pub mod resample;
pub mod residual;
pub mod scene;
pub mod sensors;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::downscale::{apply_model, clamp_range};
    pub use crate::indices::{
        compute_index, ndbi, ndvi, ndwi, normalized_difference, SpectralIndex,
    };
    pub use crate::pipeline::{downscale_lst, DownscaledLst, DownscalingParams};
    pub use crate::regression::{
        collect_samples, fit, FitParams, RegressionModel, RegressionSummary, Sample,
    };
    pub use crate::resample::{
        aggregate, disaggregate, AggregateParams, CoverageReport, GridSpec,
    };
    pub use crate::residual::{apply_residual_correction, residual_field};
    pub use crate::scene::{GeoTiffSceneSource, Scene, SceneSource, SceneSpec};
    pub use crate::sensors::{BandKind, Sensor};
    pub use thermoscale_core::prelude::*;
}
