//! Residual correction
//!
//! The regression explains the index-correlated part of the LST field; what
//! it misses at coarse resolution (terrain shading, moisture anomalies,
//! anything not captured by the indices) is carried by the residual field.
//! Computing it at coarse resolution, interpolating it smoothly to fine
//! resolution and adding it back removes the systematic bias while keeping
//! the fine-scale contrast that came from the indices.

use thermoscale_core::raster::Raster;
use thermoscale_core::Result;

use crate::resample::{disaggregate, GridSpec};

/// Observed minus predicted LST at coarse resolution.
///
/// Nodata wherever either operand is nodata.
pub fn residual_field(
    observed_lst: &Raster<f64>,
    predicted_lst: &Raster<f64>,
) -> Result<Raster<f64>> {
    observed_lst.check_aligned(predicted_lst)?;

    let mut residual = observed_lst.like(f64::NAN);
    residual.set_nodata(Some(f64::NAN));

    let (rows, cols) = observed_lst.shape();
    for row in 0..rows {
        for col in 0..cols {
            let obs = unsafe { observed_lst.get_unchecked(row, col) };
            let pred = unsafe { predicted_lst.get_unchecked(row, col) };
            if observed_lst.is_nodata(obs) || predicted_lst.is_nodata(pred) {
                continue;
            }
            residual.set(row, col, obs - pred)?;
        }
    }

    Ok(residual)
}

/// Add the bilinearly-disaggregated coarse residual to the raw fine
/// prediction, producing the bias-corrected fine LST.
///
/// A fine pixel stays nodata if the raw prediction is nodata there; a
/// missing residual (all coarse neighbors nodata) leaves the raw prediction
/// uncorrected rather than deleting data the model produced.
pub fn apply_residual_correction(
    raw_fine_lst: &Raster<f64>,
    coarse_residual: &Raster<f64>,
) -> Result<Raster<f64>> {
    let fine_grid = GridSpec::from_raster(raw_fine_lst);
    let fine_residual = disaggregate(coarse_residual, &fine_grid)?;

    let mut corrected = raw_fine_lst.clone();
    corrected.set_nodata(Some(f64::NAN));

    let (rows, cols) = corrected.shape();
    for row in 0..rows {
        for col in 0..cols {
            let raw = unsafe { raw_fine_lst.get_unchecked(row, col) };
            if raw_fine_lst.is_nodata(raw) {
                corrected.set(row, col, f64::NAN)?;
                continue;
            }
            let res = unsafe { fine_residual.get_unchecked(row, col) };
            if !fine_residual.is_nodata(res) {
                corrected.set(row, col, raw + res)?;
            }
        }
    }

    Ok(corrected)
}
