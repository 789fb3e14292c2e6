//! Pixel-wise application of a fitted model at fine resolution

use ndarray::Array2;

use thermoscale_core::raster::Raster;
use thermoscale_core::{Error, Result};

use crate::maybe_rayon::*;
use crate::regression::RegressionModel;

/// Apply a fitted model to fine-resolution index rasters, producing the raw
/// fine-resolution LST estimate.
///
/// `fine_indices` must be ordered as the model's predictors and mutually
/// aligned. A fine pixel where any index is nodata is nodata in the output.
/// Predictions are NOT clamped to the coarse LST's observed range: index
/// values outside the fitted domain extrapolate, and overshoot there is the
/// documented behavior (an optional clamp lives in the pipeline parameters).
pub fn apply_model(
    model: &RegressionModel,
    fine_indices: &[Raster<f64>],
) -> Result<Raster<f64>> {
    if fine_indices.len() != model.slopes().len() {
        return Err(Error::InvalidParameter {
            name: "fine_indices",
            value: fine_indices.len().to_string(),
            reason: format!("model was fit on {} predictors", model.slopes().len()),
        });
    }
    let first = &fine_indices[0];
    for other in &fine_indices[1..] {
        first.check_aligned(other)?;
    }

    let (rows, cols) = first.shape();
    let nodata: Vec<Option<f64>> = fine_indices.iter().map(|r| r.nodata()).collect();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values = vec![0.0_f64; fine_indices.len()];
            'pixel: for col in 0..cols {
                for (i, raster) in fine_indices.iter().enumerate() {
                    let v = unsafe { raster.get_unchecked(row, col) };
                    if v.is_nan() || nodata[i].is_some_and(|nd| (v - nd).abs() < f64::EPSILON) {
                        continue 'pixel;
                    }
                    values[i] = v;
                }
                row_data[col] = model.predict(&values);
            }
            row_data
        })
        .collect();

    let mut output = first.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Clamp a LST raster to an explicit range, leaving nodata untouched.
///
/// Opt-in post-processing for callers that prefer bounded output over the
/// default extrapolation behavior.
pub fn clamp_range(lst: &Raster<f64>, min: f64, max: f64) -> Result<Raster<f64>> {
    if min > max {
        return Err(Error::InvalidParameter {
            name: "clamp",
            value: format!("({}, {})", min, max),
            reason: "min must not exceed max".to_string(),
        });
    }
    let mut out = lst.clone();
    for v in out.data_mut().iter_mut() {
        if !lst.is_nodata(*v) {
            *v = v.clamp(min, max);
        }
    }
    Ok(out)
}
