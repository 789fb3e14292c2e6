//! Per-scene regression between coarse LST and coarse-resampled indices
//!
//! Ordinary least squares on paired coarse pixels, `lst = a + Σ bᵢ·indexᵢ`,
//! solved through the normal equations with partial pivoting. Outliers are
//! removed by iterative sigma clipping with an explicit iteration bound, so
//! fitting is deterministic and always terminates. The fitted model is an
//! immutable value object; nothing here is persisted or shared between runs.

use serde::Serialize;
use std::collections::BTreeMap;

use thermoscale_core::raster::Raster;
use thermoscale_core::{Error, Result};

use crate::indices::SpectralIndex;

/// One paired observation at a coarse pixel: predictor values and LST
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Index values, one per selected predictor, in predictor order
    pub predictors: Vec<f64>,
    /// Observed LST (Kelvin)
    pub lst: f64,
}

impl Sample {
    pub fn new(predictors: Vec<f64>, lst: f64) -> Self {
        Self { predictors, lst }
    }
}

/// Parameters controlling the fit
#[derive(Debug, Clone)]
pub struct FitParams {
    /// Minimum valid sample count after cleaning
    pub min_samples: usize,
    /// Sigma-clipping threshold in standard deviations
    pub outlier_sigma: f64,
    /// Upper bound on sigma-clipping iterations
    pub max_outlier_iterations: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_samples: 30,
            outlier_sigma: 3.0,
            max_outlier_iterations: 10,
        }
    }
}

/// A fitted per-scene regression model.
///
/// Immutable after fitting; recomputed for every downscaling request.
#[derive(Debug, Clone)]
pub struct RegressionModel {
    intercept: f64,
    slopes: Vec<f64>,
    indices: Vec<SpectralIndex>,
    n_samples: usize,
    r_squared: f64,
    clipping_iterations: usize,
}

impl RegressionModel {
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    /// Index families the model was fit against, in slope order
    pub fn indices(&self) -> &[SpectralIndex] {
        &self.indices
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Coefficient of determination of the final fit
    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Sigma-clipping iterations actually run
    pub fn clipping_iterations(&self) -> usize {
        self.clipping_iterations
    }

    /// Predict LST from one pixel's predictor values
    #[inline]
    pub fn predict(&self, predictors: &[f64]) -> f64 {
        debug_assert_eq!(predictors.len(), self.slopes.len());
        let mut lst = self.intercept;
        for (slope, value) in self.slopes.iter().zip(predictors) {
            lst += slope * value;
        }
        lst
    }

    /// Serializable summary for the display layer
    pub fn summary(&self) -> RegressionSummary {
        let coefficients = self
            .indices
            .iter()
            .zip(&self.slopes)
            .map(|(idx, slope)| (idx.name().to_string(), *slope))
            .collect();
        RegressionSummary {
            intercept: self.intercept,
            coefficients,
            n_samples: self.n_samples,
            r_squared: self.r_squared,
        }
    }
}

/// Model summary handed to diagnostics/visualization
#[derive(Debug, Clone, Serialize)]
pub struct RegressionSummary {
    pub intercept: f64,
    /// Slope per index family, keyed by index name
    pub coefficients: BTreeMap<String, f64>,
    pub n_samples: usize,
    pub r_squared: f64,
}

/// Collect paired samples from aligned coarse rasters.
///
/// A coarse pixel contributes one sample only when the LST and every
/// predictor are valid there.
pub fn collect_samples(
    predictors: &[Raster<f64>],
    lst: &Raster<f64>,
) -> Result<Vec<Sample>> {
    if predictors.is_empty() {
        return Err(Error::InvalidParameter {
            name: "predictors",
            value: "[]".to_string(),
            reason: "at least one predictor raster is required".to_string(),
        });
    }
    for p in predictors {
        lst.check_aligned(p)?;
    }

    let (rows, cols) = lst.shape();
    let mut samples = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            let t = unsafe { lst.get_unchecked(row, col) };
            if lst.is_nodata(t) {
                continue;
            }

            let mut values = Vec::with_capacity(predictors.len());
            let mut all_valid = true;
            for p in predictors {
                let v = unsafe { p.get_unchecked(row, col) };
                if p.is_nodata(v) {
                    all_valid = false;
                    break;
                }
                values.push(v);
            }

            if all_valid {
                samples.push(Sample::new(values, t));
            }
        }
    }

    Ok(samples)
}

/// Fit OLS coefficients for `lst = a + Σ bᵢ·indexᵢ`.
///
/// Outliers beyond `params.outlier_sigma` standard deviations from the mean
/// of any column (LST or a predictor) are discarded; clipping repeats to a
/// fixed point or `params.max_outlier_iterations`.
///
/// # Errors
/// - [`Error::InsufficientData`] when fewer than `params.min_samples` valid
///   samples survive cleaning
/// - [`Error::DegenerateFit`] when a predictor column has near-zero variance
///   or the normal equations are singular
pub fn fit(
    samples: &[Sample],
    indices: &[SpectralIndex],
    params: &FitParams,
) -> Result<RegressionModel> {
    let k = indices.len();
    if k == 0 {
        return Err(Error::InvalidParameter {
            name: "indices",
            value: "[]".to_string(),
            reason: "at least one index family must be selected".to_string(),
        });
    }
    if params.outlier_sigma <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "outlier_sigma",
            value: params.outlier_sigma.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    for s in samples {
        if s.predictors.len() != k {
            return Err(Error::InvalidParameter {
                name: "samples",
                value: s.predictors.len().to_string(),
                reason: format!("expected {} predictor values per sample", k),
            });
        }
    }

    // Drop anything non-finite up front
    let mut kept: Vec<&Sample> = samples
        .iter()
        .filter(|s| s.lst.is_finite() && s.predictors.iter().all(|v| v.is_finite()))
        .collect();

    // Iterative sigma clipping on every column, to a fixed point
    let mut iterations = 0;
    for _ in 0..params.max_outlier_iterations {
        if kept.len() < 2 {
            break;
        }
        let before = kept.len();

        let lst_stats = column_stats(kept.iter().map(|s| s.lst));
        let pred_stats: Vec<(f64, f64)> = (0..k)
            .map(|i| column_stats(kept.iter().map(|s| s.predictors[i])))
            .collect();

        kept.retain(|s| {
            if !within_sigma(s.lst, lst_stats, params.outlier_sigma) {
                return false;
            }
            s.predictors
                .iter()
                .zip(&pred_stats)
                .all(|(v, &st)| within_sigma(*v, st, params.outlier_sigma))
        });

        iterations += 1;
        if kept.len() == before {
            break;
        }
    }

    let n = kept.len();
    if n < params.min_samples {
        return Err(Error::InsufficientData {
            required: params.min_samples,
            actual: n,
        });
    }

    for (i, idx) in indices.iter().enumerate() {
        let (_, std) = column_stats(kept.iter().map(|s| s.predictors[i]));
        if std < 1e-9 {
            return Err(Error::DegenerateFit(format!(
                "predictor {} has near-zero variance, slope undefined",
                idx
            )));
        }
    }

    let (intercept, slopes) = solve_normal_equations(&kept, k)?;

    // Coefficient of determination
    let mean_lst = kept.iter().map(|s| s.lst).sum::<f64>() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for s in &kept {
        let mut pred = intercept;
        for (b, v) in slopes.iter().zip(&s.predictors) {
            pred += b * v;
        }
        ss_res += (s.lst - pred) * (s.lst - pred);
        ss_tot += (s.lst - mean_lst) * (s.lst - mean_lst);
    }
    let r_squared = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).max(0.0)
    } else {
        1.0
    };

    Ok(RegressionModel {
        intercept,
        slopes,
        indices: indices.to_vec(),
        n_samples: n,
        r_squared,
        clipping_iterations: iterations,
    })
}

fn column_stats(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values.clone() {
        sum += v;
        count += 1;
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    (mean, var.sqrt())
}

#[inline]
fn within_sigma(value: f64, (mean, std): (f64, f64), sigma: f64) -> bool {
    // Zero spread keeps everything; clipping on a constant column is a no-op
    std < 1e-300 || (value - mean).abs() <= sigma * std
}

/// Solve (XᵀX)β = Xᵀy for the design matrix with a leading ones column.
/// Gaussian elimination with partial pivoting on the (k+1)×(k+1) system.
fn solve_normal_equations(samples: &[&Sample], k: usize) -> Result<(f64, Vec<f64>)> {
    let dim = k + 1;
    let mut mat = vec![0.0_f64; dim * dim];
    let mut rhs = vec![0.0_f64; dim];

    // Row vector per sample: [1, x₁, .., x_k]
    for s in samples {
        let mut x = Vec::with_capacity(dim);
        x.push(1.0);
        x.extend_from_slice(&s.predictors);
        for i in 0..dim {
            for j in 0..dim {
                mat[i * dim + j] += x[i] * x[j];
            }
            rhs[i] += x[i] * s.lst;
        }
    }

    for col in 0..dim {
        let mut max_val = mat[col * dim + col].abs();
        let mut max_row = col;
        for row in (col + 1)..dim {
            let val = mat[row * dim + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < 1e-12 {
            return Err(Error::DegenerateFit(
                "singular normal equations (collinear predictors?)".into(),
            ));
        }

        if max_row != col {
            for j in 0..dim {
                mat.swap(col * dim + j, max_row * dim + j);
            }
            rhs.swap(col, max_row);
        }

        let pivot = mat[col * dim + col];
        for row in (col + 1)..dim {
            let factor = mat[row * dim + col] / pivot;
            mat[row * dim + col] = 0.0;
            for j in (col + 1)..dim {
                mat[row * dim + j] -= factor * mat[col * dim + j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut beta = vec![0.0_f64; dim];
    for col in (0..dim).rev() {
        let mut sum = rhs[col];
        for j in (col + 1)..dim {
            sum -= mat[col * dim + j] * beta[j];
        }
        beta[col] = sum / mat[col * dim + col];
    }

    let intercept = beta[0];
    let slopes = beta[1..].to_vec();
    Ok((intercept, slopes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_samples(n: usize, intercept: f64, slope: f64) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let x = i as f64 / (n - 1) as f64; // 0..1
                Sample::new(vec![x], intercept + slope * x)
            })
            .collect()
    }

    fn relaxed_params() -> FitParams {
        FitParams {
            min_samples: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_recovers_line() {
        let samples = linear_samples(40, 300.0, 8.0);
        let model = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();

        assert!((model.intercept() - 300.0).abs() < 1e-9);
        assert!((model.slopes()[0] - 8.0).abs() < 1e-9);
        assert!((model.r_squared() - 1.0).abs() < 1e-12);
        assert_eq!(model.n_samples(), 40);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let mut samples = linear_samples(60, 295.0, -6.0);
        // Perturb deterministically so the fit is not exact
        for (i, s) in samples.iter_mut().enumerate() {
            s.lst += ((i * 7919) % 13) as f64 * 0.01;
        }

        let a = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();
        let b = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();
        assert_eq!(a.intercept(), b.intercept());
        assert_eq!(a.slopes(), b.slopes());
        assert_eq!(a.r_squared(), b.r_squared());
    }

    #[test]
    fn test_insufficient_samples() {
        let samples = linear_samples(10, 300.0, 5.0);
        let result = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default());
        assert!(matches!(
            result,
            Err(Error::InsufficientData {
                required: 30,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_degenerate_predictor() {
        let samples: Vec<Sample> = (0..40)
            .map(|i| Sample::new(vec![0.42], 300.0 + i as f64 * 0.1))
            .collect();
        let result = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default());
        assert!(matches!(result, Err(Error::DegenerateFit(_))));
    }

    #[test]
    fn test_outlier_rejected_bounded_slope_change() {
        let clean = linear_samples(50, 300.0, 8.0);
        let clean_model = fit(&clean, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();

        let mut poisoned = clean.clone();
        poisoned.push(Sample::new(vec![0.5], 1000.0));
        let model = fit(&poisoned, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();

        // The 1000 K sample must be clipped out, leaving the slope nearly unchanged
        assert_eq!(model.n_samples(), 50);
        assert!((model.slopes()[0] - clean_model.slopes()[0]).abs() < 0.1);
        assert!(model.clipping_iterations() >= 1);
    }

    #[test]
    fn test_multivariate_fit() {
        // lst = 290 + 10·ndvi - 4·ndbi on a small grid of predictor combos
        let mut samples = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                let ndvi = i as f64 / 7.0;
                let ndbi = j as f64 / 7.0 - 0.5;
                samples.push(Sample::new(vec![ndvi, ndbi], 290.0 + 10.0 * ndvi - 4.0 * ndbi));
            }
        }

        let model = fit(
            &samples,
            &[SpectralIndex::Ndvi, SpectralIndex::Ndbi],
            &FitParams::default(),
        )
        .unwrap();

        assert!((model.intercept() - 290.0).abs() < 1e-9);
        assert!((model.slopes()[0] - 10.0).abs() < 1e-9);
        assert!((model.slopes()[1] + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_predictors_degenerate() {
        let samples: Vec<Sample> = (0..40)
            .map(|i| {
                let x = i as f64 / 39.0;
                Sample::new(vec![x, 2.0 * x], 300.0 + x)
            })
            .collect();
        let result = fit(
            &samples,
            &[SpectralIndex::Ndvi, SpectralIndex::Ndbi],
            &FitParams::default(),
        );
        assert!(matches!(result, Err(Error::DegenerateFit(_))));
    }

    #[test]
    fn test_clipping_terminates_at_bound() {
        let samples = linear_samples(40, 300.0, 8.0);
        let params = FitParams {
            max_outlier_iterations: 3,
            ..relaxed_params()
        };
        let model = fit(&samples, &[SpectralIndex::Ndvi], &params).unwrap();
        assert!(model.clipping_iterations() <= 3);
    }

    #[test]
    fn test_collect_samples_skips_nodata_pairs() {
        let mut index = Raster::filled(3, 3, 0.5);
        index.set_nodata(Some(f64::NAN));
        let mut lst = Raster::filled(3, 3, 300.0);
        lst.set_nodata(Some(f64::NAN));

        index.set(0, 0, f64::NAN).unwrap();
        lst.set(2, 2, f64::NAN).unwrap();

        let samples = collect_samples(&[index], &lst).unwrap();
        assert_eq!(samples.len(), 7);
    }

    #[test]
    fn test_summary_serializes() {
        let samples = linear_samples(40, 300.0, 8.0);
        let model = fit(&samples, &[SpectralIndex::Ndvi], &FitParams::default()).unwrap();
        let summary = model.summary();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["n_samples"], 40);
        assert!(json["coefficients"]["NDVI"].is_number());
    }
}
