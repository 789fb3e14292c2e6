//! End-to-end downscaling run
//!
//! One call, one run, one owned set of rasters:
//!
//! fine reflectance → indices (fine) → aggregate → indices (coarse)
//! → fit against coarse LST → apply at fine resolution → raw fine LST
//! → add interpolated residual → final fine LST.
//!
//! The run is a pure function of its inputs and parameters: identical calls
//! produce identical output down to floating-point rounding. Independent
//! runs share nothing and may execute concurrently.

use thermoscale_core::raster::Raster;
use thermoscale_core::{Error, Result};

use crate::downscale::{apply_model, clamp_range};
use crate::indices::{compute_index, SpectralIndex};
use crate::regression::{collect_samples, fit, FitParams, RegressionModel};
use crate::resample::{aggregate, AggregateParams, CoverageReport, GridSpec};
use crate::residual::{apply_residual_correction, residual_field};
use crate::scene::Scene;

/// Configuration for one downscaling run
#[derive(Debug, Clone)]
pub struct DownscalingParams {
    /// Index families used as regression predictors, in slope order
    pub indices: Vec<SpectralIndex>,
    pub fit: FitParams,
    pub aggregation: AggregateParams,
    /// Optional explicit output clamp (min, max) in Kelvin. Off by default:
    /// extrapolated predictions are intentionally left unbounded.
    pub clamp: Option<(f64, f64)>,
}

impl Default for DownscalingParams {
    fn default() -> Self {
        Self {
            indices: SpectralIndex::all().to_vec(),
            fit: FitParams::default(),
            aggregation: AggregateParams::default(),
            clamp: None,
        }
    }
}

/// Result of a downscaling run, owned by the caller.
#[derive(Debug, Clone)]
pub struct DownscaledLst {
    /// Final fine-resolution LST, same grid/CRS as the fine scene
    pub lst: Raster<f64>,
    /// The per-scene model, for diagnostics display
    pub model: RegressionModel,
    /// Aggregation coverage accounting (warning-level annotation when
    /// degraded)
    pub coverage: CoverageReport,
    /// Output display range (min, max), when any pixel is valid
    pub lst_range: Option<(f64, f64)>,
}

/// Run the full downscaling pipeline.
///
/// `fine_scene` supplies the reflectance bands for the selected indices;
/// `coarse_lst` is the observed LST on the coarse grid (Kelvin). Fails fast
/// with a typed error from whichever stage detects the problem first.
pub fn downscale_lst(
    fine_scene: &Scene,
    coarse_lst: &Raster<f64>,
    params: &DownscalingParams,
) -> Result<DownscaledLst> {
    if params.indices.is_empty() {
        return Err(Error::InvalidParameter {
            name: "indices",
            value: "[]".to_string(),
            reason: "at least one index family must be selected".to_string(),
        });
    }

    // Indices at native fine resolution
    let fine_indices: Vec<Raster<f64>> = params
        .indices
        .iter()
        .map(|idx| compute_index(fine_scene, *idx))
        .collect::<Result<_>>()?;

    // Match the coarse LST grid
    let coarse_grid = GridSpec::from_raster(coarse_lst);
    let mut coarse_indices = Vec::with_capacity(fine_indices.len());
    let mut coverage: Option<CoverageReport> = None;
    for fine in &fine_indices {
        let (coarse, report) = aggregate(fine, &coarse_grid, &params.aggregation)?;
        coverage = Some(match coverage {
            Some(c) => c.merge(&report),
            None => report,
        });
        coarse_indices.push(coarse);
    }
    let coverage = coverage.expect("at least one index was aggregated");

    // Fit the per-scene model on paired coarse pixels
    let samples = collect_samples(&coarse_indices, coarse_lst)?;
    let model = fit(&samples, &params.indices, &params.fit)?;

    // First-pass estimate at fine resolution
    let raw_fine = apply_model(&model, &fine_indices)?;

    // Bias correction through the coarse residual
    let predicted_coarse = apply_model(&model, &coarse_indices)?;
    let residual = residual_field(coarse_lst, &predicted_coarse)?;
    let corrected = apply_residual_correction(&raw_fine, &residual)?;

    let lst = match params.clamp {
        Some((min, max)) => clamp_range(&corrected, min, max)?,
        None => corrected,
    };

    let stats = lst.statistics();
    let lst_range = match (stats.min, stats.max) {
        (Some(min), Some(max)) => Some((min, max)),
        _ => None,
    };

    Ok(DownscaledLst {
        lst,
        model,
        coverage,
        lst_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Sensor;
    use thermoscale_core::GeoTransform;

    fn fine_band(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0));
        r.set_nodata(Some(f64::NAN));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    }

    /// NDVI ramp whose 3x3 block means reproduce (lst - 300) / 10 on the
    /// coarse grid. The 0.8 scale keeps every fine value inside (-1, 1) so
    /// the index computation never clamps.
    fn ndvi_ramp(row: usize, col: usize) -> f64 {
        0.8 * (row as f64 / 8.0 + col as f64 / 24.0 - 1.0 / 6.0)
    }

    fn synthetic_scene() -> Scene {
        // nir/red chosen so (nir - red) / (nir + red) equals the ramp exactly
        let nir = fine_band(9, 9, |r, c| (1.0 + ndvi_ramp(r, c)) / 2.0);
        let red = fine_band(9, 9, |r, c| (1.0 - ndvi_ramp(r, c)) / 2.0);

        let mut scene = Scene::new(Sensor::Sentinel2);
        scene.add_band("B8", nir).unwrap();
        scene.add_band("B4", red).unwrap();
        scene
    }

    fn synthetic_coarse_lst() -> Raster<f64> {
        let mut lst = Raster::new(3, 3);
        lst.set_transform(GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        lst.set_nodata(Some(f64::NAN));
        for row in 0..3 {
            for col in 0..3 {
                lst.set(row, col, 300.0 + (row * 3 + col) as f64).unwrap();
            }
        }
        lst
    }

    fn test_params() -> DownscalingParams {
        DownscalingParams {
            indices: vec![SpectralIndex::Ndvi],
            fit: FitParams {
                min_samples: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_scene_recovers_generating_model() {
        let result = downscale_lst(&synthetic_scene(), &synthetic_coarse_lst(), &test_params())
            .unwrap();

        // lst = 300 + 10·ndvi generated the data; recovery within 1%
        assert!(
            (result.model.intercept() - 300.0).abs() < 3.0,
            "intercept {} too far from 300",
            result.model.intercept()
        );
        assert!(
            (result.model.slopes()[0] - 10.0).abs() < 0.1,
            "slope {} too far from 10",
            result.model.slopes()[0]
        );
        assert!(result.model.r_squared() > 0.99);
        assert_eq!(result.model.n_samples(), 9);
    }

    #[test]
    fn test_output_monotonic_along_gradient() {
        let result = downscale_lst(&synthetic_scene(), &synthetic_coarse_lst(), &test_params())
            .unwrap();

        // Ground truth increases along rows; so must the fine output
        for col in 0..9 {
            for row in 0..8 {
                let a = result.lst.get(row, col).unwrap();
                let b = result.lst.get(row + 1, col).unwrap();
                assert!(
                    b > a,
                    "not strictly increasing at ({}, {}): {} vs {}",
                    row,
                    col,
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_pipeline_deterministic() {
        let scene = synthetic_scene();
        let coarse = synthetic_coarse_lst();
        let a = downscale_lst(&scene, &coarse, &test_params()).unwrap();
        let b = downscale_lst(&scene, &coarse, &test_params()).unwrap();

        assert_eq!(a.model.intercept(), b.model.intercept());
        assert_eq!(a.model.slopes(), b.model.slopes());
        for row in 0..9 {
            for col in 0..9 {
                let va = a.lst.get(row, col).unwrap();
                let vb = b.lst.get(row, col).unwrap();
                assert!(va == vb || (va.is_nan() && vb.is_nan()));
            }
        }
    }

    #[test]
    fn test_empty_index_selection_rejected() {
        let params = DownscalingParams {
            indices: vec![],
            ..test_params()
        };
        let result = downscale_lst(&synthetic_scene(), &synthetic_coarse_lst(), &params);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_optional_clamp_bounds_output() {
        let params = DownscalingParams {
            clamp: Some((300.0, 305.0)),
            ..test_params()
        };
        let result =
            downscale_lst(&synthetic_scene(), &synthetic_coarse_lst(), &params).unwrap();

        let (min, max) = result.lst_range.unwrap();
        assert!(min >= 300.0 && max <= 305.0);
    }
}
