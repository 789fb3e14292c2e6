//! Resolution matching between the coarse LST grid and the fine index grid
//!
//! Two directions:
//! - [`aggregate`]: area-weighted mean of fine pixels onto a coarse grid,
//!   with per-cell coverage accounting so mostly-missing cells never
//!   masquerade as data.
//! - [`disaggregate`]: bilinear interpolation of a coarse raster onto a fine
//!   grid, used for the residual field. Bilinear (not nearest) keeps the
//!   residual surface smooth across coarse cell edges.
//!
//! Grids are expected to be nested (30 m on 10 m); aggregation still works
//! for non-nested grids by assigning each fine pixel center to the coarse
//! cell containing it, which is the documented bilinear-free fallback.
//! Mismatched CRS is an error, never silently resampled across projections.

use thermoscale_core::raster::{GeoTransform, Raster, RasterElement};
use thermoscale_core::{Crs, Error, Result};

use crate::maybe_rayon::*;

/// Target grid for a resampling operation
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Self {
            rows,
            cols,
            transform,
            crs: None,
        }
    }

    /// Grid of an existing raster
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        let (rows, cols) = raster.shape();
        Self {
            rows,
            cols,
            transform: *raster.transform(),
            crs: raster.crs().cloned(),
        }
    }

    fn check_crs<T: RasterElement>(&self, raster: &Raster<T>) -> Result<()> {
        if let (Some(a), Some(b)) = (&self.crs, raster.crs()) {
            if !a.is_equivalent(b) {
                return Err(Error::Alignment(format!(
                    "CRS mismatch between raster and target grid: {} vs {}",
                    b, a
                )));
            }
        }
        Ok(())
    }
}

/// Parameters for fine-to-coarse aggregation
#[derive(Debug, Clone)]
pub struct AggregateParams {
    /// Minimum fraction of a coarse cell's contributing fine pixels that
    /// must be valid; below this the cell is nodata
    pub min_coverage: f64,
    /// Overall valid-cell fraction below which aggregation aborts
    pub abort_below: f64,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            min_coverage: 0.5,
            abort_below: 0.05,
        }
    }
}

/// Coverage accounting for one aggregation pass.
///
/// Carried up through the pipeline result so callers can distinguish a clean
/// run from one that averaged over patchy input.
#[derive(Debug, Clone, Copy)]
pub struct CoverageReport {
    /// Coarse cells in the target grid
    pub total_cells: usize,
    /// Cells that met the coverage threshold
    pub valid_cells: usize,
    /// Cells set to nodata for falling below the threshold
    pub low_coverage_cells: usize,
}

impl CoverageReport {
    pub fn valid_fraction(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            self.valid_cells as f64 / self.total_cells as f64
        }
    }

    /// Whether a majority of coarse cells fell below the coverage threshold
    /// (warning-level annotation, not an abort)
    pub fn is_degraded(&self) -> bool {
        self.low_coverage_cells * 2 > self.total_cells
    }

    /// Fold another report into this one (multiple aggregated predictors)
    pub fn merge(&self, other: &CoverageReport) -> CoverageReport {
        CoverageReport {
            total_cells: self.total_cells + other.total_cells,
            valid_cells: self.valid_cells + other.valid_cells,
            low_coverage_cells: self.low_coverage_cells + other.low_coverage_cells,
        }
    }
}

/// Aggregate a fine raster onto a coarse grid by area-weighted averaging.
///
/// Every fine pixel whose center falls inside a coarse cell contributes with
/// equal weight (fine pixels have equal area). A coarse cell with a valid
/// contribution fraction below `params.min_coverage` is nodata. Returns the
/// coarse raster plus the coverage report; aborts with [`Error::Coverage`]
/// when the overall valid fraction is below `params.abort_below`.
pub fn aggregate(
    fine: &Raster<f64>,
    target: &GridSpec,
    params: &AggregateParams,
) -> Result<(Raster<f64>, CoverageReport)> {
    target.check_crs(fine)?;
    if target.rows == 0 || target.cols == 0 {
        return Err(Error::InvalidDimensions {
            width: target.cols,
            height: target.rows,
        });
    }
    if !(0.0..=1.0).contains(&params.min_coverage) {
        return Err(Error::InvalidParameter {
            name: "min_coverage",
            value: params.min_coverage.to_string(),
            reason: "must be in [0, 1]".to_string(),
        });
    }

    let (fine_rows, fine_cols) = fine.shape();
    let nodata = fine.nodata();
    let fine_gt = *fine.transform();
    let coarse_gt = target.transform;

    // Per coarse row: (cell values, valid count, low-coverage count)
    let per_row: Vec<(Vec<f64>, usize, usize)> = (0..target.rows)
        .into_par_iter()
        .map(|crow| {
            let mut row_data = vec![f64::NAN; target.cols];
            let mut valid = 0usize;
            let mut low = 0usize;

            for (ccol, out) in row_data.iter_mut().enumerate() {
                // Candidate fine index range from the coarse cell corners
                let x0 = coarse_gt.origin_x + ccol as f64 * coarse_gt.pixel_width;
                let x1 = x0 + coarse_gt.pixel_width;
                let y0 = coarse_gt.origin_y + crow as f64 * coarse_gt.pixel_height;
                let y1 = y0 + coarse_gt.pixel_height;

                let (fc0, fr0) = fine_gt.geo_to_pixel(x0.min(x1), y0.max(y1));
                let (fc1, fr1) = fine_gt.geo_to_pixel(x0.max(x1), y0.min(y1));

                let col_lo = fc0.floor().max(0.0) as usize;
                let col_hi = (fc1.ceil().max(0.0) as usize).min(fine_cols);
                let row_lo = fr0.floor().max(0.0) as usize;
                let row_hi = (fr1.ceil().max(0.0) as usize).min(fine_rows);

                let mut sum = 0.0;
                let mut n_valid = 0usize;
                let mut n_total = 0usize;

                for frow in row_lo..row_hi {
                    for fcol in col_lo..col_hi {
                        let (cx, cy) = fine_gt.pixel_to_geo(fcol, frow);
                        let (pc, pr) = coarse_gt.geo_to_pixel(cx, cy);
                        if pc.floor() as isize != ccol as isize
                            || pr.floor() as isize != crow as isize
                        {
                            continue;
                        }
                        n_total += 1;
                        let v = unsafe { fine.get_unchecked(frow, fcol) };
                        if !v.is_nodata(nodata) {
                            sum += v;
                            n_valid += 1;
                        }
                    }
                }

                if n_total == 0 || (n_valid as f64) < params.min_coverage * n_total as f64 {
                    low += 1;
                } else {
                    *out = sum / n_valid as f64;
                    valid += 1;
                }
            }

            (row_data, valid, low)
        })
        .collect();

    let mut data = Vec::with_capacity(target.rows * target.cols);
    let mut valid_cells = 0usize;
    let mut low_coverage_cells = 0usize;
    for (row_data, valid, low) in per_row {
        data.extend(row_data);
        valid_cells += valid;
        low_coverage_cells += low;
    }

    let report = CoverageReport {
        total_cells: target.rows * target.cols,
        valid_cells,
        low_coverage_cells,
    };

    if report.valid_fraction() < params.abort_below {
        return Err(Error::Coverage {
            valid_fraction: report.valid_fraction(),
            required: params.abort_below,
        });
    }

    let mut output: Raster<f64> = Raster::from_vec(data, target.rows, target.cols)?;
    output.set_transform(target.transform);
    output.set_crs(target.crs.clone().or_else(|| fine.crs().cloned()));
    output.set_nodata(Some(f64::NAN));

    Ok((output, report))
}

/// Disaggregate a coarse raster onto a fine grid by bilinear interpolation.
///
/// Interpolation runs between coarse pixel centers; fine pixels beyond the
/// outermost centers clamp to the edge value. Nodata neighbors drop out of
/// the weighted sum with their weights renormalized; a fine pixel is nodata
/// only when all four neighbors are.
pub fn disaggregate(coarse: &Raster<f64>, target: &GridSpec) -> Result<Raster<f64>> {
    target.check_crs(coarse)?;
    let (coarse_rows, coarse_cols) = coarse.shape();
    if coarse_rows == 0 || coarse_cols == 0 {
        return Err(Error::InvalidDimensions {
            width: coarse_cols,
            height: coarse_rows,
        });
    }

    let nodata = coarse.nodata();
    let coarse_gt = *coarse.transform();
    let fine_gt = target.transform;

    let data: Vec<f64> = (0..target.rows)
        .into_par_iter()
        .flat_map(|frow| {
            let mut row_data = vec![f64::NAN; target.cols];
            for (fcol, out) in row_data.iter_mut().enumerate() {
                let (x, y) = fine_gt.pixel_to_geo(fcol, frow);
                let (pc, pr) = coarse_gt.geo_to_pixel(x, y);

                // Continuous coordinates relative to coarse pixel centers
                let gx = (pc - 0.5).clamp(0.0, (coarse_cols - 1) as f64);
                let gy = (pr - 0.5).clamp(0.0, (coarse_rows - 1) as f64);

                let c0 = gx.floor() as usize;
                let r0 = gy.floor() as usize;
                let c1 = (c0 + 1).min(coarse_cols - 1);
                let r1 = (r0 + 1).min(coarse_rows - 1);
                let wx = gx - c0 as f64;
                let wy = gy - r0 as f64;

                let neighbors = [
                    (r0, c0, (1.0 - wx) * (1.0 - wy)),
                    (r0, c1, wx * (1.0 - wy)),
                    (r1, c0, (1.0 - wx) * wy),
                    (r1, c1, wx * wy),
                ];

                let mut value = 0.0;
                let mut weight = 0.0;
                for (r, c, w) in neighbors {
                    let v = unsafe { coarse.get_unchecked(r, c) };
                    if !v.is_nodata(nodata) && w > 0.0 {
                        value += v * w;
                        weight += w;
                    }
                }

                if weight > 0.0 {
                    *out = value / weight;
                }
            }
            row_data
        })
        .collect();

    let mut output: Raster<f64> = Raster::from_vec(data, target.rows, target.cols)?;
    output.set_transform(target.transform);
    output.set_crs(target.crs.clone().or_else(|| coarse.crs().cloned()));
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fine_raster(rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn coarse_grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(
            rows,
            cols,
            GeoTransform::new(0.0, rows as f64 * 30.0, 30.0, -30.0),
        )
    }

    #[test]
    fn test_aggregate_nested_mean() {
        // 9x9 fine at 10 m over 3x3 coarse at 30 m; each coarse cell sees
        // a constant 3x3 fine block
        let mut fine = fine_raster(9, 9);
        for row in 0..9 {
            for col in 0..9 {
                let block = (row / 3) * 3 + col / 3;
                fine.set(row, col, block as f64).unwrap();
            }
        }

        let (coarse, report) =
            aggregate(&fine, &coarse_grid(3, 3), &AggregateParams::default()).unwrap();

        assert_eq!(report.valid_cells, 9);
        assert_eq!(report.low_coverage_cells, 0);
        for row in 0..3 {
            for col in 0..3 {
                let expected = (row * 3 + col) as f64;
                assert!((coarse.get(row, col).unwrap() - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_aggregate_coverage_threshold() {
        let mut fine = fine_raster(9, 9);
        for row in 0..9 {
            for col in 0..9 {
                fine.set(row, col, 1.0).unwrap();
            }
        }
        // Knock out 5 of 9 fine pixels in the top-left coarse cell
        for (r, c) in [(0, 0), (0, 1), (0, 2), (1, 0), (1, 1)] {
            fine.set(r, c, f64::NAN).unwrap();
        }

        let (coarse, report) =
            aggregate(&fine, &coarse_grid(3, 3), &AggregateParams::default()).unwrap();

        // 4/9 valid < 0.5 → nodata
        assert!(coarse.get(0, 0).unwrap().is_nan());
        assert_eq!(report.low_coverage_cells, 1);
        assert_eq!(report.valid_cells, 8);
        assert!(!report.is_degraded());
    }

    #[test]
    fn test_aggregate_aborts_on_near_zero_coverage() {
        let mut fine = fine_raster(9, 9);
        for row in 0..9 {
            for col in 0..9 {
                fine.set(row, col, f64::NAN).unwrap();
            }
        }
        fine.set(0, 0, 1.0).unwrap();

        let result = aggregate(&fine, &coarse_grid(3, 3), &AggregateParams::default());
        assert!(matches!(result, Err(Error::Coverage { .. })));
    }

    #[test]
    fn test_aggregate_crs_mismatch() {
        let mut fine = fine_raster(9, 9);
        fine.set_crs(Some(Crs::utm_north(19)));
        let mut grid = coarse_grid(3, 3);
        grid.crs = Some(Crs::utm_south(19));

        let result = aggregate(&fine, &grid, &AggregateParams::default());
        assert!(matches!(result, Err(Error::Alignment(_))));
    }

    #[test]
    fn test_disaggregate_constant_field() {
        let mut coarse = Raster::filled(3, 3, 7.5);
        coarse.set_transform(GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        coarse.set_nodata(Some(f64::NAN));

        let fine_grid = GridSpec::new(9, 9, GeoTransform::new(0.0, 90.0, 10.0, -10.0));
        let fine = disaggregate(&coarse, &fine_grid).unwrap();

        for row in 0..9 {
            for col in 0..9 {
                assert!((fine.get(row, col).unwrap() - 7.5).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_disaggregate_is_smooth() {
        // Linear ramp in x: bilinear interpolation must be monotonic along
        // each fine row with no blocky repeats between coarse centers
        let mut coarse = Raster::new(3, 3);
        coarse.set_transform(GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        coarse.set_nodata(Some(f64::NAN));
        for row in 0..3 {
            for col in 0..3 {
                coarse.set(row, col, col as f64 * 10.0).unwrap();
            }
        }

        let fine_grid = GridSpec::new(9, 9, GeoTransform::new(0.0, 90.0, 10.0, -10.0));
        let fine = disaggregate(&coarse, &fine_grid).unwrap();

        for row in 0..9 {
            for col in 0..8 {
                let a = fine.get(row, col).unwrap();
                let b = fine.get(row, col + 1).unwrap();
                assert!(b >= a, "not monotonic at ({}, {}): {} > {}", row, col, a, b);
            }
        }
        // Interior values strictly between the coarse extremes
        assert!(fine.get(4, 4).unwrap() > 0.0);
        assert!(fine.get(4, 4).unwrap() < 20.0);
    }

    #[test]
    fn test_disaggregate_nodata_hole() {
        let mut coarse = Raster::filled(3, 3, 5.0);
        coarse.set_transform(GeoTransform::new(0.0, 90.0, 30.0, -30.0));
        coarse.set_nodata(Some(f64::NAN));
        coarse.set(1, 1, f64::NAN).unwrap();

        let fine_grid = GridSpec::new(9, 9, GeoTransform::new(0.0, 90.0, 10.0, -10.0));
        let fine = disaggregate(&coarse, &fine_grid).unwrap();

        // Renormalized weights keep the constant field constant
        for row in 0..9 {
            for col in 0..9 {
                let v = fine.get(row, col).unwrap();
                assert!((v - 5.0).abs() < 1e-12, "got {} at ({}, {})", v, row, col);
            }
        }
    }

    #[test]
    fn test_roundtrip_conserves_coarse_mean() {
        let mut fine = fine_raster(12, 12);
        for row in 0..12 {
            for col in 0..12 {
                fine.set(row, col, (row + col) as f64 * 0.5 + 290.0).unwrap();
            }
        }

        let grid = GridSpec::new(4, 4, GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        let (coarse, _) = aggregate(&fine, &grid, &AggregateParams::default()).unwrap();
        let back = disaggregate(&coarse, &GridSpec::from_raster(&fine)).unwrap();
        let (re_coarse, _) = aggregate(&back, &grid, &AggregateParams::default()).unwrap();

        let orig_mean = coarse.statistics().mean.unwrap();
        let re_mean = re_coarse.statistics().mean.unwrap();
        assert!(
            (orig_mean - re_mean).abs() < 0.05,
            "coarse mean drifted: {} vs {}",
            orig_mean,
            re_mean
        );
    }
}
