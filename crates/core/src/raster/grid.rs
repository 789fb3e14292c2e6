//! Main Raster type

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in row-major order together with
/// the georeferencing needed to place each cell on the map: a
/// [`GeoTransform`], an optional [`Crs`] and an optional no-data sentinel.
///
/// Rasters are treated as immutable values by the downscaling pipeline:
/// every operation produces a new raster and never mutates its inputs.
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Cell values, (row, col) indexed
    data: Array2<T>,
    /// Affine georeferencing
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<Crs>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster from a row-major vector
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array =
            Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            data: array,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        })
    }

    /// Create a raster with this raster's georeferencing but new dimensions,
    /// filled with zeros of a possibly different element type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Create a raster with identical dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<Crs>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Coordinate conversion

    /// Map coordinates of the center of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional pixel coordinates of a map position
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Require that another raster shares this raster's grid.
    ///
    /// Checks shape, geotransform and CRS. Operands of raster arithmetic
    /// must pass this; projections are never silently mixed.
    pub fn check_aligned<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        if self.shape() != other.shape() {
            let (er, ec) = self.shape();
            let (ar, ac) = other.shape();
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        if self.transform != other.transform {
            return Err(Error::Alignment(format!(
                "geotransforms differ: {:?} vs {:?}",
                self.transform, other.transform
            )));
        }
        match (&self.crs, &other.crs) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => Err(Error::Alignment(format!(
                "CRS mismatch: {} vs {}",
                a, b
            ))),
            _ => Ok(()),
        }
    }

    // Statistics

    /// Basic statistics over valid cells (min, max, mean, std dev, counts)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min = None;
        let mut max = None;
        let mut sum: f64 = 0.0;
        let mut sum_sq: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.is_none() || value < min.unwrap() {
                min = Some(value);
            }
            if max.is_none() || value > max.unwrap() {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }

        let (mean, std_dev) = if count > 0 {
            let m = sum / count as f64;
            let var = (sum_sq / count as f64 - m * m).max(0.0);
            (Some(m), Some(var.sqrt()))
        } else {
            (None, None)
        };

        RasterStatistics {
            min,
            max,
            mean,
            std_dev,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f64> = Raster::new(30, 40);
        assert_eq!(raster.rows(), 30);
        assert_eq!(raster.cols(), 40);
        assert_eq!(raster.shape(), (30, 40));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 301.5).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 301.5);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_raster_statistics_skips_nodata() {
        let mut raster: Raster<f64> = Raster::filled(3, 3, 300.0);
        raster.set(1, 1, f64::NAN).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.valid_count, 8);
        assert_eq!(stats.nodata_count, 1);
        assert!((stats.mean.unwrap() - 300.0).abs() < 1e-12);
        assert!(stats.std_dev.unwrap() < 1e-12);
    }

    #[test]
    fn test_check_aligned_shape() {
        let a: Raster<f64> = Raster::new(4, 4);
        let b: Raster<f64> = Raster::new(5, 4);
        assert!(a.check_aligned(&b).is_err());
    }

    #[test]
    fn test_check_aligned_crs() {
        let mut a: Raster<f64> = Raster::new(4, 4);
        let mut b: Raster<f64> = Raster::new(4, 4);
        a.set_crs(Some(Crs::utm_south(19)));
        b.set_crs(Some(Crs::utm_north(19)));
        assert!(matches!(a.check_aligned(&b), Err(Error::Alignment(_))));

        b.set_crs(Some(Crs::utm_south(19)));
        assert!(a.check_aligned(&b).is_ok());
    }
}
