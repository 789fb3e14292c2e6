//! Affine georeferencing for north-up rasters

use serde::{Deserialize, Serialize};

/// Georeferencing for a north-up raster grid.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin_x`/`origin_y` is the upper-left corner of the upper-left pixel and
/// `pixel_height` is negative for the usual north-up orientation. Rotated
/// grids are not supported; Landsat/Sentinel-2 L2 products are north-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Convert pixel indices to the map coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Convert map coordinates to fractional pixel coordinates
    ///
    /// Returns fractional (col, row); `.floor()` gives the containing pixel.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (y - self.origin_y) / self.pixel_height;
        (col, row)
    }

    /// Cell size (assumes square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y) for a grid of the
    /// given dimensions
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Whether a coarser grid is nested on this (finer) grid.
    ///
    /// Nested means the coarse cell size is an integer multiple of the fine
    /// cell size and the coarse origin coincides with a fine cell corner,
    /// within `tol` map units. Landsat 30 m on Sentinel-2 10 m satisfies
    /// this after co-registration.
    pub fn is_nested_in(&self, fine: &GeoTransform, tol: f64) -> bool {
        let ratio = self.cell_size() / fine.cell_size();
        if (ratio - ratio.round()).abs() > 1e-9 || ratio.round() < 1.0 {
            return false;
        }
        let dx = (self.origin_x - fine.origin_x) / fine.pixel_width;
        let dy = (self.origin_y - fine.origin_y) / fine.pixel_height;
        let tol_px = tol / fine.cell_size();
        (dx - dx.round()).abs() <= tol_px && (dy - dy.round()).abs() <= tol_px
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
