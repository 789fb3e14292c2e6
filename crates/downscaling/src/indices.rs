//! Spectral index engine
//!
//! Normalized-difference indices correlated with land surface temperature,
//! computed from reflectance bands at their native resolution. The
//! regression step selects any subset of these as predictors.

use ndarray::Array2;

use thermoscale_core::raster::Raster;
use thermoscale_core::{Error, Result};

use crate::maybe_rayon::*;
use crate::scene::Scene;
use crate::sensors::BandKind;

/// Index families supported as regression predictors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index, `(NIR - Red) / (NIR + Red)`
    Ndvi,
    /// Normalized Difference Built-up Index, `(SWIR1 - NIR) / (SWIR1 + NIR)`
    Ndbi,
    /// Normalized Difference Water Index (McFeeters), `(Green - NIR) / (Green + NIR)`
    Ndwi,
}

impl SpectralIndex {
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndbi => "NDBI",
            SpectralIndex::Ndwi => "NDWI",
        }
    }

    /// Band roles of (numerator-positive, numerator-negative)
    pub fn band_roles(&self) -> (BandKind, BandKind) {
        match self {
            SpectralIndex::Ndvi => (BandKind::Nir, BandKind::Red),
            SpectralIndex::Ndbi => (BandKind::Swir1, BandKind::Nir),
            SpectralIndex::Ndwi => (BandKind::Green, BandKind::Nir),
        }
    }

    /// All supported index families
    pub fn all() -> [SpectralIndex; 3] {
        [SpectralIndex::Ndvi, SpectralIndex::Ndbi, SpectralIndex::Ndwi]
    }

    pub fn from_name(name: &str) -> Option<SpectralIndex> {
        match name.to_ascii_uppercase().as_str() {
            "NDVI" => Some(SpectralIndex::Ndvi),
            "NDBI" => Some(SpectralIndex::Ndbi),
            "NDWI" => Some(SpectralIndex::Ndwi),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Denominators below this are nodata rather than ±infinity
const DENOM_EPSILON: f64 = 1e-10;

/// Compute the normalized difference between two aligned bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Values land in [-1, 1] (clamped against floating-point spill). Pixels
/// where either band is nodata or `|band_a + band_b|` is below epsilon are
/// NaN in the output.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.check_aligned(band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if is_nodata_f64(a, nodata_a) || is_nodata_f64(b, nodata_b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < DENOM_EPSILON {
                    continue;
                }

                row_data[col] = ((a - b) / sum).clamp(-1.0, 1.0);
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// High over dense vegetation (cool surfaces), near zero over bare soil,
/// negative over water.
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Normalized Difference Built-up Index (Zha, 2003)
///
/// `NDBI = (SWIR1 - NIR) / (SWIR1 + NIR)`
///
/// Positive over built-up and impervious surfaces, which run warm.
pub fn ndbi(swir1: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(swir1, nir)
}

/// Normalized Difference Water Index (McFeeters, 1996)
///
/// `NDWI = (Green - NIR) / (Green + NIR)`
///
/// Positive over open water and moist surfaces.
pub fn ndwi(green: &Raster<f64>, nir: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(green, nir)
}

/// Compute one index family from a scene, resolving bands through the
/// sensor's naming convention.
pub fn compute_index(scene: &Scene, index: SpectralIndex) -> Result<Raster<f64>> {
    let (pos, neg) = index.band_roles();
    normalized_difference(scene.band(pos)?, scene.band(neg)?)
}

fn is_nodata_f64(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => (value - nd).abs() < f64::EPSILON,
        None => false,
    }
}

fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermoscale_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_ndvi_value() {
        let nir = make_band(5, 5, 0.5);
        let red = make_band(5, 5, 0.1);

        let result = ndvi(&nir, &red).unwrap();
        let expected = (0.5 - 0.1) / (0.5 + 0.1);
        assert!((result.get(2, 2).unwrap() - expected).abs() < 1e-10);
    }

    #[test]
    fn test_ndbi_built_up() {
        // Built-up: SWIR1 > NIR → positive NDBI
        let swir1 = make_band(5, 5, 0.35);
        let nir = make_band(5, 5, 0.25);

        let result = ndbi(&swir1, &nir).unwrap();
        assert!(result.get(2, 2).unwrap() > 0.0);
    }

    #[test]
    fn test_ndwi_water() {
        let green = make_band(5, 5, 0.3);
        let nir = make_band(5, 5, 0.05);

        let result = ndwi(&green, &nir).unwrap();
        assert!(result.get(2, 2).unwrap() > 0.0);
    }

    #[test]
    fn test_range_bounded() {
        // Mixed magnitudes, including values that would clamp
        let mut a = Raster::new(10, 10);
        let mut b = Raster::new(10, 10);
        for row in 0..10 {
            for col in 0..10 {
                a.set(row, col, (row as f64 - 5.0) * 0.2).unwrap();
                b.set(col, row, (col as f64) * 0.05).unwrap();
            }
        }

        let result = normalized_difference(&a, &b).unwrap();
        for row in 0..10 {
            for col in 0..10 {
                let val = result.get(row, col).unwrap();
                if !val.is_nan() {
                    assert!((-1.0..=1.0).contains(&val), "out of range: {}", val);
                }
            }
        }
    }

    #[test]
    fn test_zero_denominator_is_nodata() {
        let a = make_band(3, 3, 0.2);
        let b = make_band(3, 3, -0.2);

        let result = normalized_difference(&a, &b).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_nodata_propagates() {
        let mut nir = make_band(5, 5, 0.5);
        nir.set_nodata(Some(-9999.0));
        nir.set(2, 2, -9999.0).unwrap();
        let red = make_band(5, 5, 0.1);

        let result = ndvi(&nir, &red).unwrap();
        assert!(result.get(2, 2).unwrap().is_nan());
        assert!(!result.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_misaligned_bands_rejected() {
        let a = make_band(5, 5, 1.0);
        let b = make_band(5, 10, 1.0);
        assert!(normalized_difference(&a, &b).is_err());

        let mut c = make_band(5, 5, 1.0);
        c.set_transform(GeoTransform::new(30.0, 5.0, 1.0, -1.0));
        assert!(normalized_difference(&a, &c).is_err());
    }

    #[test]
    fn test_index_names_roundtrip() {
        for idx in SpectralIndex::all() {
            assert_eq!(SpectralIndex::from_name(idx.name()), Some(idx));
        }
        assert_eq!(SpectralIndex::from_name("EVI"), None);
    }
}
