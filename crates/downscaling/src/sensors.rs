//! Sensor band conventions and radiometric scaling
//!
//! Band-name mappings for the two product families the pipeline consumes:
//! Landsat 8/9 Collection 2 Level-2 (30 m, carries the thermal LST source)
//! and Sentinel-2 surface reflectance (10 m, downscaling target).
//!
//! Scale factors follow the USGS Collection 2 Level-2 definitions:
//! optical `dn * 0.0000275 - 0.2`, thermal `dn * 0.00341802 + 149.0` Kelvin.

use thermoscale_core::{Raster, Result};

/// Physical band roles used by the spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandKind {
    /// Near-infrared
    Nir,
    /// Visible red
    Red,
    /// Visible green
    Green,
    /// Shortwave infrared 1 (~1.6 µm)
    Swir1,
    /// Thermal (surface temperature source)
    Thermal,
}

impl BandKind {
    pub fn name(&self) -> &'static str {
        match self {
            BandKind::Nir => "nir",
            BandKind::Red => "red",
            BandKind::Green => "green",
            BandKind::Swir1 => "swir1",
            BandKind::Thermal => "thermal",
        }
    }
}

/// Supported sensor product families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    /// Landsat 8/9 Collection 2 Level-2 surface reflectance + surface temperature
    Landsat,
    /// Sentinel-2 Level-2A surface reflectance
    Sentinel2,
}

impl Sensor {
    /// Native band name for a band role, if the sensor carries it
    pub fn band_name(&self, kind: BandKind) -> Option<&'static str> {
        match self {
            Sensor::Landsat => match kind {
                BandKind::Nir => Some("SR_B5"),
                BandKind::Red => Some("SR_B4"),
                BandKind::Green => Some("SR_B3"),
                BandKind::Swir1 => Some("SR_B6"),
                BandKind::Thermal => Some("ST_B10"),
            },
            Sensor::Sentinel2 => match kind {
                BandKind::Nir => Some("B8"),
                BandKind::Red => Some("B4"),
                BandKind::Green => Some("B3"),
                BandKind::Swir1 => Some("B11"),
                BandKind::Thermal => None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sensor::Landsat => "landsat",
            Sensor::Sentinel2 => "sentinel2",
        }
    }
}

// Landsat Collection 2 Level-2 scale factors
const L2_OPTICAL_SCALE: f64 = 0.0000275;
const L2_OPTICAL_OFFSET: f64 = -0.2;
const L2_THERMAL_SCALE: f64 = 0.00341802;
const L2_THERMAL_OFFSET: f64 = 149.0;

// Sentinel-2 L2A reflectance quantification
const S2_REFLECTANCE_SCALE: f64 = 1.0 / 10_000.0;

/// Convert raw digital numbers of an optical band to surface reflectance
pub fn scale_reflectance(dn: &Raster<f64>, sensor: Sensor) -> Result<Raster<f64>> {
    let mut out = dn.clone();
    out.set_nodata(Some(f64::NAN));
    for v in out.data_mut().iter_mut() {
        if dn.is_nodata(*v) {
            *v = f64::NAN;
            continue;
        }
        *v = match sensor {
            Sensor::Landsat => *v * L2_OPTICAL_SCALE + L2_OPTICAL_OFFSET,
            Sensor::Sentinel2 => *v * S2_REFLECTANCE_SCALE,
        };
    }
    Ok(out)
}

/// Convert raw thermal digital numbers to surface temperature in Kelvin
pub fn thermal_to_kelvin(dn: &Raster<f64>) -> Result<Raster<f64>> {
    let mut out = dn.clone();
    out.set_nodata(Some(f64::NAN));
    for v in out.data_mut().iter_mut() {
        if dn.is_nodata(*v) {
            *v = f64::NAN;
            continue;
        }
        *v = *v * L2_THERMAL_SCALE + L2_THERMAL_OFFSET;
    }
    Ok(out)
}

/// Convert a Kelvin LST raster to Celsius
pub fn kelvin_to_celsius(lst: &Raster<f64>) -> Raster<f64> {
    let mut out = lst.clone();
    out.set_nodata(Some(f64::NAN));
    for v in out.data_mut().iter_mut() {
        if lst.is_nodata(*v) {
            *v = f64::NAN;
        } else {
            *v -= 273.15;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_names() {
        assert_eq!(Sensor::Landsat.band_name(BandKind::Nir), Some("SR_B5"));
        assert_eq!(Sensor::Sentinel2.band_name(BandKind::Swir1), Some("B11"));
        assert_eq!(Sensor::Sentinel2.band_name(BandKind::Thermal), None);
    }

    #[test]
    fn test_thermal_scaling() {
        // DN that lands near 300 K: (300 - 149) / 0.00341802
        let dn_value = (300.0 - 149.0) / 0.00341802;
        let dn = Raster::filled(2, 2, dn_value);
        let kelvin = thermal_to_kelvin(&dn).unwrap();
        assert!((kelvin.get(0, 0).unwrap() - 300.0).abs() < 1e-9);

        let celsius = kelvin_to_celsius(&kelvin);
        assert!((celsius.get(1, 1).unwrap() - 26.85).abs() < 1e-9);
    }

    #[test]
    fn test_reflectance_scaling_propagates_nodata() {
        let mut dn = Raster::filled(2, 2, 10_000.0);
        dn.set(0, 1, f64::NAN).unwrap();

        let refl = scale_reflectance(&dn, Sensor::Sentinel2).unwrap();
        assert!((refl.get(0, 0).unwrap() - 1.0).abs() < 1e-12);
        assert!(refl.get(0, 1).unwrap().is_nan());

        let l8 = scale_reflectance(&dn, Sensor::Landsat).unwrap();
        assert!((l8.get(1, 1).unwrap() - (10_000.0 * 0.0000275 - 0.2)).abs() < 1e-12);
    }
}
