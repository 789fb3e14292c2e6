//! Scenes and scene loading
//!
//! A [`Scene`] groups the co-registered bands of one acquisition. The
//! [`SceneSource`] trait is the narrow seam to whatever produced the rasters
//! (GeoTIFF exports on disk, a synthetic generator in tests); the pipeline
//! itself only ever sees fully materialized `Scene` values.

use std::collections::HashMap;
use std::path::PathBuf;

use thermoscale_core::io::read_geotiff;
use thermoscale_core::{Crs, Error, Raster, Result};

use crate::sensors::{BandKind, Sensor};

/// A co-registered multi-band acquisition from one sensor.
///
/// All bands share grid, extent and CRS; this is checked when bands are
/// added, so downstream code can rely on alignment.
#[derive(Debug, Clone)]
pub struct Scene {
    sensor: Sensor,
    bands: HashMap<String, Raster<f64>>,
    /// Acquisition date, ISO 8601 (metadata only)
    acquired: Option<String>,
}

impl Scene {
    pub fn new(sensor: Sensor) -> Self {
        Self {
            sensor,
            bands: HashMap::new(),
            acquired: None,
        }
    }

    pub fn sensor(&self) -> Sensor {
        self.sensor
    }

    pub fn acquired(&self) -> Option<&str> {
        self.acquired.as_deref()
    }

    pub fn set_acquired(&mut self, date: impl Into<String>) {
        self.acquired = Some(date.into());
    }

    /// Add a band under its native name.
    ///
    /// The first band fixes the scene grid; later bands must align with it.
    pub fn add_band(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        if let Some(existing) = self.bands.values().next() {
            existing.check_aligned(&raster)?;
        }
        self.bands.insert(name.into(), raster);
        Ok(())
    }

    /// Look up a band by its native name
    pub fn band_named(&self, name: &str) -> Option<&Raster<f64>> {
        self.bands.get(name)
    }

    /// Resolve a band role through the sensor's naming convention
    pub fn band(&self, kind: BandKind) -> Result<&Raster<f64>> {
        let name = self
            .sensor
            .band_name(kind)
            .ok_or_else(|| Error::MissingBand {
                band: kind.name().to_string(),
                sensor: self.sensor.name().to_string(),
            })?;
        self.bands.get(name).ok_or_else(|| Error::MissingBand {
            band: name.to_string(),
            sensor: self.sensor.name().to_string(),
        })
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    /// Grid of the scene (from any band), if at least one band is present
    pub fn grid(&self) -> Option<&Raster<f64>> {
        self.bands.values().next()
    }
}

/// Specification of a scene to load: where each native band lives.
#[derive(Debug, Clone)]
pub struct SceneSpec {
    pub sensor: Sensor,
    /// Native band name -> file path
    pub band_paths: Vec<(String, PathBuf)>,
    pub acquired: Option<String>,
    /// CRS to stamp on loaded bands (native GeoTIFF I/O does not decode
    /// projection metadata)
    pub crs: Option<Crs>,
}

/// Narrow seam for scene acquisition.
///
/// Image search, cloud filtering and download happen behind this trait and
/// are outside the core. Implementations must return fully materialized,
/// co-registered scenes; the pipeline never calls back into them mid-run.
pub trait SceneSource {
    fn load_scene(&self, spec: &SceneSpec) -> Result<Scene>;
}

/// Loads scenes from single-band GeoTIFF files on disk.
#[derive(Debug, Default)]
pub struct GeoTiffSceneSource;

impl SceneSource for GeoTiffSceneSource {
    fn load_scene(&self, spec: &SceneSpec) -> Result<Scene> {
        let mut scene = Scene::new(spec.sensor);
        if let Some(date) = &spec.acquired {
            scene.set_acquired(date.clone());
        }
        for (name, path) in &spec.band_paths {
            let mut raster: Raster<f64> = read_geotiff(path)?;
            raster.set_nodata(Some(f64::NAN));
            raster.set_crs(spec.crs.clone());
            scene.add_band(name.clone(), raster)?;
        }
        Ok(scene)
    }
}
