//! I/O for georeferenced rasters

mod native;

pub use native::{read_geotiff, write_geotiff};
