//! Raster loading for tracemap.
//!
//! Reads single-band (or the chosen band of a multi-band) GeoTIFF into a
//! [`map_common::Raster`], either from a path or from uploaded bytes, and
//! offers an explicit caller-owned cache keyed by file identity.

pub mod cache;
pub mod geotiff;
pub mod upload;

pub use cache::{CacheStats, CachedLoader, LoadKey, RasterCache, ResultCache};
pub use geotiff::{load, load_band, load_bytes};
pub use upload::stage_upload;
