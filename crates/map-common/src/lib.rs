//! Common types shared by every tracemap crate.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;

pub use bbox::BoundingBox;
pub use crs::Crs;
pub use error::{MapError, MapResult};
pub use grid::{GeoTransform, Raster};
