//! Vector layer export.
//!
//! Layers are written as an RFC 7946 FeatureCollection or as an RFC 8142
//! GeoJSON text sequence (one record-separator-prefixed feature per line).
//! Each feature carries its bin index in `properties.class_value`.

pub mod format;
pub mod geojson_io;

pub use format::ExportFormat;
pub use geojson_io::{export, from_bytes, read, to_bytes};
