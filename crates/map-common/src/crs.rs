//! Coordinate reference system tag.
//!
//! Every layer produced by tracemap is geographic longitude/latitude.
//! The tag still travels with vector layers so exports can name it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate reference system of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// WGS84 geographic, longitude/latitude in degrees
    #[default]
    #[serde(rename = "EPSG:4326")]
    Epsg4326,
}

impl Crs {
    /// Parse a CRS identifier such as `EPSG:4326` or `CRS:84`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "OGC:CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => {
                Some(Crs::Epsg4326)
            }
            _ => None,
        }
    }

    /// OGC URN form used in GeoJSON `crs` members.
    pub fn urn(&self) -> &'static str {
        match self {
            Crs::Epsg4326 => "urn:ogc:def:crs:OGC:1.3:CRS84",
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg4326 => write!(f, "EPSG:4326"),
        }
    }
}
