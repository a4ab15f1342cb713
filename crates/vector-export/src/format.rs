//! Output format selection.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use map_common::MapError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One FeatureCollection document.
    #[default]
    GeoJson,
    /// RFC 8142 text sequence, one feature per record.
    GeoJsonSeq,
}

impl ExportFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(ExportFormat::GeoJson),
            "geojsons" | "geojsonseq" | "geojsonl" => Some(ExportFormat::GeoJsonSeq),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::GeoJsonSeq => "geojsons",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "application/geo+json",
            ExportFormat::GeoJsonSeq => "application/geo+json-seq",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(ExportFormat::GeoJson),
            "geojsonseq" | "geojsons" | "geojson-seq" => Ok(ExportFormat::GeoJsonSeq),
            other => Err(MapError::invalid_parameter(
                "format",
                format!("unsupported export format '{}'", other),
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::GeoJson => write!(f, "geojson"),
            ExportFormat::GeoJsonSeq => write!(f, "geojsonseq"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("GeoJSON".parse::<ExportFormat>().unwrap(), ExportFormat::GeoJson);
        assert_eq!("geojsonseq".parse::<ExportFormat>().unwrap(), ExportFormat::GeoJsonSeq);
        assert_eq!(
            "shapefile".parse::<ExportFormat>().unwrap_err().kind(),
            "InvalidParameter"
        );
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/classes.GEOJSON")),
            Some(ExportFormat::GeoJson)
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("classes.geojsons")),
            Some(ExportFormat::GeoJsonSeq)
        );
        assert_eq!(ExportFormat::from_path(Path::new("classes.shp")), None);
        assert_eq!(ExportFormat::from_path(Path::new("classes")), None);
    }

    #[test]
    fn test_display_round_trips() {
        for format in [ExportFormat::GeoJson, ExportFormat::GeoJsonSeq] {
            assert_eq!(format.to_string().parse::<ExportFormat>().unwrap(), format);
        }
    }
}
