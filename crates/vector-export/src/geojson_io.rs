//! GeoJSON encoding and decoding of [`VectorLayer`]s.

use std::io::Write;
use std::path::Path;

use classifier::{PolygonRecord, Shape, VectorLayer};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use map_common::{Crs, MapError, MapResult};
use serde_json::{json, Value as JsonValue};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::format::ExportFormat;

/// RFC 8142 record separator.
const RS: u8 = 0x1e;

const CLASS_PROPERTY: &str = "class_value";

/// Write `layer` to `path`.
///
/// The bytes go to a temporary file next to `path` first and are then
/// renamed over it, so readers never observe a half-written export and
/// re-running with the same layer leaves identical bytes.
#[instrument(skip_all, fields(path = %path.as_ref().display(), records = layer.len()))]
pub fn export(layer: &VectorLayer, path: impl AsRef<Path>, format: ExportFormat) -> MapResult<()> {
    let path = path.as_ref();
    let bytes = to_bytes(layer, format)?;

    write_atomic(path, &bytes)
        .map_err(|e| MapError::Io(format!("writing {}: {}", path.display(), e)))?;

    info!(bytes = bytes.len(), format = %format, "Exported vector layer");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Encode `layer` in `format`, as offered for download.
pub fn to_bytes(layer: &VectorLayer, format: ExportFormat) -> MapResult<Vec<u8>> {
    let features: Vec<Feature> = layer.records().iter().map(to_feature).collect();

    match format {
        ExportFormat::GeoJson => {
            let collection = FeatureCollection {
                bbox: None,
                features,
                foreign_members: Some(crs_member(layer.crs())),
            };
            Ok(serde_json::to_vec_pretty(&collection)?)
        }
        ExportFormat::GeoJsonSeq => {
            let mut out = Vec::new();
            for feature in &features {
                out.push(RS);
                out.extend(serde_json::to_vec(feature)?);
                out.push(b'\n');
            }
            Ok(out)
        }
    }
}

fn to_feature(record: &PolygonRecord) -> Feature {
    let geometry: geo_types::Geometry<f64> = (&record.geometry).into();
    let mut properties = JsonObject::new();
    properties.insert(CLASS_PROPERTY.to_string(), json!(record.class_value));

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn crs_member(crs: Crs) -> JsonObject {
    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": crs.to_string() } }),
    );
    members
}

/// Read a layer written by [`export`] in either format.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read(path: impl AsRef<Path>) -> MapResult<VectorLayer> {
    let bytes = std::fs::read(path.as_ref())?;
    from_bytes(&bytes)
}

/// Decode a FeatureCollection, a single Feature, or a text sequence.
pub fn from_bytes(bytes: &[u8]) -> MapResult<VectorLayer> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| MapError::format(format!("export is not UTF-8: {}", e)))?;

    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    let records = if first == Some(&RS) {
        read_sequence(text)?
    } else {
        read_document(text)?
    };
    debug!(records = records.len(), "Decoded vector layer");
    Ok(VectorLayer::new(records))
}

fn read_sequence(text: &str) -> MapResult<Vec<PolygonRecord>> {
    text.split(RS as char)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let feature: Feature = serde_json::from_str(s)?;
            from_feature(feature)
        })
        .collect()
}

fn read_document(text: &str) -> MapResult<Vec<PolygonRecord>> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| MapError::format(e.to_string()))?;

    match geojson {
        GeoJson::FeatureCollection(collection) => {
            check_crs(collection.foreign_members.as_ref())?;
            collection.features.into_iter().map(from_feature).collect()
        }
        GeoJson::Feature(feature) => Ok(vec![from_feature(feature)?]),
        GeoJson::Geometry(_) => Err(MapError::format(
            "bare geometry has no class_value; expected features",
        )),
    }
}

fn check_crs(members: Option<&JsonObject>) -> MapResult<()> {
    let Some(crs) = members.and_then(|m| m.get("crs")) else {
        return Ok(());
    };
    let name = crs
        .pointer("/properties/name")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    match Crs::parse(name) {
        Some(Crs::Epsg4326) => Ok(()),
        None => Err(MapError::format(format!("unsupported crs '{}'", name))),
    }
}

fn from_feature(feature: Feature) -> MapResult<PolygonRecord> {
    let class_value = feature
        .property(CLASS_PROPERTY)
        .and_then(JsonValue::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| MapError::format("feature is missing an integer class_value"))?;

    let geometry = feature
        .geometry
        .ok_or_else(|| MapError::format("feature has no geometry"))?;
    let geometry = geo_types::Geometry::<f64>::try_from(geometry.value)
        .map_err(|e| MapError::format(e.to_string()))?;
    let geometry = Shape::from_geometry(geometry)
        .ok_or_else(|| MapError::format("feature geometry is not polygonal"))?;

    Ok(PolygonRecord {
        geometry,
        class_value,
    })
}
