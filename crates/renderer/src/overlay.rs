//! Declarative map layers and the document that bundles them for display.

use std::path::Path;

use classifier::VectorLayer;
use geo_types::Geometry;
use map_common::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::style::ShapeStyle;

/// Highest zoom level the tile widget supports.
pub const MAX_ZOOM: u8 = 22;

/// One polygon record ready for client-side drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledShape {
    pub geometry: geojson::Geometry,
    pub style: ShapeStyle,
    pub class_value: u32,
}

/// A layer the map widget can draw on top of its base map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayLayer {
    /// Externally rendered XYZ tiles.
    Tiles {
        name: String,
        url_template: String,
        attribution: String,
    },
    /// A single image stretched over `bounds` (`[[south, west], [north, east]]`).
    Image {
        name: String,
        url: String,
        bounds: [[f64; 2]; 2],
        opacity: f32,
    },
    Shapes {
        name: String,
        shapes: Vec<StyledShape>,
    },
}

impl OverlayLayer {
    pub fn tiles(
        name: impl Into<String>,
        url_template: impl Into<String>,
        attribution: impl Into<String>,
    ) -> Self {
        OverlayLayer::Tiles {
            name: name.into(),
            url_template: url_template.into(),
            attribution: attribution.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OverlayLayer::Tiles { name, .. }
            | OverlayLayer::Image { name, .. }
            | OverlayLayer::Shapes { name, .. } => name,
        }
    }

    /// Same layer under a different display name.
    pub fn named(mut self, new_name: impl Into<String>) -> Self {
        match &mut self {
            OverlayLayer::Tiles { name, .. }
            | OverlayLayer::Image { name, .. }
            | OverlayLayer::Shapes { name, .. } => *name = new_name.into(),
        }
        self
    }
}

/// Emit one styled shape per record, in record order.
///
/// `style_fn` receives only the record's class value, so every shape's style
/// depends on its own class and nothing else.
pub fn render_vector_overlay<F>(layer: &VectorLayer, style_fn: F) -> OverlayLayer
where
    F: Fn(u32) -> ShapeStyle,
{
    let shapes: Vec<StyledShape> = layer
        .records()
        .iter()
        .map(|record| {
            let geometry: Geometry<f64> = (&record.geometry).into();
            StyledShape {
                geometry: geojson::Geometry::new(geojson::Value::from(&geometry)),
                style: style_fn(record.class_value),
                class_value: record.class_value,
            }
        })
        .collect();
    debug!(shapes = shapes.len(), "Rendered vector overlay");

    OverlayLayer::Shapes {
        name: "Classes".to_string(),
        shapes,
    }
}

/// Viewport plus overlay layers, serialized as JSON for the map widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: Vec<OverlayLayer>,
    /// Show the widget's layer toggle.
    #[serde(default = "default_layer_control")]
    pub layer_control: bool,
}

fn default_layer_control() -> bool {
    true
}

impl MapDocument {
    pub fn new(center_lat: f64, center_lon: f64, zoom: u8) -> MapResult<Self> {
        if !(-90.0..=90.0).contains(&center_lat) || !(-180.0..=180.0).contains(&center_lon) {
            return Err(MapError::invalid_parameter(
                "center",
                format!("({}, {}) is not a valid lat/lon", center_lat, center_lon),
            ));
        }
        if zoom > MAX_ZOOM {
            return Err(MapError::invalid_parameter(
                "zoom",
                format!("{} exceeds {}", zoom, MAX_ZOOM),
            ));
        }
        Ok(Self {
            center: [center_lat, center_lon],
            zoom,
            layers: Vec::new(),
            layer_control: true,
        })
    }

    pub fn with_layer(mut self, layer: OverlayLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn push_layer(&mut self, layer: OverlayLayer) {
        self.layers.push(layer);
    }

    pub fn to_json(&self) -> MapResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> MapResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> MapResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), layers = self.layers.len(), "Wrote map document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_tagged_by_type() {
        let layer = OverlayLayer::tiles("S5P CO", "https://t/{z}/{x}/{y}", "Imagery API");
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["type"], "tiles");
        assert_eq!(json["url_template"], "https://t/{z}/{x}/{y}");
    }

    #[test]
    fn test_named_renames() {
        let layer = OverlayLayer::tiles("a", "u", "x").named("b");
        assert_eq!(layer.name(), "b");
    }

    #[test]
    fn test_rejects_bad_viewport() {
        assert_eq!(
            MapDocument::new(95.0, 0.0, 4).unwrap_err().kind(),
            "InvalidParameter"
        );
        assert!(MapDocument::new(0.0, 0.0, 23).is_err());
        assert!(MapDocument::new(-4.28, -25.01, 4).is_ok());
    }
}
