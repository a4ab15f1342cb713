//! Shape styling for classified polygon overlays.

use serde::{Deserialize, Serialize};

use crate::gradient::{interpolate_color, Color};

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Per-shape style understood by the map widget (Leaflet path options).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    pub fill_color: String,
    /// Stroke colour.
    pub color: String,
    pub weight: f32,
    pub fill_opacity: f32,
}

impl ShapeStyle {
    /// Thin black outline, half-transparent fill.
    pub fn filled(fill: Color) -> Self {
        Self {
            fill_color: fill.to_hex(),
            color: "#000000".to_string(),
            weight: 1.0,
            fill_opacity: 0.5,
        }
    }
}

/// Linear colour ramp over class indices `0..class_count`.
///
/// Classes beyond the last index take the `high` colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassRamp {
    pub low: Color,
    pub high: Color,
    pub class_count: u32,
}

impl ClassRamp {
    pub fn new(low: Color, high: Color, class_count: u32) -> Self {
        Self {
            low,
            high,
            class_count,
        }
    }

    /// Red-to-blue ramp.
    pub fn red_to_blue(class_count: u32) -> Self {
        Self::new(Color::rgb(255, 0, 0), Color::rgb(0, 0, 255), class_count)
    }

    pub fn fill(&self, class_value: u32) -> Color {
        if self.class_count <= 1 {
            return self.low;
        }
        let last = self.class_count - 1;
        let t = class_value.min(last) as f32 / last as f32;
        interpolate_color(self.low, self.high, t)
    }

    pub fn style(&self, class_value: u32) -> ShapeStyle {
        ShapeStyle::filled(self.fill(class_value))
    }
}
