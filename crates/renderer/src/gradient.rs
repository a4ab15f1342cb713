//! Gradient rendering of normalized rasters.

use std::path::Path;

use map_common::{BoundingBox, MapError, MapResult, Raster};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::overlay::OverlayLayer;
use crate::png::create_png_auto;
use crate::style::hex_to_rgb;

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS colour keyword or a `#rrggbb` hex string.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.starts_with('#') {
            return hex_to_rgb(name).map(|(r, g, b)| Self::rgb(r, g, b));
        }
        let lower = name.to_ascii_lowercase();
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, c)| *c)
    }

    /// `#rrggbb`, alpha dropped.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// CSS level-1 keywords plus the handful of extended names commonly used in
/// visualization palettes.
const NAMED_COLORS: &[(&str, Color)] = &[
    ("black", Color::rgb(0, 0, 0)),
    ("white", Color::rgb(255, 255, 255)),
    ("gray", Color::rgb(128, 128, 128)),
    ("grey", Color::rgb(128, 128, 128)),
    ("silver", Color::rgb(192, 192, 192)),
    ("red", Color::rgb(255, 0, 0)),
    ("maroon", Color::rgb(128, 0, 0)),
    ("darkred", Color::rgb(139, 0, 0)),
    ("orange", Color::rgb(255, 165, 0)),
    ("yellow", Color::rgb(255, 255, 0)),
    ("olive", Color::rgb(128, 128, 0)),
    ("lime", Color::rgb(0, 255, 0)),
    ("green", Color::rgb(0, 128, 0)),
    ("teal", Color::rgb(0, 128, 128)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("aqua", Color::rgb(0, 255, 255)),
    ("blue", Color::rgb(0, 0, 255)),
    ("navy", Color::rgb(0, 0, 128)),
    ("purple", Color::rgb(128, 0, 128)),
    ("magenta", Color::rgb(255, 0, 255)),
    ("fuchsia", Color::rgb(255, 0, 255)),
    ("pink", Color::rgb(255, 192, 203)),
    ("brown", Color::rgb(165, 42, 42)),
];

/// Linear color interpolation, `t` clamped to [0, 1].
pub fn interpolate_color(from: Color, to: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;

    Color::new(
        mix(from.r, to.r),
        mix(from.g, to.g),
        mix(from.b, to.b),
        mix(from.a, to.a),
    )
}

/// Ordered colour stops spread evenly over [0, 1].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    stops: Vec<Color>,
}

impl Palette {
    pub fn new(stops: Vec<Color>) -> MapResult<Self> {
        if stops.is_empty() {
            return Err(MapError::format("palette needs at least one colour"));
        }
        Ok(Self { stops })
    }

    /// Build a palette from colour names or hex strings.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> MapResult<Self> {
        let stops = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Color::parse(name)
                    .ok_or_else(|| MapError::format(format!("unknown colour '{}'", name)))
            })
            .collect::<MapResult<Vec<_>>>()?;
        Self::new(stops)
    }

    pub fn stops(&self) -> &[Color] {
        &self.stops
    }

    /// Colour at position `t` along the palette.
    pub fn color_at(&self, t: f32) -> Color {
        let last = self.stops.len() - 1;
        if last == 0 {
            return self.stops[0];
        }
        let pos = t.clamp(0.0, 1.0) * last as f32;
        let lower = (pos.floor() as usize).min(last - 1);
        interpolate_color(self.stops[lower], self.stops[lower + 1], pos - lower as f32)
    }
}

/// An RGBA rendering of a raster, aligned to its geographic bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    bounds: BoundingBox,
    opacity: f32,
}

impl ImageOverlay {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// RGBA bytes, row-major, north row first.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn pixel(&self, col: usize, row: usize) -> Option<Color> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let i = (row * self.width + col) * 4;
        Some(Color::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ))
    }

    pub fn to_png(&self) -> MapResult<Vec<u8>> {
        create_png_auto(&self.pixels, self.width, self.height)
    }

    pub fn write_png(&self, path: impl AsRef<Path>) -> MapResult<()> {
        let png = self.to_png()?;
        std::fs::write(path.as_ref(), png)?;
        debug!(path = %path.as_ref().display(), "Wrote overlay image");
        Ok(())
    }

    /// Map layer referencing the encoded image at `url`.
    pub fn into_layer(self, name: impl Into<String>, url: impl Into<String>) -> OverlayLayer {
        OverlayLayer::Image {
            name: name.into(),
            url: url.into(),
            bounds: self.bounds.to_lat_lon_corners(),
            opacity: self.opacity,
        }
    }
}

/// Render a normalized raster through `palette`.
///
/// Values are clamped to [0, 1]; missing cells become fully transparent.
#[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
pub fn render_raster_overlay(
    raster: &Raster,
    palette: &Palette,
    opacity: f32,
) -> MapResult<ImageOverlay> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(MapError::invalid_parameter(
            "opacity",
            format!("{} is outside [0, 1]", opacity),
        ));
    }

    let mut pixels = vec![0u8; raster.len() * 4];
    pixels
        .par_chunks_mut(4)
        .zip(raster.data().par_iter())
        .for_each(|(px, &value)| {
            let color = if value.is_nan() {
                Color::transparent()
            } else {
                palette.color_at(value)
            };
            px.copy_from_slice(&color.to_bytes());
        });

    Ok(ImageOverlay {
        width: raster.width(),
        height: raster.height(),
        pixels,
        bounds: raster.bounds(),
        opacity,
    })
}
