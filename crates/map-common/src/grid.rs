//! Georeferenced single-band rasters.

use crate::{BoundingBox, MapError, MapResult};
use serde::{Deserialize, Serialize};

/// Affine mapping from pixel-corner coordinates to geographic coordinates.
///
/// ```text
/// lon = origin_x + col * pixel_width
/// lat = origin_y + row * pixel_height
/// ```
///
/// North-up rasters have a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Longitude of the upper-left corner
    pub origin_x: f64,
    /// Latitude of the upper-left corner
    pub origin_y: f64,
    /// Cell size along a row
    pub pixel_width: f64,
    /// Cell size down a column, usually negative
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Pixel-space transform used when a file carries no georeferencing.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }

    /// Build from GDAL coefficient order
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    ///
    /// Rotated transforms are rejected.
    pub fn from_gdal(coeffs: [f64; 6]) -> MapResult<Self> {
        if coeffs[2] != 0.0 || coeffs[4] != 0.0 {
            return Err(MapError::format(format!(
                "rotated geotransforms are not supported: {:?}",
                coeffs
            )));
        }
        let transform = Self::new(coeffs[0], coeffs[3], coeffs[1], coeffs[5]);
        transform.validate()?;
        Ok(transform)
    }

    /// Convert to GDAL coefficient order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Reject zero or non-finite cell sizes.
    pub fn validate(&self) -> MapResult<()> {
        let finite = [
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite || self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(MapError::format(format!("invalid geotransform: {:?}", self)));
        }
        Ok(())
    }

    /// Geographic coordinates of a pixel corner. `(col, row)` may equal the
    /// raster width/height to address the far edges.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Geographic coordinates of a cell center.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }
}

/// A 2-D grid of samples in row-major order. Missing samples are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f32>,
    transform: GeoTransform,
}

impl Raster {
    /// Create a raster, checking that the buffer matches the dimensions.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
    ) -> MapResult<Self> {
        if width == 0 || height == 0 {
            return Err(MapError::format(format!(
                "raster dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        if data.len() != width * height {
            return Err(MapError::format(format!(
                "raster buffer has {} samples, expected {}x{}={}",
                data.len(),
                width,
                height,
                width * height
            )));
        }
        transform.validate()?;
        Ok(Self {
            width,
            height,
            data,
            transform,
        })
    }

    /// Same shape and transform, new samples.
    pub fn with_data(&self, data: Vec<f32>) -> MapResult<Self> {
        Self::new(self.width, self.height, data, self.transform)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at (col, row), `None` when out of bounds.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(self.data[row * self.width + col])
    }

    /// Number of non-missing cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Geographic extent as (west, south, east, north).
    pub fn bounds(&self) -> BoundingBox {
        let (x0, y0) = self.transform.pixel_to_geo(0.0, 0.0);
        let (x1, y1) = self
            .transform
            .pixel_to_geo(self.width as f64, self.height as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}
