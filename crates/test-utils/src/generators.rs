//! Synthetic rasters with predictable values.
//!
//! Every generator uses a north-up transform anchored at
//! [`ORIGIN`] with square cells of [`CELL_SIZE`] degrees.

use map_common::{GeoTransform, Raster};

/// Upper-left corner (lon, lat) of generated rasters.
pub const ORIGIN: (f64, f64) = (-30.0, 10.0);

/// Cell size in degrees.
pub const CELL_SIZE: f64 = 0.5;

/// Transform shared by the generators.
pub fn test_transform() -> GeoTransform {
    GeoTransform::new(ORIGIN.0, ORIGIN.1, CELL_SIZE, -CELL_SIZE)
}

/// Build a raster from row-major values using [`test_transform`].
pub fn raster_from(width: usize, height: usize, data: Vec<f32>) -> Raster {
    Raster::new(width, height, data, test_transform()).expect("generator dimensions")
}

/// Every cell holds `value`.
pub fn constant_raster(width: usize, height: usize, value: f32) -> Raster {
    raster_from(width, height, vec![value; width * height])
}

/// Values rise linearly from `min` at column 0 to `max` at the last column.
pub fn gradient_raster(width: usize, height: usize, min: f32, max: f32) -> Raster {
    let mut data = Vec::with_capacity(width * height);
    let span = (width.max(2) - 1) as f32;
    for _row in 0..height {
        for col in 0..width {
            data.push(min + (max - min) * col as f32 / span);
        }
    }
    raster_from(width, height, data)
}

/// Alternating `low`/`high` cells.
///
/// Under 4-connectivity every cell is its own region.
pub fn checkerboard_raster(width: usize, height: usize, low: f32, high: f32) -> Raster {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(if (row + col) % 2 == 0 { low } else { high });
        }
    }
    raster_from(width, height, data)
}

/// A `size`x`size` block of `outer` with a centered `inner` square of
/// side `size - 2*border`.
pub fn ring_raster(size: usize, border: usize, outer: f32, inner: f32) -> Raster {
    let mut data = Vec::with_capacity(size * size);
    for row in 0..size {
        for col in 0..size {
            let inside = row >= border
                && row < size - border
                && col >= border
                && col < size - border;
            data.push(if inside { inner } else { outer });
        }
    }
    raster_from(size, size, data)
}

/// Copy of `raster` with the listed (col, row) cells set to NaN.
pub fn with_missing(raster: &Raster, cells: &[(usize, usize)]) -> Raster {
    let mut data = raster.data().to_vec();
    for &(col, row) in cells {
        data[row * raster.width() + col] = f32::NAN;
    }
    raster.with_data(data).expect("same shape")
}

/// Trace-gas-like column densities (mol/m²): a smooth plume peaking near the
/// center, in the 0..0.05 range the default visualization expects.
pub fn plume_raster(width: usize, height: usize) -> Raster {
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let scale = (width.max(height) as f32 / 2.0).max(1.0);
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let dx = (col as f32 - cx) / scale;
            let dy = (row as f32 - cy) / scale;
            data.push(0.05 * (-(dx * dx + dy * dy) * 2.0).exp());
        }
    }
    raster_from(width, height, data)
}
