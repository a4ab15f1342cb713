//! GeoTIFF fixtures and common extents for tracemap tests.

use std::fs::File;
use std::path::{Path, PathBuf};

use map_common::Raster;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::TiffResult;

/// Common bounding boxes as (west, south, east, north).
pub mod bbox {
    /// Global extent
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Tropical Atlantic around the default map center
    pub const TROPICAL_ATLANTIC: (f64, f64, f64, f64) = (-45.0, -20.0, -5.0, 12.0);

    /// Invalid bbox (west > east)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// How to georeference a fixture file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Georef {
    /// ModelPixelScale + ModelTiepoint
    TiePoint,
    /// ModelTransformation 4x4 matrix
    Matrix,
    /// No georeferencing tags
    None,
}

/// Write `raster` as a 32-bit float GeoTIFF.
pub fn write_geotiff(
    path: &Path,
    raster: &Raster,
    georef: Georef,
    nodata: Option<f32>,
) -> TiffResult<()> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(raster.width() as u32, raster.height() as u32)?;

    let gt = raster.transform();
    match georef {
        Georef::TiePoint => {
            let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(33550), &scale[..])?;
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(33922), &tiepoint[..])?;
        }
        Georef::Matrix => {
            let matrix = [
                gt.pixel_width, 0.0, 0.0, gt.origin_x,
                0.0, gt.pixel_height, 0.0, gt.origin_y,
                0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ];
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(34264), &matrix[..])?;
        }
        Georef::None => {}
    }

    if let Some(nodata) = nodata {
        let text = nodata.to_string();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(42113), text.as_str())?;
    }

    let data: Vec<f32> = match nodata {
        Some(nodata) => raster
            .data()
            .iter()
            .map(|v| if v.is_nan() { nodata } else { *v })
            .collect(),
        None => raster.data().to_vec(),
    };
    image.write_data(&data)
}

/// Write a three-band 8-bit GeoTIFF where band `b` (1-based) holds
/// `base + b * 10` at every cell.
pub fn write_rgb_geotiff(path: &Path, width: u32, height: u32, base: u8) -> TiffResult<()> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<colortype::RGB8>(width, height)?;
    let scale = [1.0, 1.0, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, 0.0, height as f64, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(33550), &scale[..])?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(33922), &tiepoint[..])?;

    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..(width * height) {
        data.extend_from_slice(&[base + 10, base + 20, base + 30]);
    }
    image.write_data(&data)
}

/// A temp dir plus a path inside it.
pub fn temp_path(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::constant_raster;

    #[test]
    fn test_write_geotiff_creates_file() {
        let (_dir, path) = temp_path("fixture.tif");
        write_geotiff(&path, &constant_raster(4, 3, 1.5), Georef::TiePoint, None).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert!(len > 4 * 3 * 4);
    }
}
