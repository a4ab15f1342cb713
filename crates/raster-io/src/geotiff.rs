//! GeoTIFF decoding without a GDAL dependency.
//!
//! Georeferencing is taken from ModelPixelScale + ModelTiepoint, or from
//! ModelTransformation. Samples equal to the GDAL_NODATA tag become NaN.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use map_common::{GeoTransform, MapError, MapResult, Raster};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, instrument, warn};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GDAL_NODATA: u16 = 42113;

/// Load band 1 of a GeoTIFF.
pub fn load<P: AsRef<Path>>(path: P) -> MapResult<Raster> {
    load_band(path, 1)
}

/// Load a 1-based band of a GeoTIFF.
#[instrument(skip_all, fields(path = %path.as_ref().display(), band = band))]
pub fn load_band<P: AsRef<Path>>(path: P, band: usize) -> MapResult<Raster> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MapError::ResourceNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    let raster = decode(BufReader::new(file), band)?;
    debug!(
        width = raster.width(),
        height = raster.height(),
        valid = raster.valid_count(),
        "Loaded raster"
    );
    Ok(raster)
}

/// Decode band 1 of a GeoTIFF held in memory, e.g. an upload.
pub fn load_bytes(bytes: &[u8]) -> MapResult<Raster> {
    decode(Cursor::new(bytes), 1)
}

fn tiff_error(context: &str, err: tiff::TiffError) -> MapError {
    match err {
        tiff::TiffError::IoError(io) => io.into(),
        other => MapError::format(format!("{}: {}", context, other)),
    }
}

fn samples_per_pixel(color: ColorType) -> MapResult<usize> {
    let count = match color {
        ColorType::Gray(_) | ColorType::Palette(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        ColorType::Multiband { num_samples, .. } => num_samples as usize,
        other => {
            return Err(MapError::format(format!(
                "unsupported TIFF color type {:?}",
                other
            )))
        }
    };
    Ok(count)
}

/// Pull one band out of an interleaved buffer as f32.
macro_rules! band_samples {
    ($buf:expr, $samples:expr, $band:expr) => {
        $buf.iter()
            .skip($band)
            .step_by($samples)
            .map(|&v| v as f32)
            .collect::<Vec<f32>>()
    };
}

fn decode<R: Read + Seek>(reader: R, band: usize) -> MapResult<Raster> {
    let mut decoder = Decoder::new(reader).map_err(|e| tiff_error("not a TIFF file", e))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| tiff_error("cannot read dimensions", e))?;
    let (width, height) = (width as usize, height as usize);

    let color = decoder
        .colortype()
        .map_err(|e| tiff_error("cannot read color type", e))?;
    let samples = samples_per_pixel(color)?;
    if band == 0 || band > samples {
        return Err(MapError::invalid_parameter(
            "band",
            format!("band {} requested, file has {}", band, samples),
        ));
    }
    let offset = band - 1;

    let image = decoder
        .read_image()
        .map_err(|e| tiff_error("cannot read image data", e))?;

    let mut data = match image {
        DecodingResult::U8(buf) => band_samples!(buf, samples, offset),
        DecodingResult::U16(buf) => band_samples!(buf, samples, offset),
        DecodingResult::U32(buf) => band_samples!(buf, samples, offset),
        DecodingResult::U64(buf) => band_samples!(buf, samples, offset),
        DecodingResult::I8(buf) => band_samples!(buf, samples, offset),
        DecodingResult::I16(buf) => band_samples!(buf, samples, offset),
        DecodingResult::I32(buf) => band_samples!(buf, samples, offset),
        DecodingResult::I64(buf) => band_samples!(buf, samples, offset),
        DecodingResult::F32(buf) => band_samples!(buf, samples, offset),
        DecodingResult::F64(buf) => band_samples!(buf, samples, offset),
        #[allow(unreachable_patterns)]
        _ => return Err(MapError::format("unsupported TIFF sample format")),
    };

    if let Some(nodata) = read_nodata(&mut decoder) {
        let mut masked = 0usize;
        for v in data.iter_mut() {
            if *v == nodata {
                *v = f32::NAN;
                masked += 1;
            }
        }
        debug!(nodata, masked, "Applied nodata mask");
    }

    let transform = match read_geotransform(&mut decoder)? {
        Some(transform) => transform,
        None => {
            warn!("TIFF carries no georeferencing tags, using pixel coordinates");
            GeoTransform::identity()
        }
    };

    Raster::new(width, height, data, transform)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    let text = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    if value.is_nan() {
        // NaN samples are already missing
        return None;
    }
    Some(value as f32)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> MapResult<Option<GeoTransform>> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .ok();
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            let transform = GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]);
            transform.validate()?;
            return Ok(Some(transform));
        }
        return Err(MapError::format("truncated pixel scale or tiepoint tag"));
    }

    if let Ok(matrix) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
        if matrix.len() < 16 {
            return Err(MapError::format("truncated model transformation tag"));
        }
        // Row-major 4x4: [a b 0 d; e f 0 h; ...]
        let coeffs = [matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5]];
        return GeoTransform::from_gdal(coeffs).map(Some);
    }

    Ok(None)
}
