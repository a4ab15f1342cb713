//! PNG encoding for RGBA overlays.
//!
//! Two color types are written:
//! - **Indexed (type 3)** when the image has at most 256 distinct RGBA values,
//!   which is the common case for palette-rendered overlays
//! - **Truecolor with alpha (type 6)** otherwise
//!
//! [`create_png_auto`] picks between them.

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use map_common::{MapError, MapResult};
use rayon::prelude::*;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum entries in a PLTE chunk
const MAX_PALETTE_SIZE: usize = 256;

/// Pixel count above which palette extraction runs in parallel
const PARALLEL_THRESHOLD: usize = 4096;

type Rgba = [u8; 4];

/// Encode RGBA pixels, choosing indexed output when the colours fit.
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> MapResult<Vec<u8>> {
    check_dimensions(pixels, width, height)?;

    let extracted = if width * height >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette(pixels)
    };

    match extracted {
        Some((palette, indices)) => create_png_indexed(width, height, &palette, &indices),
        None => create_png(pixels, width, height),
    }
}

/// Encode RGBA pixels as a type 6 PNG.
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> MapResult<Vec<u8>> {
    check_dimensions(pixels, width, height)?;

    let mut png = SIGNATURE.to_vec();
    write_chunk(&mut png, b"IHDR", &header(width, height, 6));
    let idat = deflate_scanlines(pixels, width * 4, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Encode palette indices as a type 3 PNG, with a tRNS chunk when any entry
/// is not fully opaque.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[Rgba],
    indices: &[u8],
) -> MapResult<Vec<u8>> {
    if palette.is_empty() || palette.len() > MAX_PALETTE_SIZE {
        return Err(MapError::invalid_parameter(
            "palette",
            format!("{} entries, expected 1..={}", palette.len(), MAX_PALETTE_SIZE),
        ));
    }
    if indices.len() != width * height {
        return Err(MapError::invalid_parameter(
            "indices",
            format!("{} indices for a {}x{} image", indices.len(), width, height),
        ));
    }

    let mut png = SIGNATURE.to_vec();
    write_chunk(&mut png, b"IHDR", &header(width, height, 3));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(indices, width, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn check_dimensions(pixels: &[u8], width: usize, height: usize) -> MapResult<()> {
    if width == 0 || height == 0 {
        return Err(MapError::invalid_parameter(
            "dimensions",
            format!("{}x{} image has no pixels", width, height),
        ));
    }
    if pixels.len() != width * height * 4 {
        return Err(MapError::invalid_parameter(
            "pixels",
            format!(
                "{} bytes for a {}x{} RGBA image",
                pixels.len(),
                width,
                height
            ),
        ));
    }
    Ok(())
}

fn header(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    ihdr[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    ihdr[8] = 8; // bit depth
    ihdr[9] = color_type;
    // compression, filter and interlace methods all zero
    ihdr
}

fn pixel(chunk: &[u8]) -> Rgba {
    [chunk[0], chunk[1], chunk[2], chunk[3]]
}

fn extract_palette(pixels: &[u8]) -> Option<(Vec<Rgba>, Vec<u8>)> {
    let mut lookup: HashMap<Rgba, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let color = pixel(chunk);
        let index = match lookup.get(&color) {
            Some(&i) => i,
            None => {
                if palette.len() == MAX_PALETTE_SIZE {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, i);
                i
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Collect per-chunk colour sets in parallel, merge them in chunk order so
/// the palette is deterministic, then map pixels to indices in parallel.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<Rgba>, Vec<u8>)> {
    let pixels_per_chunk = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let per_chunk: Vec<Option<Vec<Rgba>>> = pixels
        .par_chunks(pixels_per_chunk * 4)
        .map(|chunk| {
            let mut seen: Vec<Rgba> = Vec::new();
            let mut set: HashMap<Rgba, ()> = HashMap::new();
            for px in chunk.chunks_exact(4) {
                let color = pixel(px);
                if set.insert(color, ()).is_none() {
                    seen.push(color);
                    if seen.len() > MAX_PALETTE_SIZE {
                        return None;
                    }
                }
            }
            Some(seen)
        })
        .collect();

    let mut lookup: HashMap<Rgba, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for colors in per_chunk {
        for color in colors? {
            if lookup.contains_key(&color) {
                continue;
            }
            if palette.len() == MAX_PALETTE_SIZE {
                return None;
            }
            lookup.insert(color, palette.len() as u8);
            palette.push(color);
        }
    }

    let indices: Vec<u8> = pixels
        .par_chunks_exact(4)
        .map(|px| lookup.get(&pixel(px)).copied().unwrap_or(0))
        .collect();

    Some((palette, indices))
}

/// Prefix each `stride`-byte row with filter type 0 and zlib-compress.
fn deflate_scanlines(data: &[u8], stride: usize, height: usize) -> MapResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (stride + 1));
    for row in data.chunks_exact(stride).take(height) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let compression_error = |e: std::io::Error| MapError::Io(format!("IDAT compression failed: {}", e));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&raw).map_err(compression_error)?;
    encoder.finish().map_err(compression_error)
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}
