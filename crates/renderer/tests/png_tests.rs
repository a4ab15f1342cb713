//! Tests for PNG encoding.
//!
//! Encoded images are walked chunk by chunk and the IDAT stream is inflated
//! with flate2 to check the stored scanlines.

use std::io::Read;

use flate2::read::ZlibDecoder;
use renderer::png::{create_png, create_png_auto, create_png_indexed};

// ============================================================================
// Helper functions
// ============================================================================

/// (type, data) for every chunk after the signature.
fn chunks(png: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    let mut pos = 8;
    while pos < png.len() {
        let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
        let kind = String::from_utf8(png[pos + 4..pos + 8].to_vec()).unwrap();
        let data = png[pos + 8..pos + 8 + len].to_vec();
        let crc = u32::from_be_bytes(png[pos + 8 + len..pos + 12 + len].try_into().unwrap());
        assert_eq!(crc, crc32fast::hash(&png[pos + 4..pos + 8 + len]), "bad CRC on {}", kind);
        out.push((kind, data));
        pos += 12 + len;
    }
    out
}

fn chunk<'a>(chunks: &'a [(String, Vec<u8>)], kind: &str) -> Option<&'a [u8]> {
    chunks.iter().find(|(k, _)| k == kind).map(|(_, d)| d.as_slice())
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

fn two_color_pixels() -> Vec<u8> {
    vec![
        255, 0, 0, 255, //
        0, 0, 0, 0, //
        0, 0, 0, 0, //
        255, 0, 0, 255,
    ]
}

// ============================================================================
// Structure tests
// ============================================================================

#[test]
fn test_signature_and_chunk_order() {
    let png = create_png_auto(&two_color_pixels(), 2, 2).unwrap();
    assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);

    let kinds: Vec<String> = chunks(&png).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec!["IHDR", "PLTE", "tRNS", "IDAT", "IEND"]);
}

#[test]
fn test_header_dimensions() {
    let pixels = vec![10u8; 7 * 3 * 4];
    let png = create_png(&pixels, 7, 3).unwrap();
    let all = chunks(&png);
    let ihdr = chunk(&all, "IHDR").unwrap();

    assert_eq!(u32::from_be_bytes(ihdr[0..4].try_into().unwrap()), 7);
    assert_eq!(u32::from_be_bytes(ihdr[4..8].try_into().unwrap()), 3);
    assert_eq!(ihdr[8], 8);
    assert_eq!(ihdr[9], 6);
}

// ============================================================================
// Indexed encoding tests
// ============================================================================

#[test]
fn test_auto_uses_indexed_for_few_colors() {
    let png = create_png_auto(&two_color_pixels(), 2, 2).unwrap();
    let all = chunks(&png);

    assert_eq!(chunk(&all, "IHDR").unwrap()[9], 3);
    assert_eq!(chunk(&all, "PLTE").unwrap(), &[255, 0, 0, 0, 0, 0]);
    assert_eq!(chunk(&all, "tRNS").unwrap(), &[255, 0]);
    assert_eq!(
        inflate(chunk(&all, "IDAT").unwrap()),
        vec![0, 0, 1, 0, 1, 0]
    );
}

#[test]
fn test_opaque_palette_has_no_trns() {
    let pixels = [0, 0, 255, 255, 0, 255, 0, 255];
    let png = create_png_auto(&pixels, 2, 1).unwrap();
    assert!(chunk(&chunks(&png), "tRNS").is_none());
}

#[test]
fn test_indexed_rejects_wrong_index_count() {
    let err = create_png_indexed(2, 2, &[[0, 0, 0, 255]], &[0, 0, 0]).unwrap_err();
    assert_eq!(err.kind(), "InvalidParameter");
}

#[test]
fn test_large_image_with_limited_palette() {
    // Above the parallel threshold
    let (w, h) = (128, 96);
    let mut pixels = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            let band = ((x + y) / 16 % 7) as u8;
            pixels.extend_from_slice(&[band * 30, 255 - band * 30, 40, 255]);
        }
    }

    let png = create_png_auto(&pixels, w, h).unwrap();
    let all = chunks(&png);
    assert_eq!(chunk(&all, "IHDR").unwrap()[9], 3);
    assert_eq!(chunk(&all, "PLTE").unwrap().len(), 7 * 3);
    assert_eq!(inflate(chunk(&all, "IDAT").unwrap()).len(), h * (w + 1));
}

// ============================================================================
// RGBA fallback tests
// ============================================================================

#[test]
fn test_auto_falls_back_to_rgba() {
    let pixels: Vec<u8> = (0..300u32)
        .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 7, 255])
        .collect();

    let png = create_png_auto(&pixels, 300, 1).unwrap();
    let all = chunks(&png);
    assert_eq!(chunk(&all, "IHDR").unwrap()[9], 6);

    let raw = inflate(chunk(&all, "IDAT").unwrap());
    assert_eq!(raw[0], 0);
    assert_eq!(&raw[1..], pixels.as_slice());
}

#[test]
fn test_rejects_mismatched_buffer() {
    assert_eq!(create_png(&[0u8; 12], 2, 2).unwrap_err().kind(), "InvalidParameter");
    assert!(create_png_auto(&[], 0, 0).is_err());
}
