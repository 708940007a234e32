//! Synthetic fixture builders for tests.
//!
//! Every fixture is built in memory, byte by byte, so tests never depend
//! on binary files in the repository. The builders produce minimal but
//! structurally valid containers: real signatures, real lengths, real
//! CRCs.

use crate::tags::Group;
use crate::tiff::{encode, DirectoryStore};
use crate::value::{ByteOrder, ExifAttribute, Rational};

/// `Exif\0\0` identifier shared by JPEG APP1, PNG eXIf and WebP EXIF
pub const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

/// Smallest JPEG the scanner accepts: SOI directly followed by EOI
pub fn minimal_jpeg() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xD9]
}

/// A TIFF block with a single Orientation entry
pub fn tiff_with_orientation(orientation: u16) -> Vec<u8> {
    let order = ByteOrder::LittleEndian;
    let mut store = DirectoryStore::new();
    store.set(
        Group::Primary,
        "Orientation",
        ExifAttribute::ushort(&[orientation], order),
    );
    encode(&store, order, None).expect("static fixture encodes")
}

/// A TIFF block exercising several groups: primary description tags, an
/// EXIF sub-directory with rationals, and a GPS directory.
pub fn sample_tiff() -> Vec<u8> {
    sample_tiff_with_orientation(1)
}

/// The sample block with a chosen orientation value
pub fn sample_tiff_with_orientation(orientation: u16) -> Vec<u8> {
    let order = ByteOrder::LittleEndian;
    let mut store = DirectoryStore::new();
    store.set(
        Group::Primary,
        "Orientation",
        ExifAttribute::ushort(&[orientation], order),
    );
    store.set(Group::Primary, "Make", ExifAttribute::ascii("ACME Cameras"));
    store.set(Group::Primary, "Model", ExifAttribute::ascii("Model 100"));
    store.set(
        Group::Exif,
        "FNumber",
        ExifAttribute::urational(&[Rational::new(28, 10)], order),
    );
    store.set(
        Group::Exif,
        "ExposureTime",
        ExifAttribute::urational(&[Rational::new(1, 250)], order),
    );
    store.set(
        Group::Exif,
        "PhotographicSensitivity",
        ExifAttribute::ushort(&[200], order),
    );
    store.set(
        Group::Gps,
        "GPSTimeStamp",
        ExifAttribute::urational(
            &[
                Rational::new(11, 1),
                Rational::new(5, 1),
                Rational::new(32, 1),
            ],
            order,
        ),
    );
    encode(&store, order, None).expect("static fixture encodes")
}

/// Wrap a TIFF block into a JPEG APP1 marker segment
pub fn jpeg_app1_exif(tiff: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xE1];
    let length = (2 + EXIF_IDENTIFIER.len() + tiff.len()) as u16;
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(EXIF_IDENTIFIER);
    out.extend_from_slice(tiff);
    out
}

/// A JPEG holding the given TIFF block and nothing else
pub fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(&jpeg_app1_exif(tiff));
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// A fuller JPEG: quantization table, frame header, and a scan with image
/// data, optionally preceded by an EXIF APP1. The scan payload is a fixed
/// recognizable pattern for byte-preservation assertions.
pub fn jpeg_with_scan(tiff: Option<&[u8]>) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    if let Some(tiff) = tiff {
        out.extend_from_slice(&jpeg_app1_exif(tiff));
    }

    // DQT with a ramp table
    out.extend_from_slice(&[0xFF, 0xDB]);
    out.extend_from_slice(&67u16.to_be_bytes());
    out.push(0);
    out.extend((0u8..64).map(|v| v + 1));

    // SOF0: 8-bit 16x16, one component
    out.extend_from_slice(&[0xFF, 0xC0]);
    out.extend_from_slice(&11u16.to_be_bytes());
    out.push(8);
    out.extend_from_slice(&16u16.to_be_bytes());
    out.extend_from_slice(&16u16.to_be_bytes());
    out.push(1);
    out.extend_from_slice(&[0x01, 0x11, 0x00]);

    // SOS header + fake entropy-coded data
    out.extend_from_slice(&[0xFF, 0xDA]);
    out.extend_from_slice(&8u16.to_be_bytes());
    out.extend_from_slice(&[1, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(b"\x12\x34\x56\x78\x9A\xBC\xDE\xF0scan-data");
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// CRC-32 as PNG defines it, over chunk type + data
pub fn png_crc(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFF_u32;
    for &byte in chunk_type.iter().chain(data) {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc ^ 0xFFFFFFFF
}

/// One PNG chunk with computed CRC
pub fn png_chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&png_crc(chunk_type, data).to_be_bytes());
    out
}

/// A structurally valid PNG: signature, IHDR, one IDAT, IEND
pub fn minimal_png() -> Vec<u8> {
    png_with_chunks(&[])
}

/// A PNG holding the given TIFF block in an eXIf chunk
pub fn png_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut data = EXIF_IDENTIFIER.to_vec();
    data.extend_from_slice(tiff);
    png_with_chunks(&[png_chunk(b"eXIf", &data)])
}

fn png_with_chunks(extra: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    // IHDR: 16x16, 8-bit grayscale
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&16u32.to_be_bytes());
    ihdr.extend_from_slice(&16u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);
    out.extend_from_slice(&png_chunk(b"IHDR", &ihdr));
    for chunk in extra {
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&png_chunk(b"IDAT", b"\x08\x1D\x01\x02\x00\xFD\xFF"));
    out.extend_from_slice(&png_chunk(b"IEND", &[]));
    out
}

/// One RIFF sub-chunk with padding applied
pub fn webp_chunk(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len() + 1);
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// A minimal lossy VP8 frame header for a 4x4 image
pub fn vp8_frame() -> Vec<u8> {
    let mut payload = vec![0x00, 0x00, 0x00];
    payload.extend_from_slice(&[0x9D, 0x01, 0x2A]);
    payload.extend_from_slice(&4u16.to_le_bytes());
    payload.extend_from_slice(&4u16.to_le_bytes());
    payload
}

/// A WebP file from the given chunks, RIFF size computed
pub fn webp_with_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = chunks.iter().flatten().copied().collect();
    let mut out = Vec::with_capacity(12 + body.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);
    out
}

/// A plain WebP with one VP8 image chunk
pub fn minimal_webp() -> Vec<u8> {
    webp_with_chunks(&[webp_chunk(b"VP8 ", &vp8_frame())])
}

/// A WebP declaring and carrying the given TIFF block in an EXIF chunk
pub fn webp_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut vp8x = vec![0x08, 0, 0, 0]; // EXIF flag
    vp8x.extend_from_slice(&3u32.to_le_bytes()[0..3]);
    vp8x.extend_from_slice(&3u32.to_le_bytes()[0..3]);

    let mut exif = EXIF_IDENTIFIER.to_vec();
    exif.extend_from_slice(tiff);

    webp_with_chunks(&[
        webp_chunk(b"VP8X", &vp8x),
        webp_chunk(b"VP8 ", &vp8_frame()),
        webp_chunk(b"EXIF", &exif),
    ])
}

/// A standalone EXIF stream: identifier + TIFF block
pub fn standalone_exif(tiff: &[u8]) -> Vec<u8> {
    let mut out = EXIF_IDENTIFIER.to_vec();
    out.extend_from_slice(tiff);
    out
}
