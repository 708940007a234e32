//! PNG container I/O implementation

use crate::{
    error::{Error, Result},
    formats::{ExifBlob, MetadataUpdate, ParsedContainer, Updates},
    segment::{Segment, SegmentKind},
    structure::Structure,
    Container,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{copy, Read, Seek, SeekFrom, Write};

// PNG signature
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

const EXIF_CHUNK: &[u8; 4] = b"eXIf";
const ICC_CHUNK: &[u8; 4] = b"iCCP";
const ITXT_CHUNK: &[u8; 4] = b"iTXt";

// XMP keyword in iTXt chunks
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp\0";

use super::EXIF_IDENTIFIER as EXIF_SIGNATURE;

/// Get human-readable label for a PNG chunk type
fn chunk_label(chunk_type: &[u8; 4]) -> String {
    String::from_utf8_lossy(chunk_type).into_owned()
}

/// Single-pass scan of the chunk stream.
///
/// The first chunk must be `IHDR`; `eXIf`, `iCCP` and XMP-bearing `iTXt`
/// chunks have their CRC-32 verified against type plus data, and a
/// mismatch is fatal for the parse.
pub(crate) fn parse<R: Read + Seek>(source: &mut R) -> Result<ParsedContainer> {
    let mut structure = Structure::new(Container::Png);
    let mut exif: Option<ExifBlob> = None;
    let mut xmp: Option<Vec<u8>> = None;

    let mut sig = [0u8; 8];
    source.read_exact(&mut sig)?;
    if sig != PNG_SIGNATURE {
        return Err(Error::InvalidFormat("not a PNG file".into()));
    }
    structure.add_segment(Segment::new(0, 8, SegmentKind::Header, None));

    let mut offset = 8u64;
    let mut first_chunk = true;
    let mut found_iend = false;

    loop {
        let chunk_len = match source.read_u32::<BigEndian>() {
            Ok(len) => len as u64,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        let mut chunk_type = [0u8; 4];
        source.read_exact(&mut chunk_type)?;

        if first_chunk && &chunk_type != b"IHDR" {
            return Err(Error::InvalidFormat("first PNG chunk is not IHDR".into()));
        }
        first_chunk = false;

        if chunk_len > 0x7FFF_FFFF {
            return Err(Error::InvalidSegment {
                offset,
                reason: format!("chunk length too large: {chunk_len}"),
            });
        }

        let chunk_start = offset;
        let data_offset = offset + 8;
        let span = 8 + chunk_len + 4;

        let kind = match &chunk_type {
            EXIF_CHUNK => {
                let data = read_verified(source, &chunk_type, chunk_len, offset)?;
                if exif.is_none() {
                    // The identifier prefix is written by this crate but
                    // tolerated either way on read.
                    let (tiff, skip) = if data.starts_with(EXIF_SIGNATURE) {
                        (data[EXIF_SIGNATURE.len()..].to_vec(), EXIF_SIGNATURE.len())
                    } else {
                        (data, 0)
                    };
                    exif = Some(ExifBlob {
                        data: tiff,
                        base_offset: data_offset + skip as u64,
                    });
                }
                SegmentKind::Exif
            }

            ICC_CHUNK => {
                let _ = read_verified(source, &chunk_type, chunk_len, offset)?;
                SegmentKind::IccProfile
            }

            ITXT_CHUNK => {
                let keyword_len = XMP_KEYWORD.len().min(chunk_len as usize);
                let mut keyword = vec![0u8; keyword_len];
                source.read_exact(&mut keyword)?;
                if keyword == XMP_KEYWORD {
                    source.seek(SeekFrom::Start(data_offset))?;
                    let data = read_verified(source, &chunk_type, chunk_len, offset)?;
                    if xmp.is_none() {
                        xmp = extract_itxt_text(&data);
                    }
                    SegmentKind::Xmp
                } else {
                    let remaining = chunk_len - keyword_len as u64 + 4;
                    source.seek(SeekFrom::Current(remaining as i64))?;
                    SegmentKind::Other
                }
            }

            b"IEND" => {
                source.seek(SeekFrom::Current((chunk_len + 4) as i64))?;
                structure.add_segment(Segment::new(
                    chunk_start,
                    span,
                    SegmentKind::Other,
                    Some(chunk_label(&chunk_type)),
                ));
                structure.total_size = offset + span;
                found_iend = true;
                break;
            }

            b"IDAT" => {
                source.seek(SeekFrom::Current((chunk_len + 4) as i64))?;
                SegmentKind::ImageData
            }

            _ => {
                source.seek(SeekFrom::Current((chunk_len + 4) as i64))?;
                SegmentKind::Other
            }
        };

        // Metadata readers left the cursor after the CRC already; plain
        // skips did too. Re-anchor on the computed span either way.
        source.seek(SeekFrom::Start(chunk_start + span))?;
        structure.add_segment(Segment::new(
            chunk_start,
            span,
            kind,
            Some(chunk_label(&chunk_type)),
        ));
        offset += span;
    }

    if !found_iend {
        return Err(Error::InvalidFormat("PNG file missing IEND chunk".into()));
    }

    Ok(ParsedContainer {
        structure,
        exif,
        xmp,
        extras: Vec::new(),
    })
}

/// Read a chunk's data and verify its trailing CRC-32 over type + data.
fn read_verified<R: Read>(
    source: &mut R,
    chunk_type: &[u8; 4],
    chunk_len: u64,
    offset: u64,
) -> Result<Vec<u8>> {
    let mut data = vec![0u8; chunk_len as usize];
    source.read_exact(&mut data)?;
    let stored = source.read_u32::<BigEndian>()?;
    let computed = calculate_crc(chunk_type, &data);
    if stored != computed {
        return Err(Error::InvalidSegment {
            offset,
            reason: format!(
                "{} chunk CRC mismatch: stored {stored:#010X}, computed {computed:#010X}",
                chunk_label(chunk_type)
            ),
        });
    }
    Ok(data)
}

/// Pull the text field out of an XMP iTXt payload: keyword, compression
/// flag and method, then NUL-terminated language tag and translated
/// keyword precede the text.
fn extract_itxt_text(data: &[u8]) -> Option<Vec<u8>> {
    let mut pos = XMP_KEYWORD.len() + 2;
    for _ in 0..2 {
        while *data.get(pos)? != 0 {
            pos += 1;
        }
        pos += 1;
    }
    Some(data[pos..].to_vec())
}

/// Calculate CRC32 for a PNG chunk
fn calculate_crc(chunk_type: &[u8], data: &[u8]) -> u32 {
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

/// Write a PNG chunk with freshly computed CRC
fn write_chunk<W: Write>(writer: &mut W, chunk_type: &[u8; 4], data: &[u8]) -> Result<()> {
    writer.write_u32::<BigEndian>(data.len() as u32)?;
    writer.write_all(chunk_type)?;
    writer.write_all(data)?;
    writer.write_u32::<BigEndian>(calculate_crc(chunk_type, data))?;
    Ok(())
}

/// Write the EXIF TIFF block as an eXIf chunk
fn write_exif_chunk<W: Write>(writer: &mut W, exif: &[u8]) -> Result<()> {
    let mut data = Vec::with_capacity(EXIF_SIGNATURE.len() + exif.len());
    data.extend_from_slice(EXIF_SIGNATURE);
    data.extend_from_slice(exif);
    write_chunk(writer, EXIF_CHUNK, &data)
}

/// Write XMP as an iTXt chunk
fn write_xmp_chunk<W: Write>(writer: &mut W, xmp: &[u8]) -> Result<()> {
    let mut data = Vec::with_capacity(XMP_KEYWORD.len() + 4 + xmp.len());
    data.extend_from_slice(XMP_KEYWORD);
    data.push(0); // compression flag
    data.push(0); // compression method
    data.push(0); // language tag (empty)
    data.push(0); // translated keyword (empty)
    data.extend_from_slice(xmp);
    write_chunk(writer, ITXT_CHUNK, &data)
}

/// Rewrite the chunk stream. A fresh eXIf chunk replaces the old one in
/// place, or is inserted right after IHDR when the file had none; every
/// other chunk is copied verbatim with only the new chunk's CRC computed.
pub(crate) fn splice<R: Read + Seek, W: Write>(
    structure: &Structure,
    source: &mut R,
    writer: &mut W,
    updates: &Updates,
) -> Result<()> {
    writer.write_all(PNG_SIGNATURE)?;

    let had_exif = structure.exif_index().is_some();
    let mut current_read_pos = 0u64;

    for segment in structure.segments() {
        match segment.kind {
            SegmentKind::Header => continue,

            SegmentKind::Exif => match &updates.exif {
                MetadataUpdate::Set(exif) => write_exif_chunk(writer, exif)?,
                MetadataUpdate::Remove => {}
                MetadataUpdate::Keep => {
                    copy_segment(segment, source, writer, &mut current_read_pos)?
                }
            },

            SegmentKind::Xmp => match &updates.xmp {
                MetadataUpdate::Set(xmp) => write_xmp_chunk(writer, xmp)?,
                MetadataUpdate::Remove => {}
                MetadataUpdate::Keep => {
                    copy_segment(segment, source, writer, &mut current_read_pos)?
                }
            },

            SegmentKind::IccProfile => {
                if matches!(updates.icc, MetadataUpdate::Keep) {
                    copy_segment(segment, source, writer, &mut current_read_pos)?;
                }
            }

            _ => {
                copy_segment(segment, source, writer, &mut current_read_pos)?;
                if segment.has_label("IHDR") && !had_exif {
                    if let MetadataUpdate::Set(exif) = &updates.exif {
                        write_exif_chunk(writer, exif)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn copy_segment<R: Read + Seek, W: Write>(
    segment: &Segment,
    source: &mut R,
    writer: &mut W,
    current_read_pos: &mut u64,
) -> Result<()> {
    if *current_read_pos != segment.range.offset {
        source.seek(SeekFrom::Start(segment.range.offset))?;
        *current_read_pos = segment.range.offset;
    }
    let mut limited = source.take(segment.range.size);
    copy(&mut limited, writer)?;
    *current_read_pos += segment.range.size;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk_type);
        out.extend_from_slice(data);
        out.extend_from_slice(&calculate_crc(chunk_type, data).to_be_bytes());
        out
    }

    fn minimal_png(extra_chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&build_chunk(b"IHDR", &[0u8; 13]));
        for chunk in extra_chunks {
            png.extend_from_slice(chunk);
        }
        png.extend_from_slice(&build_chunk(b"IDAT", &[0u8; 4]));
        png.extend_from_slice(&build_chunk(b"IEND", &[]));
        png
    }

    #[test]
    fn test_parse_minimal() {
        let png = minimal_png(&[]);
        let parsed = parse(&mut Cursor::new(png.clone())).unwrap();
        assert_eq!(parsed.structure.total_size, png.len() as u64);
        assert!(parsed.exif.is_none());
    }

    #[test]
    fn test_parse_requires_ihdr_first() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&build_chunk(b"IDAT", &[0u8; 4]));
        png.extend_from_slice(&build_chunk(b"IEND", &[]));
        assert!(parse(&mut Cursor::new(png)).is_err());
    }

    #[test]
    fn test_parse_exif_chunk() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut data = EXIF_SIGNATURE.to_vec();
        data.extend_from_slice(tiff);
        let png = minimal_png(&[build_chunk(b"eXIf", &data)]);

        let parsed = parse(&mut Cursor::new(png)).unwrap();
        assert_eq!(parsed.exif.unwrap().data, tiff);
    }

    #[test]
    fn test_crc_mismatch_is_fatal() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut data = EXIF_SIGNATURE.to_vec();
        data.extend_from_slice(tiff);
        let mut chunk = build_chunk(b"eXIf", &data);
        let crc_pos = chunk.len() - 4;
        chunk[crc_pos] ^= 0xFF; // corrupt the CRC
        let png = minimal_png(&[chunk]);

        assert!(parse(&mut Cursor::new(png)).is_err());
    }

    #[test]
    fn test_splice_inserts_after_ihdr() {
        let png = minimal_png(&[]);
        let parsed = parse(&mut Cursor::new(png.clone())).unwrap();

        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        let updates = Updates {
            exif: MetadataUpdate::Set(tiff.clone()),
            ..Default::default()
        };
        let mut out = Vec::new();
        splice(&parsed.structure, &mut Cursor::new(png), &mut out, &updates).unwrap();

        let reparsed = parse(&mut Cursor::new(out)).unwrap();
        assert_eq!(reparsed.exif.unwrap().data, tiff);
        // eXIf must directly follow IHDR
        assert!(reparsed.structure.segments[2].has_label("eXIf"));
    }

    #[test]
    fn test_splice_replaces_in_place() {
        let old_tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut data = EXIF_SIGNATURE.to_vec();
        data.extend_from_slice(old_tiff);
        let png = minimal_png(&[build_chunk(b"eXIf", &data)]);
        let parsed = parse(&mut Cursor::new(png.clone())).unwrap();

        let new_tiff = b"MM\x00\x2A\x00\x00\x00\x08\x00\x00\x00\x00\x00\x00".to_vec();
        let updates = Updates {
            exif: MetadataUpdate::Set(new_tiff.clone()),
            ..Default::default()
        };
        let mut out = Vec::new();
        splice(&parsed.structure, &mut Cursor::new(png), &mut out, &updates).unwrap();

        let reparsed = parse(&mut Cursor::new(out)).unwrap();
        assert_eq!(reparsed.exif.unwrap().data, new_tiff);
    }
}
