//! WebP (RIFF) container I/O implementation

use crate::{
    error::{Error, Result},
    formats::{ExifBlob, MetadataUpdate, ParsedContainer, Updates},
    segment::{Segment, SegmentKind},
    structure::Structure,
    Container,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

use super::EXIF_IDENTIFIER as EXIF_SIGNATURE;

const RIFF_HEADER_SIZE: u64 = 12;

// VP8X feature flags, byte 0 of the chunk payload
const FLAG_ICC: u8 = 0x20;
const FLAG_ALPHA: u8 = 0x10;
const FLAG_EXIF: u8 = 0x08;
const FLAG_XMP: u8 = 0x04;

/// Canonical chunk ordering rank. Image-bearing chunks share one rank;
/// unknown chunks are exempt from the rule.
fn chunk_rank(fourcc: &[u8; 4]) -> Option<u8> {
    match fourcc {
        b"VP8X" => Some(0),
        b"ICCP" => Some(1),
        b"ANIM" => Some(2),
        b"ALPH" | b"VP8 " | b"VP8L" | b"ANMF" => Some(3),
        b"EXIF" => Some(4),
        b"XMP " => Some(5),
        _ => None,
    }
}

fn is_image_chunk(label: Option<&str>) -> bool {
    matches!(label, Some("ALPH" | "VP8 " | "VP8L" | "ANMF"))
}

/// Single-pass scan of the RIFF sub-chunk stream.
///
/// EXIF, XMP and ICCP chunks are only looked for when a VP8X chunk
/// declared them; any violation of the canonical chunk ordering is fatal.
/// Odd-length payloads carry one pad byte not counted in the declared
/// size.
pub(crate) fn parse<R: Read + Seek>(source: &mut R) -> Result<ParsedContainer> {
    let mut structure = Structure::new(Container::Webp);
    let mut exif: Option<ExifBlob> = None;
    let mut xmp: Option<Vec<u8>> = None;

    let mut header = [0u8; RIFF_HEADER_SIZE as usize];
    source.read_exact(&mut header)?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WEBP" {
        return Err(Error::InvalidFormat("not a WebP file".into()));
    }
    structure.add_segment(Segment::new(0, RIFF_HEADER_SIZE, SegmentKind::Header, None));

    let mut offset = RIFF_HEADER_SIZE;
    let mut vp8x_flags: Option<u8> = None;
    let mut last_rank = 0u8;

    loop {
        let mut fourcc = [0u8; 4];
        match source.read_exact(&mut fourcc) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let size = source.read_u32::<LittleEndian>()? as u64;
        if size > 0x7FFF_FFFF {
            return Err(Error::InvalidSegment {
                offset,
                reason: format!("chunk length too large: {size}"),
            });
        }
        let pad = size & 1;
        let span = 8 + size + pad;
        let chunk_start = offset;
        let data_offset = offset + 8;

        if let Some(rank) = chunk_rank(&fourcc) {
            if rank < last_rank {
                return Err(Error::InvalidFormat(format!(
                    "WebP chunk {} out of order",
                    String::from_utf8_lossy(&fourcc)
                )));
            }
            last_rank = rank;
        }

        let kind = match &fourcc {
            b"VP8X" => {
                if size >= 1 {
                    let flags = source.read_u8()?;
                    vp8x_flags = Some(flags);
                }
                SegmentKind::Other
            }

            b"EXIF" if vp8x_flags.map(|f| f & FLAG_EXIF != 0) == Some(true) => {
                let mut data = vec![0u8; size as usize];
                source.read_exact(&mut data)?;
                if exif.is_none() {
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

            b"XMP " if vp8x_flags.map(|f| f & FLAG_XMP != 0) == Some(true) => {
                let mut data = vec![0u8; size as usize];
                source.read_exact(&mut data)?;
                if xmp.is_none() {
                    xmp = Some(data);
                }
                SegmentKind::Xmp
            }

            b"ICCP" if vp8x_flags.map(|f| f & FLAG_ICC != 0) == Some(true) => {
                SegmentKind::IccProfile
            }

            _ => SegmentKind::Other,
        };

        source.seek(SeekFrom::Start(chunk_start + span))?;
        structure.add_segment(Segment::new(
            chunk_start,
            span,
            kind,
            Some(String::from_utf8_lossy(&fourcc).into_owned()),
        ));
        offset += span;
    }

    structure.total_size = offset;

    Ok(ParsedContainer {
        structure,
        exif,
        xmp,
        extras: Vec::new(),
    })
}

/// Image dimensions recovered from the first image-bearing chunk
struct FrameInfo {
    width: u32,
    height: u32,
    has_alpha: bool,
}

/// VP8: 3-byte frame tag, 3-byte start signature, then packed 14-bit
/// width and height.
fn parse_vp8_dimensions(payload: &[u8]) -> Option<FrameInfo> {
    if payload.len() < 10 || payload[3..6] != [0x9D, 0x01, 0x2A] {
        return None;
    }
    let width = (u16::from_le_bytes([payload[6], payload[7]]) & 0x3FFF) as u32;
    let height = (u16::from_le_bytes([payload[8], payload[9]]) & 0x3FFF) as u32;
    Some(FrameInfo {
        width,
        height,
        has_alpha: false,
    })
}

/// VP8L: 1-byte signature, then a packed bit field of width-1 (14 bits),
/// height-1 (14 bits) and an alpha bit.
fn parse_vp8l_dimensions(payload: &[u8]) -> Option<FrameInfo> {
    if payload.len() < 5 || payload[0] != 0x2F {
        return None;
    }
    let bits = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Some(FrameInfo {
        width: (bits & 0x3FFF) + 1,
        height: ((bits >> 14) & 0x3FFF) + 1,
        has_alpha: (bits >> 28) & 1 == 1,
    })
}

fn read_chunk_payload<R: Read + Seek>(source: &mut R, segment: &Segment) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(segment.range.offset + 4))?;
    let size = source.read_u32::<LittleEndian>()? as u64;
    if size > segment.range.size {
        return Err(Error::InvalidSegment {
            offset: segment.range.offset,
            reason: format!("chunk payload length {size} exceeds its span"),
        });
    }
    let mut payload = vec![0u8; size as usize];
    source.read_exact(&mut payload)?;
    Ok(payload)
}

fn copy_segment_into<R: Read + Seek>(
    out: &mut Vec<u8>,
    source: &mut R,
    segment: &Segment,
) -> Result<()> {
    source.seek(SeekFrom::Start(segment.range.offset))?;
    let start = out.len();
    out.resize(start + segment.range.size as usize, 0);
    source.read_exact(&mut out[start..])?;
    Ok(())
}

fn push_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0); // pad byte, not counted in the declared size
    }
}

fn exif_chunk_payload(exif: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(EXIF_SIGNATURE.len() + exif.len());
    payload.extend_from_slice(EXIF_SIGNATURE);
    payload.extend_from_slice(exif);
    payload
}

/// Rewrite the sub-chunk stream.
///
/// With a pre-existing VP8X the feature flags are rewritten and the new
/// EXIF chunk lands at the position the ordering rule mandates. Without
/// one, a synthetic VP8X is built from the first image chunk's dimensions
/// and the EXIF chunk is appended after the last image-bearing chunk. The
/// RIFF size field is rewritten to match the final byte count.
pub(crate) fn splice<R: Read + Seek, W: Write>(
    structure: &Structure,
    source: &mut R,
    writer: &mut W,
    updates: &Updates,
) -> Result<()> {
    let mut out: Vec<u8> = Vec::with_capacity(structure.total_size as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&[0u8; 4]); // size patched at the end
    out.extend_from_slice(b"WEBP");

    let segments: Vec<&Segment> = structure
        .segments()
        .iter()
        .filter(|s| s.kind != SegmentKind::Header)
        .collect();

    let has_vp8x = segments.iter().any(|s| s.has_label("VP8X"));
    let new_exif = match &updates.exif {
        MetadataUpdate::Set(data) => Some(exif_chunk_payload(data)),
        _ => None,
    };

    if has_vp8x {
        let mut exif_written = false;
        for segment in &segments {
            if segment.has_label("VP8X") {
                let mut payload = read_chunk_payload(source, segment)?;
                if payload.is_empty() {
                    return Err(Error::InvalidSegment {
                        offset: segment.range.offset,
                        reason: "empty VP8X chunk".into(),
                    });
                }
                match &updates.exif {
                    MetadataUpdate::Set(_) => payload[0] |= FLAG_EXIF,
                    MetadataUpdate::Remove => payload[0] &= !FLAG_EXIF,
                    MetadataUpdate::Keep => {}
                }
                if matches!(updates.xmp, MetadataUpdate::Remove) {
                    payload[0] &= !FLAG_XMP;
                }
                if matches!(updates.icc, MetadataUpdate::Remove) {
                    payload[0] &= !FLAG_ICC;
                }
                push_chunk(&mut out, b"VP8X", &payload);
                continue;
            }

            match segment.kind {
                SegmentKind::Exif => match &updates.exif {
                    MetadataUpdate::Keep => copy_segment_into(&mut out, source, segment)?,
                    // A replacement is written at the canonical position
                    MetadataUpdate::Set(_) | MetadataUpdate::Remove => {}
                },
                SegmentKind::Xmp => {
                    if let (Some(payload), false) = (&new_exif, exif_written) {
                        push_chunk(&mut out, b"EXIF", payload);
                        exif_written = true;
                    }
                    if matches!(updates.xmp, MetadataUpdate::Keep) {
                        copy_segment_into(&mut out, source, segment)?;
                    }
                }
                SegmentKind::IccProfile => {
                    if matches!(updates.icc, MetadataUpdate::Keep) {
                        copy_segment_into(&mut out, source, segment)?;
                    }
                }
                _ => copy_segment_into(&mut out, source, segment)?,
            }
        }
        if let (Some(payload), false) = (&new_exif, exif_written) {
            push_chunk(&mut out, b"EXIF", payload);
        }
    } else if let Some(payload) = &new_exif {
        // No VP8X: synthesize one from the first image chunk, then append
        // the EXIF chunk after the last image-bearing chunk.
        let frame = segments
            .iter()
            .find(|s| s.has_label("VP8 ") || s.has_label("VP8L"))
            .and_then(|s| {
                let chunk = read_chunk_payload(source, s).ok()?;
                if s.has_label("VP8 ") {
                    parse_vp8_dimensions(&chunk)
                } else {
                    parse_vp8l_dimensions(&chunk)
                }
            })
            .ok_or_else(|| {
                Error::InvalidFormat("cannot locate image dimensions for VP8X".into())
            })?;

        let mut flags = FLAG_EXIF;
        if frame.has_alpha || segments.iter().any(|s| s.has_label("ALPH")) {
            flags |= FLAG_ALPHA;
        }
        let mut vp8x = Vec::with_capacity(10);
        vp8x.push(flags);
        vp8x.extend_from_slice(&[0, 0, 0]); // reserved
        vp8x.extend_from_slice(&frame.width.saturating_sub(1).to_le_bytes()[0..3]);
        vp8x.extend_from_slice(&frame.height.saturating_sub(1).to_le_bytes()[0..3]);
        push_chunk(&mut out, b"VP8X", &vp8x);

        let last_image = segments
            .iter()
            .rposition(|s| is_image_chunk(s.label.as_deref()));
        for (index, segment) in segments.iter().enumerate() {
            copy_segment_into(&mut out, source, segment)?;
            if Some(index) == last_image {
                push_chunk(&mut out, b"EXIF", payload);
            }
        }
        if last_image.is_none() {
            push_chunk(&mut out, b"EXIF", payload);
        }
    } else {
        for segment in &segments {
            copy_segment_into(&mut out, source, segment)?;
        }
    }

    let riff_size = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    writer.write_all(&out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        push_chunk(&mut out, fourcc, payload);
        out
    }

    fn webp_file(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.iter().flatten().copied().collect();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WEBP");
        out.extend_from_slice(&body);
        out
    }

    /// Minimal VP8 frame header for a 4x4 lossy image
    fn vp8_payload() -> Vec<u8> {
        let mut p = vec![0x00, 0x00, 0x00]; // frame tag
        p.extend_from_slice(&[0x9D, 0x01, 0x2A]); // start signature
        p.extend_from_slice(&4u16.to_le_bytes()); // width
        p.extend_from_slice(&4u16.to_le_bytes()); // height
        p
    }

    fn vp8x_payload(flags: u8) -> Vec<u8> {
        let mut p = vec![flags, 0, 0, 0];
        p.extend_from_slice(&3u32.to_le_bytes()[0..3]); // width - 1
        p.extend_from_slice(&3u32.to_le_bytes()[0..3]); // height - 1
        p
    }

    #[test]
    fn test_parse_simple() {
        let file = webp_file(&[chunk(b"VP8 ", &vp8_payload())]);
        let parsed = parse(&mut Cursor::new(file)).unwrap();
        assert!(parsed.exif.is_none());
        assert_eq!(parsed.structure.segments.len(), 2);
    }

    #[test]
    fn test_parse_exif_behind_vp8x_flag() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut exif_payload = EXIF_SIGNATURE.to_vec();
        exif_payload.extend_from_slice(tiff);
        let file = webp_file(&[
            chunk(b"VP8X", &vp8x_payload(FLAG_EXIF)),
            chunk(b"VP8 ", &vp8_payload()),
            chunk(b"EXIF", &exif_payload),
        ]);

        let parsed = parse(&mut Cursor::new(file)).unwrap();
        assert_eq!(parsed.exif.unwrap().data, tiff);
    }

    #[test]
    fn test_parse_exif_ignored_without_vp8x() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let file = webp_file(&[chunk(b"VP8 ", &vp8_payload()), chunk(b"EXIF", tiff)]);
        let parsed = parse(&mut Cursor::new(file)).unwrap();
        assert!(parsed.exif.is_none());
    }

    #[test]
    fn test_chunk_order_violation_is_fatal() {
        let file = webp_file(&[
            chunk(b"VP8X", &vp8x_payload(FLAG_EXIF | FLAG_ICC)),
            chunk(b"EXIF", b"II\x2A\x00\x08\x00\x00\x00"),
            chunk(b"ICCP", b"profile!"),
        ]);
        assert!(parse(&mut Cursor::new(file)).is_err());
    }

    #[test]
    fn test_chunk_order_accepted() {
        let file = webp_file(&[
            chunk(b"VP8X", &vp8x_payload(FLAG_EXIF | FLAG_ICC)),
            chunk(b"ICCP", b"profile!"),
            chunk(b"VP8 ", &vp8_payload()),
            chunk(b"EXIF", b"II\x2A\x00\x08\x00\x00\x00"),
        ]);
        assert!(parse(&mut Cursor::new(file)).is_ok());
    }

    #[test]
    fn test_splice_synthesizes_vp8x() {
        let original = webp_file(&[chunk(b"VP8 ", &vp8_payload())]);
        let parsed = parse(&mut Cursor::new(original.clone())).unwrap();

        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        let updates = Updates {
            exif: MetadataUpdate::Set(tiff.clone()),
            ..Default::default()
        };
        let mut sink = Vec::new();
        splice(
            &parsed.structure,
            &mut Cursor::new(original),
            &mut sink,
            &updates,
        )
        .unwrap();

        // RIFF size must match the final byte count
        let declared = u32::from_le_bytes([sink[4], sink[5], sink[6], sink[7]]) as usize;
        assert_eq!(declared, sink.len() - 8);

        let reparsed = parse(&mut Cursor::new(sink)).unwrap();
        assert_eq!(reparsed.exif.unwrap().data, tiff);
        assert!(reparsed.structure.segments[1].has_label("VP8X"));
    }

    #[test]
    fn test_splice_reuses_existing_vp8x() {
        let original = webp_file(&[
            chunk(b"VP8X", &vp8x_payload(0)),
            chunk(b"VP8 ", &vp8_payload()),
        ]);
        let parsed = parse(&mut Cursor::new(original.clone())).unwrap();

        let tiff = b"MM\x00\x2A\x00\x00\x00\x08\x00\x00\x00\x00\x00\x00".to_vec();
        let updates = Updates {
            exif: MetadataUpdate::Set(tiff.clone()),
            ..Default::default()
        };
        let mut sink = Vec::new();
        splice(
            &parsed.structure,
            &mut Cursor::new(original),
            &mut sink,
            &updates,
        )
        .unwrap();

        let reparsed = parse(&mut Cursor::new(sink)).unwrap();
        assert_eq!(reparsed.exif.unwrap().data, tiff);
        // Only one VP8X in the output
        let vp8x_count = reparsed
            .structure
            .segments
            .iter()
            .filter(|s| s.has_label("VP8X"))
            .count();
        assert_eq!(vp8x_count, 1);
    }

    #[test]
    fn test_vp8l_dimension_bits() {
        // 17x9 image: width-1 = 16, height-1 = 8, alpha set
        let bits: u32 = 16 | (8 << 14) | (1 << 28);
        let mut payload = vec![0x2F];
        payload.extend_from_slice(&bits.to_le_bytes());
        let info = parse_vp8l_dimensions(&payload).unwrap();
        assert_eq!(info.width, 17);
        assert_eq!(info.height, 9);
        assert!(info.has_alpha);
    }
}
