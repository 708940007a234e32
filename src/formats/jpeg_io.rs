//! JPEG container I/O implementation

use crate::{
    error::{Error, Result},
    formats::{ExifBlob, ExtraAttribute, MetadataUpdate, ParsedContainer, Updates},
    segment::{Segment, SegmentKind},
    structure::Structure,
    tags::Group,
    Container,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{copy, Read, Seek, SeekFrom, Write};

// JPEG markers
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOS: u8 = 0xDA; // Start of Scan (image data follows)
const APP1: u8 = 0xE1; // EXIF / XMP
const APP2: u8 = 0xE2; // ICC profile
const APP13: u8 = 0xED; // Photoshop resources
const COM: u8 = 0xFE; // Comment

// Markers without a length field
const TEM: u8 = 0x01;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

use super::EXIF_IDENTIFIER as EXIF_SIGNATURE;
const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const XMP_EXTENDED_SIGNATURE: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
const ICC_SIGNATURE: &[u8] = b"ICC_PROFILE\0";
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";

const MAX_MARKER_SIZE: usize = 65533; // Max payload of a JPEG marker segment

/// Get human-readable label for a JPEG marker
fn marker_label(marker: u8) -> &'static str {
    match marker {
        0xD8 => "SOI",
        0xD9 => "EOI",
        0xDA => "SOS",
        0xDB => "DQT",
        0xC4 => "DHT",
        0xDD => "DRI",
        0xFE => "COM",
        0xE0 => "APP0",
        0xE1 => "APP1",
        0xE2 => "APP2",
        0xED => "APP13",
        0xC0..=0xCF => "SOF",
        0xE3..=0xEF => "APPn",
        _ => "OTHER",
    }
}

/// Frame headers carrying image dimensions: baseline, extended,
/// progressive and lossless variants.
fn is_sof_marker(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

/// Single-pass scan of the marker segment stream.
pub(crate) fn parse<R: Read + Seek>(source: &mut R) -> Result<ParsedContainer> {
    parse_embedded(source, 0, Group::Primary)
}

/// Scan a JPEG whose bytes sit at `base` inside a larger file (RAF and RW2
/// previews). Discovered blob offsets are file-absolute; scan-level
/// dimensions land in `dimension_group`.
pub(crate) fn parse_embedded<R: Read + Seek>(
    source: &mut R,
    base: u64,
    dimension_group: Group,
) -> Result<ParsedContainer> {
    let mut structure = Structure::new(Container::Jpeg);
    let mut exif: Option<ExifBlob> = None;
    let mut xmp: Option<Vec<u8>> = None;
    let mut extras: Vec<ExtraAttribute> = Vec::new();

    if source.read_u8()? != 0xFF || source.read_u8()? != SOI {
        return Err(Error::InvalidFormat("not a JPEG file".into()));
    }
    structure.add_segment(Segment::new(0, 2, SegmentKind::Header, None));

    let mut offset = 2u64;

    loop {
        let marker_prefix = source.read_u8()?;
        if marker_prefix != 0xFF {
            return Err(Error::InvalidSegment {
                offset,
                reason: format!("expected 0xFF, got {marker_prefix:#04X}"),
            });
        }
        let mut marker = source.read_u8()?;
        // Padding bytes between segments
        while marker == 0xFF {
            marker = source.read_u8()?;
            offset += 1;
        }

        match marker {
            EOI => {
                structure.add_segment(Segment::new(
                    offset,
                    2,
                    SegmentKind::Other,
                    Some(marker_label(EOI).to_string()),
                ));
                structure.total_size = offset + 2;
                break;
            }

            SOS => {
                // Everything from SOS to the end of the stream is copied
                // wholesale on save, trailing bytes included.
                let end = source.seek(SeekFrom::End(0))?;
                structure.add_segment(Segment::new(
                    offset,
                    end - offset,
                    SegmentKind::ImageData,
                    Some(marker_label(SOS).to_string()),
                ));
                structure.total_size = end;
                break;
            }

            TEM | RST0..=RST7 => {
                structure.add_segment(Segment::new(
                    offset,
                    2,
                    SegmentKind::Other,
                    Some(marker_label(marker).to_string()),
                ));
                offset += 2;
            }

            _ => {
                let size = source.read_u16::<BigEndian>()? as u64;
                if size < 2 {
                    return Err(Error::InvalidSegment {
                        offset,
                        reason: format!("marker length {size} too small"),
                    });
                }
                let data_size = size - 2;
                let segment_start = offset;
                let span = 2 + size;

                let kind = match marker {
                    APP1 => scan_app1(
                        source,
                        base,
                        offset,
                        data_size,
                        &mut exif,
                        &mut xmp,
                    )?,
                    APP2 => scan_signature(source, data_size, ICC_SIGNATURE, SegmentKind::IccProfile)?,
                    APP13 => {
                        scan_signature(source, data_size, PHOTOSHOP_SIGNATURE, SegmentKind::Photoshop)?
                    }
                    COM => {
                        let mut text = vec![0u8; data_size as usize];
                        source.read_exact(&mut text)?;
                        let comment = String::from_utf8_lossy(&text)
                            .trim_end_matches('\0')
                            .to_string();
                        extras.push(ExtraAttribute {
                            group: Group::Exif,
                            name: "UserComment",
                            value: comment,
                            only_if_absent: true,
                        });
                        SegmentKind::Comment
                    }
                    m if is_sof_marker(m) => {
                        if data_size >= 5 {
                            let _precision = source.read_u8()?;
                            let height = source.read_u16::<BigEndian>()?;
                            let width = source.read_u16::<BigEndian>()?;
                            extras.push(ExtraAttribute {
                                group: dimension_group,
                                name: "ImageLength",
                                value: height.to_string(),
                                only_if_absent: false,
                            });
                            extras.push(ExtraAttribute {
                                group: dimension_group,
                                name: "ImageWidth",
                                value: width.to_string(),
                                only_if_absent: false,
                            });
                        }
                        SegmentKind::Other
                    }
                    _ => SegmentKind::Other,
                };

                structure.add_segment(Segment::new(
                    segment_start,
                    span,
                    kind,
                    Some(marker_label(marker).to_string()),
                ));

                offset += span;
                source.seek(SeekFrom::Start(offset))?;
            }
        }
    }

    Ok(ParsedContainer {
        structure,
        exif,
        xmp,
        extras,
    })
}

/// Sniff an APP1 payload for the EXIF, XMP and extended-XMP identifiers.
fn scan_app1<R: Read + Seek>(
    source: &mut R,
    base: u64,
    offset: u64,
    data_size: u64,
    exif: &mut Option<ExifBlob>,
    xmp: &mut Option<Vec<u8>>,
) -> Result<SegmentKind> {
    let sig_len = XMP_EXTENDED_SIGNATURE.len().min(data_size as usize);
    let mut sig_buf = vec![0u8; sig_len];
    source.read_exact(&mut sig_buf)?;

    if sig_buf.starts_with(EXIF_SIGNATURE) {
        let mut rest = vec![0u8; data_size as usize - sig_buf.len()];
        source.read_exact(&mut rest)?;
        if exif.is_none() {
            let mut data = sig_buf[EXIF_SIGNATURE.len()..].to_vec();
            data.extend_from_slice(&rest);
            *exif = Some(ExifBlob {
                data,
                base_offset: base + offset + 4 + EXIF_SIGNATURE.len() as u64,
            });
        }
        return Ok(SegmentKind::Exif);
    }

    if sig_buf.starts_with(XMP_SIGNATURE) {
        let mut rest = vec![0u8; data_size as usize - sig_buf.len()];
        source.read_exact(&mut rest)?;
        if xmp.is_none() {
            let mut data = sig_buf[XMP_SIGNATURE.len()..].to_vec();
            data.extend_from_slice(&rest);
            *xmp = Some(data);
        }
        return Ok(SegmentKind::Xmp);
    }

    if sig_buf.starts_with(XMP_EXTENDED_SIGNATURE) {
        return Ok(SegmentKind::ExtendedXmp);
    }

    Ok(SegmentKind::Other)
}

/// Sniff a fixed identifier at the start of a marker payload; only the
/// presence is recorded, the payload itself is copied verbatim on save.
fn scan_signature<R: Read + Seek>(
    source: &mut R,
    data_size: u64,
    signature: &[u8],
    kind: SegmentKind,
) -> Result<SegmentKind> {
    let sig_len = signature.len().min(data_size as usize);
    let mut sig_buf = vec![0u8; sig_len];
    source.read_exact(&mut sig_buf)?;
    if sig_buf == signature {
        Ok(kind)
    } else {
        Ok(SegmentKind::Other)
    }
}

/// Rewrite the marker stream: fresh EXIF (and, when present, XMP) APP1
/// segments go immediately after SOI in that order, old metadata segments
/// are dropped per the updates, and every other segment is copied verbatim.
pub(crate) fn splice<R: Read + Seek, W: Write>(
    structure: &Structure,
    source: &mut R,
    writer: &mut W,
    updates: &Updates,
) -> Result<()> {
    writer.write_u8(0xFF)?;
    writer.write_u8(SOI)?;

    if let MetadataUpdate::Set(exif) = &updates.exif {
        write_exif_segment(writer, exif)?;
    }
    if let MetadataUpdate::Set(xmp) = &updates.xmp {
        write_xmp_segment(writer, xmp)?;
    }

    let mut current_read_pos = 0u64;
    for segment in structure.segments() {
        let keep = match segment.kind {
            SegmentKind::Header => false,
            SegmentKind::Exif => matches!(updates.exif, MetadataUpdate::Keep),
            SegmentKind::Xmp | SegmentKind::ExtendedXmp => {
                matches!(updates.xmp, MetadataUpdate::Keep)
            }
            SegmentKind::IccProfile => matches!(updates.icc, MetadataUpdate::Keep),
            SegmentKind::Photoshop => matches!(updates.photoshop, MetadataUpdate::Keep),
            _ => true,
        };
        if keep {
            copy_segment(segment, source, writer, &mut current_read_pos)?;
        }
    }

    Ok(())
}

/// Write the EXIF TIFF block as a single APP1 segment
fn write_exif_segment<W: Write>(writer: &mut W, exif: &[u8]) -> Result<()> {
    let payload = EXIF_SIGNATURE.len() + exif.len();
    if payload > MAX_MARKER_SIZE {
        return Err(Error::InvalidFormat(format!(
            "EXIF data too large for one APP1 segment: {} bytes",
            exif.len()
        )));
    }
    writer.write_u8(0xFF)?;
    writer.write_u8(APP1)?;
    writer.write_u16::<BigEndian>((payload + 2) as u16)?;
    writer.write_all(EXIF_SIGNATURE)?;
    writer.write_all(exif)?;
    Ok(())
}

/// Write XMP as its own APP1 segment
fn write_xmp_segment<W: Write>(writer: &mut W, xmp: &[u8]) -> Result<()> {
    let payload = XMP_SIGNATURE.len() + xmp.len();
    if payload > MAX_MARKER_SIZE {
        return Err(Error::InvalidFormat(format!(
            "XMP data too large for one APP1 segment: {} bytes",
            xmp.len()
        )));
    }
    writer.write_u8(0xFF)?;
    writer.write_u8(APP1)?;
    writer.write_u16::<BigEndian>((payload + 2) as u16)?;
    writer.write_all(XMP_SIGNATURE)?;
    writer.write_all(xmp)?;
    Ok(())
}

/// Copy one segment's byte span verbatim
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

    #[test]
    fn test_parse_minimal() {
        // Minimal JPEG: SOI + EOI
        let data = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let mut source = Cursor::new(data);

        let parsed = parse(&mut source).unwrap();
        assert_eq!(parsed.structure.total_size, 4);
        assert_eq!(parsed.structure.segments.len(), 2); // Header + EOI
        assert!(parsed.exif.is_none());
    }

    #[test]
    fn test_parse_rejects_non_jpeg() {
        let mut source = Cursor::new(vec![0x00, 0x01, 0x02, 0x03]);
        assert!(parse(&mut source).is_err());
    }

    #[test]
    fn test_parse_exif_app1() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, APP1]);
        let len = (2 + EXIF_SIGNATURE.len() + tiff.len()) as u16;
        data.extend_from_slice(&len.to_be_bytes());
        data.extend_from_slice(EXIF_SIGNATURE);
        data.extend_from_slice(tiff);
        data.extend_from_slice(&[0xFF, 0xD9]);

        let parsed = parse(&mut Cursor::new(data)).unwrap();
        let blob = parsed.exif.unwrap();
        assert_eq!(blob.data, tiff);
        assert_eq!(blob.base_offset, 2 + 4 + 6);
        assert!(parsed.structure.exif_index().is_some());
    }

    #[test]
    fn test_parse_sof_dimensions() {
        let mut data = vec![0xFF, 0xD8];
        // SOF0: len 11, precision 8, height 480, width 640, 1 component
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x01, 0xE0, 0x02, 0x80, 0x01, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        let parsed = parse(&mut Cursor::new(data)).unwrap();
        let width = parsed
            .extras
            .iter()
            .find(|e| e.name == "ImageWidth")
            .unwrap();
        assert_eq!(width.value, "640");
        let height = parsed
            .extras
            .iter()
            .find(|e| e.name == "ImageLength")
            .unwrap();
        assert_eq!(height.value, "480");
    }

    #[test]
    fn test_splice_inserts_exif_after_soi() {
        let original = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let parsed = parse(&mut Cursor::new(original.clone())).unwrap();

        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        let updates = Updates {
            exif: MetadataUpdate::Set(tiff.clone()),
            ..Default::default()
        };

        let mut out = Vec::new();
        splice(
            &parsed.structure,
            &mut Cursor::new(original),
            &mut out,
            &updates,
        )
        .unwrap();

        assert_eq!(&out[0..2], &[0xFF, 0xD8]);
        assert_eq!(&out[2..4], &[0xFF, APP1]);
        assert_eq!(&out[6..12], EXIF_SIGNATURE);
        assert_eq!(&out[out.len() - 2..], &[0xFF, 0xD9]);

        let reparsed = parse(&mut Cursor::new(out)).unwrap();
        assert_eq!(reparsed.exif.unwrap().data, tiff);
    }

    #[test]
    fn test_splice_drops_old_exif() {
        let tiff = b"II\x2A\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let mut original = vec![0xFF, 0xD8];
        original.extend_from_slice(&[0xFF, APP1]);
        let len = (2 + EXIF_SIGNATURE.len() + tiff.len()) as u16;
        original.extend_from_slice(&len.to_be_bytes());
        original.extend_from_slice(EXIF_SIGNATURE);
        original.extend_from_slice(tiff);
        original.extend_from_slice(&[0xFF, 0xD9]);

        let parsed = parse(&mut Cursor::new(original.clone())).unwrap();
        let updates = Updates {
            exif: MetadataUpdate::Remove,
            ..Default::default()
        };
        let mut out = Vec::new();
        splice(
            &parsed.structure,
            &mut Cursor::new(original),
            &mut out,
            &updates,
        )
        .unwrap();
        assert_eq!(out, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }
}
