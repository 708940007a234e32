//! TIFF-structured RAW and RAF support
//!
//! ORF, RW2, PEF and DNG files are TIFF blocks at file scope and decode
//! through the directory codec directly; the functions here recover the
//! vendor-specific pieces afterwards (maker-note sub-directories, preview
//! locations, dimension corrections). RAF is its own container with a
//! fixed-offset header pointing at an embedded JPEG and a proprietary CFA
//! tag list.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;

use crate::error::Result;
use crate::formats::{apply_extras, jpeg_io};
use crate::tags::Group;
use crate::tiff::{self, DirectoryStore};
use crate::value::{ByteOrder, ExifAttribute};

// RAF fixed header: offset of the embedded JPEG, its length, then the
// offset of the CFA metadata block.
const RAF_JPEG_OFFSET_FIELD: u64 = 84;
// The one CFA tag carrying primary image height and width
const RAF_TAG_IMAGE_SIZE: u16 = 0x0100;

// ORF maker notes start with one of two vendor signatures of different
// fixed lengths.
const ORF_SIGNATURE_OLD: &[u8] = b"OLYMP\0";
const ORF_SIGNATURE_OLD_SIZE: usize = 8;
const ORF_SIGNATURE_NEW: &[u8] = b"OLYMPUS\0";
const ORF_SIGNATURE_NEW_SIZE: usize = 12;

// PEF maker notes carry a fixed 6-byte vendor header before the IFD
const PEF_MAKER_NOTE_SKIP: usize = 6;

/// Result of a RAF scan
pub(crate) struct RafMetadata {
    pub store: DirectoryStore,
    pub byte_order: ByteOrder,
    /// Base the thumbnail directory's offset values are relative to (the
    /// embedded JPEG's TIFF block)
    pub thumbnail_base: u64,
}

/// Parse a Fujifilm RAF: the embedded JPEG yields preview-group metadata,
/// the CFA block yields the primary image dimensions. All other CFA tags
/// are skipped by their declared length.
pub(crate) fn parse_raf<R: Read + Seek>(source: &mut R) -> Result<RafMetadata> {
    source.seek(SeekFrom::Start(RAF_JPEG_OFFSET_FIELD))?;
    let jpeg_offset = source.read_u32::<BigEndian>()? as u64;
    let jpeg_length = source.read_u32::<BigEndian>()? as u64;
    let cfa_offset = source.read_u32::<BigEndian>()? as u64;

    let source_len = source.seek(SeekFrom::End(0))?;
    if jpeg_offset.checked_add(jpeg_length).map_or(true, |end| end > source_len) {
        return Err(crate::error::Error::InvalidSegment {
            offset: jpeg_offset,
            reason: "embedded JPEG runs beyond the file".into(),
        });
    }

    source.seek(SeekFrom::Start(jpeg_offset))?;
    let mut jpeg = vec![0u8; jpeg_length as usize];
    source.read_exact(&mut jpeg)?;

    let parsed = jpeg_io::parse_embedded(&mut Cursor::new(jpeg), jpeg_offset, Group::Preview)?;

    let (mut store, byte_order, thumbnail_base) = match parsed.exif {
        Some(blob) => {
            let block = tiff::parse(&blob.data, blob.base_offset, Group::Preview, true)?;
            (block.store, block.byte_order, blob.base_offset)
        }
        None => (DirectoryStore::new(), ByteOrder::BigEndian, 0),
    };
    apply_extras(&mut store, byte_order, &parsed.extras);

    source.seek(SeekFrom::Start(cfa_offset))?;
    let tag_count = source.read_u32::<BigEndian>()?;
    for _ in 0..tag_count {
        let tag_id = source.read_u16::<BigEndian>()?;
        let payload_length = source.read_u16::<BigEndian>()?;
        if tag_id == RAF_TAG_IMAGE_SIZE && payload_length >= 4 {
            let height = source.read_u16::<BigEndian>()?;
            let width = source.read_u16::<BigEndian>()?;
            store.set(
                Group::Primary,
                "ImageLength",
                ExifAttribute::ushort(&[height], byte_order),
            );
            store.set(
                Group::Primary,
                "ImageWidth",
                ExifAttribute::ushort(&[width], byte_order),
            );
            break;
        }
        source.seek(SeekFrom::Current(payload_length as i64))?;
    }

    Ok(RafMetadata {
        store,
        byte_order,
        thumbnail_base,
    })
}

/// Recover the Olympus maker-note sub-directories: preview location from
/// the camera-settings directory, primary dimensions from the
/// image-processing aspect frame.
pub(crate) fn process_orf(store: &mut DirectoryStore, order: ByteOrder) {
    let Some(maker) = store.get(Group::Exif, "MakerNote").map(|a| a.bytes.clone()) else {
        return;
    };

    let offset = if maker.starts_with(ORF_SIGNATURE_NEW) {
        ORF_SIGNATURE_NEW_SIZE
    } else if maker.starts_with(ORF_SIGNATURE_OLD) {
        ORF_SIGNATURE_OLD_SIZE
    } else {
        0
    };

    let nested = tiff::parse_directories_at(&maker, order, offset, Group::OrfMakerNote, 0);
    store.absorb(nested);

    let preview_start = store
        .get(Group::OrfCameraSettings, "PreviewImageStart")
        .and_then(|a| a.int_value(order));
    let preview_length = store
        .get(Group::OrfCameraSettings, "PreviewImageLength")
        .and_then(|a| a.int_value(order));
    if let (Some(start), Some(length)) = (preview_start, preview_length) {
        store.set(
            Group::Preview,
            "JPEGInterchangeFormat",
            ExifAttribute::ulong(&[start as u32], order),
        );
        store.set(
            Group::Preview,
            "JPEGInterchangeFormatLength",
            ExifAttribute::ulong(&[length as u32], order),
        );
    }

    let aspect = store
        .get(Group::OrfImageProcessing, "AspectFrame")
        .and_then(|a| a.int_values(order));
    if let Some(frame) = aspect {
        if frame.len() == 4 && frame[2] > frame[0] && frame[3] > frame[1] {
            let mut width = (frame[2] - frame[0] + 1) as u16;
            let mut height = (frame[3] - frame[1] + 1) as u16;
            // The rectangle's larger extent becomes the width.
            if width < height {
                std::mem::swap(&mut width, &mut height);
            }
            store.set(
                Group::Primary,
                "ImageWidth",
                ExifAttribute::ushort(&[width], order),
            );
            store.set(
                Group::Primary,
                "ImageLength",
                ExifAttribute::ushort(&[height], order),
            );
        }
    }
}

/// Recover the RW2 preview from the embedded JPEG blob tag and copy the
/// vendor ISO value into the standard sensitivity tag when that is absent.
///
/// Returns the base the recovered thumbnail directory's offsets are
/// relative to, when the embedded JPEG contributed one.
pub(crate) fn process_rw2(store: &mut DirectoryStore, order: ByteOrder) -> Option<u64> {
    let mut thumbnail_base = None;

    let jpg_from_raw = store
        .get(Group::Primary, "JpgFromRaw")
        .map(|a| (a.bytes.clone(), a.source_offset.unwrap_or(0)));
    if let Some((jpeg, base)) = jpg_from_raw {
        match jpeg_io::parse_embedded(&mut Cursor::new(jpeg), base, Group::Preview) {
            Ok(parsed) => {
                if let Some(blob) = parsed.exif {
                    match tiff::parse(&blob.data, blob.base_offset, Group::Preview, true) {
                        Ok(block) => {
                            if !block.store.group(Group::Thumbnail).is_empty() {
                                thumbnail_base = Some(blob.base_offset);
                            }
                            store.absorb(block.store);
                        }
                        Err(e) => debug!("embedded RW2 preview EXIF unreadable: {e}"),
                    }
                }
                apply_extras(store, order, &parsed.extras);
            }
            Err(e) => debug!("embedded RW2 preview unreadable: {e}"),
        }
    }

    if store.get(Group::Exif, "PhotographicSensitivity").is_none() {
        if let Some(iso) = store.get(Group::Primary, "ISO").cloned() {
            store.set(Group::Exif, "PhotographicSensitivity", iso);
        }
    }

    thumbnail_base
}

/// Recover the Pentax color-space tag from the maker-note sub-directory
/// and copy it into the standard tag.
pub(crate) fn process_pef(store: &mut DirectoryStore, order: ByteOrder) {
    let Some(maker) = store.get(Group::Exif, "MakerNote").map(|a| a.bytes.clone()) else {
        return;
    };
    let nested = tiff::parse_directories_at(&maker, order, PEF_MAKER_NOTE_SKIP, Group::Pef, 0);
    store.absorb(nested);

    if let Some(color_space) = store.get(Group::Pef, "ColorSpace").cloned() {
        store.set(Group::Exif, "ColorSpace", color_space);
    }
}

/// DNG dimension correction: the crop-size tag may be stored as rational
/// or integer pairs and overrides the primary dimensions.
pub(crate) fn process_dng(store: &mut DirectoryStore, order: ByteOrder) {
    let Some(crop) = store.get(Group::Primary, "DefaultCropSize") else {
        return;
    };

    let (width, height) = if let Some(rationals) = crop.rational_values(order) {
        if rationals.len() < 2 {
            return;
        }
        (rationals[0].to_f64() as u32, rationals[1].to_f64() as u32)
    } else if let Some(ints) = crop.int_values(order) {
        if ints.len() < 2 {
            return;
        }
        (ints[0] as u32, ints[1] as u32)
    } else {
        return;
    };

    if width > 0 && height > 0 {
        store.set(
            Group::Primary,
            "ImageWidth",
            ExifAttribute::ulong(&[width], order),
        );
        store.set(
            Group::Primary,
            "ImageLength",
            ExifAttribute::ulong(&[height], order),
        );
    }
}

/// Whether a decoded primary directory identifies the DNG variant
pub(crate) fn is_dng(store: &DirectoryStore) -> bool {
    store.get(Group::Primary, "DNGVersion").is_some()
}

/// Whether a generic TIFF signature actually belongs to a Pentax PEF
pub(crate) fn is_pef(store: &DirectoryStore, order: ByteOrder) -> bool {
    store
        .get(Group::Primary, "Make")
        .and_then(|a| a.string_value(order))
        .map(|make| make.starts_with("PENTAX"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orf_maker_note() -> Vec<u8> {
        // "OLYMP\0" header padded to 8 bytes, then a maker-note IFD at 8
        // holding one camera-settings pointer to a child IFD at offset 26
        // carrying the preview offset and length.
        let mut maker = Vec::new();
        maker.extend_from_slice(ORF_SIGNATURE_OLD);
        maker.extend_from_slice(&[0, 0]);
        maker.extend_from_slice(&1u16.to_le_bytes()); // one entry
        maker.extend_from_slice(&0x2020u16.to_le_bytes()); // CameraSettingsIFDPointer
        maker.extend_from_slice(&4u16.to_le_bytes()); // ULong
        maker.extend_from_slice(&1u32.to_le_bytes());
        maker.extend_from_slice(&26u32.to_le_bytes()); // child IFD offset
        maker.extend_from_slice(&0u32.to_le_bytes()); // next IFD

        // Camera-settings IFD at 26: two ULong entries
        maker.extend_from_slice(&2u16.to_le_bytes());
        maker.extend_from_slice(&0x0101u16.to_le_bytes()); // PreviewImageStart
        maker.extend_from_slice(&4u16.to_le_bytes());
        maker.extend_from_slice(&1u32.to_le_bytes());
        maker.extend_from_slice(&0x1000u32.to_le_bytes());
        maker.extend_from_slice(&0x0102u16.to_le_bytes()); // PreviewImageLength
        maker.extend_from_slice(&4u16.to_le_bytes());
        maker.extend_from_slice(&1u32.to_le_bytes());
        maker.extend_from_slice(&0x200u32.to_le_bytes());
        maker.extend_from_slice(&0u32.to_le_bytes());

        maker
    }

    #[test]
    fn test_orf_preview_recovery() {
        let order = ByteOrder::LittleEndian;
        let mut store = DirectoryStore::new();
        store.set(
            Group::Exif,
            "MakerNote",
            ExifAttribute::undefined(&orf_maker_note()),
        );

        process_orf(&mut store, order);

        assert_eq!(
            store
                .get(Group::Preview, "JPEGInterchangeFormat")
                .unwrap()
                .int_value(order),
            Some(0x1000)
        );
        assert_eq!(
            store
                .get(Group::Preview, "JPEGInterchangeFormatLength")
                .unwrap()
                .int_value(order),
            Some(0x200)
        );
    }

    #[test]
    fn test_orf_aspect_frame_swaps_to_landscape() {
        let order = ByteOrder::LittleEndian;
        let mut store = DirectoryStore::new();
        // Maker note with no parsable directory, plus a portrait-shaped
        // aspect frame: x extent 99, y extent 199.
        store.set(Group::Exif, "MakerNote", ExifAttribute::undefined(&[0u8; 4]));
        store.set(
            Group::OrfImageProcessing,
            "AspectFrame",
            ExifAttribute::ushort(&[0, 0, 99, 199], order),
        );

        process_orf(&mut store, order);

        assert_eq!(
            store
                .get(Group::Primary, "ImageWidth")
                .unwrap()
                .int_value(order),
            Some(200)
        );
        assert_eq!(
            store
                .get(Group::Primary, "ImageLength")
                .unwrap()
                .int_value(order),
            Some(100)
        );
    }

    #[test]
    fn test_rw2_iso_copied_down() {
        let order = ByteOrder::LittleEndian;
        let mut store = DirectoryStore::new();
        store.set(Group::Primary, "ISO", ExifAttribute::ushort(&[400], order));

        process_rw2(&mut store, order);

        assert_eq!(
            store
                .get(Group::Exif, "PhotographicSensitivity")
                .unwrap()
                .int_value(order),
            Some(400)
        );
    }

    #[test]
    fn test_dng_crop_size_overrides_dimensions() {
        let order = ByteOrder::LittleEndian;
        let mut store = DirectoryStore::new();
        store.set(
            Group::Primary,
            "DefaultCropSize",
            ExifAttribute::ulong(&[4000, 3000], order),
        );
        process_dng(&mut store, order);
        assert_eq!(
            store
                .get(Group::Primary, "ImageWidth")
                .unwrap()
                .int_value(order),
            Some(4000)
        );
        assert_eq!(
            store
                .get(Group::Primary, "ImageLength")
                .unwrap()
                .int_value(order),
            Some(3000)
        );
    }

    #[test]
    fn test_pef_detection_by_make() {
        let order = ByteOrder::LittleEndian;
        let mut store = DirectoryStore::new();
        store.set(Group::Primary, "Make", ExifAttribute::ascii("PENTAX Corporation"));
        assert!(is_pef(&store, order));
        store.set(Group::Primary, "Make", ExifAttribute::ascii("ACME"));
        assert!(!is_pef(&store, order));
    }
}
