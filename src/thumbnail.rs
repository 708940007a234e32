//! Thumbnail resolution
//!
//! After any parse this determines thumbnail presence, compression kind
//! and byte location from the directory contents: either a JFIF-style
//! offset/length pair or the strip-offset/strip-byte-count arrays of a
//! supported uncompressed layout.

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::formats::Container;
use crate::segment::ByteRange;
use crate::tags::{self, Group};
use crate::tiff::DirectoryStore;
use crate::value::{ByteOrder, ExifAttribute};

/// Compression kind of an embedded thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailCompression {
    Jpeg,
    Uncompressed,
}

/// Resolved thumbnail: loaded bytes plus location bookkeeping
///
/// The byte range goes stale after any save; strip thumbnails whose
/// original strips were not contiguous cannot answer a single-range query
/// at all.
#[derive(Debug)]
pub(crate) struct ThumbnailDescriptor {
    pub compression: ThumbnailCompression,
    pub bytes: Vec<u8>,
    pub range: Option<ByteRange>,
    pub multi_strip: bool,
    pub strips_contiguous: bool,
}

/// Both dimensions at or under this bound qualify a preview image for
/// promotion to thumbnail.
const PROMOTION_MAX_DIMENSION: i64 = 512;

/// Resolve the thumbnail for a freshly parsed store.
///
/// `thumbnail_base` is the file-absolute offset the thumbnail directory's
/// offset values are relative to (the owning TIFF block's position).
pub(crate) fn resolve<R: Read + Seek>(
    store: &mut DirectoryStore,
    order: ByteOrder,
    container: Container,
    thumbnail_base: u64,
    source: &mut R,
) -> Option<ThumbnailDescriptor> {
    promote_small_preview(store, order);

    // Olympus maker notes can carry the thumbnail bytes directly.
    if let Some(attr) = store.get(Group::OrfMakerNote, "ThumbnailImage") {
        if !attr.bytes.is_empty() {
            return Some(ThumbnailDescriptor {
                compression: ThumbnailCompression::Jpeg,
                bytes: attr.bytes.clone(),
                range: None,
                multi_strip: false,
                strips_contiguous: true,
            });
        }
    }

    let source_len = source.seek(SeekFrom::End(0)).ok()?;

    let jfif_offset = get_int(store, Group::Thumbnail, "JPEGInterchangeFormat", order);
    let jfif_length = get_int(store, Group::Thumbnail, "JPEGInterchangeFormatLength", order);
    if let (Some(offset), Some(length)) = (jfif_offset, jfif_length) {
        if offset >= 0 && length > 0 {
            let absolute = thumbnail_base + offset as u64;
            if absolute < source_len {
                let length = (length as u64).min(source_len - absolute);
                let mut bytes = vec![0u8; length as usize];
                if source.seek(SeekFrom::Start(absolute)).is_ok()
                    && source.read_exact(&mut bytes).is_ok()
                {
                    return Some(ThumbnailDescriptor {
                        compression: ThumbnailCompression::Jpeg,
                        bytes,
                        range: Some(ByteRange::new(absolute, length)),
                        multi_strip: false,
                        strips_contiguous: true,
                    });
                }
            }
            debug!("thumbnail offset/length outside the source, ignoring");
        }
    }

    resolve_strips(store, order, container, thumbnail_base, source, source_len)
}

/// Concatenate uncompressed thumbnail strips in array order, tracking
/// separately whether the original strips were contiguous.
fn resolve_strips<R: Read + Seek>(
    store: &DirectoryStore,
    order: ByteOrder,
    container: Container,
    thumbnail_base: u64,
    source: &mut R,
    source_len: u64,
) -> Option<ThumbnailDescriptor> {
    let offsets = store
        .get(Group::Thumbnail, "StripOffsets")?
        .int_values(order)?;
    let counts = store
        .get(Group::Thumbnail, "StripByteCounts")?
        .int_values(order)?;
    if offsets.is_empty() || offsets.len() != counts.len() {
        return None;
    }

    if !is_supported_strip_layout(store, order, container) {
        debug!("unsupported uncompressed thumbnail sample layout");
        return None;
    }

    let mut bytes = Vec::new();
    let mut contiguous = true;
    let mut previous: Option<ByteRange> = None;

    for (&offset, &count) in offsets.iter().zip(&counts) {
        if offset < 0 || count <= 0 {
            return None;
        }
        let absolute = thumbnail_base + offset as u64;
        let count = count as u64;
        if absolute + count > source_len {
            debug!("thumbnail strip outside the source, ignoring");
            return None;
        }
        let strip = ByteRange::new(absolute, count);
        if let Some(prev) = previous {
            if !prev.is_contiguous_with(&strip) {
                contiguous = false;
            }
        }
        previous = Some(strip);

        let start = bytes.len();
        bytes.resize(start + count as usize, 0);
        source.seek(SeekFrom::Start(absolute)).ok()?;
        source.read_exact(&mut bytes[start..]).ok()?;
    }

    let total = bytes.len() as u64;
    let first = thumbnail_base + offsets[0] as u64;
    Some(ThumbnailDescriptor {
        compression: ThumbnailCompression::Uncompressed,
        bytes,
        range: contiguous.then(|| ByteRange::new(first, total)),
        multi_strip: offsets.len() > 1,
        strips_contiguous: contiguous,
    })
}

/// Supported uncompressed layouts: 3x8-bit RGB, plus the DNG-specific
/// 8-bit grayscale and YCbCr cases.
fn is_supported_strip_layout(store: &DirectoryStore, order: ByteOrder, container: Container) -> bool {
    let Some(bits) = store
        .get(Group::Thumbnail, "BitsPerSample")
        .and_then(|a| a.int_values(order))
    else {
        return false;
    };

    if bits == [8, 8, 8] {
        return true;
    }

    if container == Container::Dng {
        let photometric = get_int(store, Group::Thumbnail, "PhotometricInterpretation", order);
        if photometric == Some(1) && bits == [8] {
            return true;
        }
        if photometric == Some(6) && bits == [8, 8, 8] {
            return true;
        }
    }

    false
}

/// Promote the preview image to thumbnail when the thumbnail directory
/// has no image of its own and the preview is small enough, clearing the
/// preview group.
fn promote_small_preview(store: &mut DirectoryStore, order: ByteOrder) {
    let thumbnail_has_image = store.get(Group::Thumbnail, "JPEGInterchangeFormat").is_some()
        || store.get(Group::Thumbnail, "StripOffsets").is_some();
    if thumbnail_has_image {
        return;
    }

    let width = get_int(store, Group::Preview, "ImageWidth", order);
    let height = get_int(store, Group::Preview, "ImageLength", order);
    let (Some(width), Some(height)) = (width, height) else {
        return;
    };
    if width > PROMOTION_MAX_DIMENSION || height > PROMOTION_MAX_DIMENSION {
        return;
    }

    let preview: Vec<(String, ExifAttribute)> = store.group_mut(Group::Preview).drain().collect();
    for (name, attribute) in preview {
        // Preview uses the primary table's names; translate by tag id into
        // the thumbnail table's spelling.
        let Some(def) = tags::find_by_name(Group::Preview, &name) else {
            continue;
        };
        let Some(thumb_def) = tags::find_by_id(Group::Thumbnail, def.id) else {
            continue;
        };
        store.set(Group::Thumbnail, thumb_def.name, attribute);
    }
}

fn get_int(store: &DirectoryStore, group: Group, name: &str, order: ByteOrder) -> Option<i64> {
    store.get(group, name).and_then(|a| a.int_value(order))
}
