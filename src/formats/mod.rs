//! Container-format adapters
//!
//! Each adapter locates the EXIF/TIFF byte blob inside its container and,
//! for the writable containers, splices freshly encoded metadata back in
//! while copying every unrelated byte verbatim.

use std::io::{Read, Seek, Write};

use crate::error::{Error, Result};
use crate::structure::Structure;
use crate::tags::Group;

#[cfg(feature = "jpeg")]
pub(crate) mod jpeg_io;
#[cfg(feature = "png")]
pub(crate) mod png_io;
#[cfg(feature = "raw")]
pub(crate) mod raw_io;
#[cfg(feature = "webp")]
pub(crate) mod webp_io;

/// Container format, resolved once at open time from signature bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Jpeg,
    Png,
    Webp,
    Heif,
    Orf,
    Rw2,
    Pef,
    Raf,
    Dng,
    Unknown,
}

impl Container {
    /// Whether the adapter needs random-access seeking over the whole
    /// source, as opposed to a forward streaming scan.
    pub fn needs_random_access(&self) -> bool {
        matches!(
            self,
            Container::Orf | Container::Rw2 | Container::Pef | Container::Dng | Container::Heif
        )
    }

    /// Whether in-place attribute saving is supported for this container.
    pub fn is_writable(&self) -> bool {
        matches!(self, Container::Jpeg | Container::Png | Container::Webp)
    }
}

/// Number of leading bytes needed to sniff every supported signature
pub(crate) const SNIFF_LEN: usize = 16;

/// EXIF identifier prefixing the JPEG APP1 payload, the PNG `eXIf` chunk
/// and the WebP `EXIF` chunk, and standing alone before a bare TIFF block
pub(crate) const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

const HEIF_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

/// Resolve the container kind from leading signature bytes.
///
/// Generic TIFF signatures resolve to DNG here; a later pass refines them
/// to PEF (by camera make) once the primary directory has been decoded.
pub(crate) fn detect_container(header: &[u8]) -> Container {
    if header.len() >= 2 && header[0] == 0xFF && header[1] == 0xD8 {
        return Container::Jpeg;
    }
    if header.len() >= 8 && &header[0..8] == b"\x89PNG\r\n\x1a\n" {
        return Container::Png;
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Container::Webp;
    }
    if header.len() >= 15 && &header[0..15] == b"FUJIFILMCCD-RAW" {
        return Container::Raf;
    }
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        let brand = &header[8..12];
        if HEIF_BRANDS.iter().any(|b| *b == brand) {
            return Container::Heif;
        }
        return Container::Unknown;
    }
    if header.len() >= 4 {
        match &header[0..4] {
            b"IIRO" | b"IIRS" | b"MMOR" => return Container::Orf,
            b"IIU\0" => return Container::Rw2,
            b"II*\0" | b"MM\0*" => return Container::Dng,
            _ => {}
        }
    }
    Container::Unknown
}

/// Update strategy for one metadata stream when splicing
///
/// The default keeps existing bytes unchanged.
#[derive(Debug, Clone, Default)]
pub(crate) enum MetadataUpdate {
    /// Copy existing segment verbatim (default)
    #[default]
    Keep,
    /// Drop the existing segment without replacement
    Remove,
    /// Replace or insert freshly encoded bytes
    Set(Vec<u8>),
}

/// Updates applied by a container splice
#[derive(Debug, Default)]
pub(crate) struct Updates {
    pub exif: MetadataUpdate,
    pub xmp: MetadataUpdate,
    pub icc: MetadataUpdate,
    pub photoshop: MetadataUpdate,
}

/// EXIF/TIFF blob located inside a container
pub(crate) struct ExifBlob {
    /// TIFF block bytes, identifier prefix stripped
    pub data: Vec<u8>,
    /// File-absolute offset of `data[0]`
    pub base_offset: u64,
}

/// An attribute discovered by the container scan itself, outside the TIFF
/// block (JPEG SOF dimensions, COM comments, RAF CFA dimensions).
///
/// Carried as text and encoded by the session once the TIFF byte order is
/// known, through the same path as a caller-supplied attribute set.
pub(crate) struct ExtraAttribute {
    pub group: Group,
    pub name: &'static str,
    pub value: String,
    /// Only apply when the attribute is not already populated
    pub only_if_absent: bool,
}

/// Result of one adapter parse pass
pub(crate) struct ParsedContainer {
    pub structure: Structure,
    pub exif: Option<ExifBlob>,
    /// XMP payload captured from its own marker or chunk
    pub xmp: Option<Vec<u8>>,
    pub extras: Vec<ExtraAttribute>,
}

/// Encode scan-level extras into the store using the block's byte order,
/// through the same coercion path as a caller-supplied attribute set.
pub(crate) fn apply_extras(
    store: &mut crate::tiff::DirectoryStore,
    order: crate::value::ByteOrder,
    extras: &[ExtraAttribute],
) {
    for extra in extras {
        if extra.only_if_absent && store.get(extra.group, extra.name).is_some() {
            continue;
        }
        let Some(def) = crate::tags::find_by_name(extra.group, extra.name) else {
            continue;
        };
        match crate::value::ExifAttribute::from_string(def.primary, def.secondary, &extra.value, order)
        {
            Ok(attribute) => store.set(extra.group, extra.name, attribute),
            Err(e) => log::debug!("dropping scan attribute {}: {e}", extra.name),
        }
    }
}

/// Parse dispatch for the streaming containers
#[allow(unused_variables)]
pub(crate) fn parse_container<R: Read + Seek>(
    container: Container,
    source: &mut R,
) -> Result<ParsedContainer> {
    match container {
        #[cfg(feature = "jpeg")]
        Container::Jpeg => jpeg_io::parse(source),
        #[cfg(feature = "png")]
        Container::Png => png_io::parse(source),
        #[cfg(feature = "webp")]
        Container::Webp => webp_io::parse(source),
        _ => Err(Error::Unsupported(format!(
            "no parser available for {container:?}"
        ))),
    }
}

/// Splice dispatch for the writable containers
#[allow(unused_variables)]
pub(crate) fn splice_container<R: Read + Seek, W: Write>(
    container: Container,
    structure: &Structure,
    source: &mut R,
    writer: &mut W,
    updates: &Updates,
) -> Result<()> {
    match container {
        #[cfg(feature = "jpeg")]
        Container::Jpeg => jpeg_io::splice(structure, source, writer, updates),
        #[cfg(feature = "png")]
        Container::Png => png_io::splice(structure, source, writer, updates),
        #[cfg(feature = "webp")]
        Container::Webp => webp_io::splice(structure, source, writer, updates),
        _ => Err(Error::Unsupported(format!(
            "saving is not supported for {container:?}"
        ))),
    }
}

/// Random-access byte-range source handed to a platform media-metadata
/// extractor for ISO-BMFF (HEIF/HEIC) containers. Extraction itself is
/// delegated to the platform; this crate only defines the seam.
pub trait ByteRangeSource {
    /// Total size of the source in bytes
    fn size(&mut self) -> Result<u64>;

    /// Read up to `buf.len()` bytes starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_signatures() {
        assert_eq!(detect_container(&[0xFF, 0xD8, 0xFF, 0xE0]), Container::Jpeg);
        assert_eq!(
            detect_container(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Container::Png
        );
        assert_eq!(detect_container(b"RIFF\x10\0\0\0WEBPVP8 "), Container::Webp);
        assert_eq!(detect_container(b"FUJIFILMCCD-RAW "), Container::Raf);
        assert_eq!(detect_container(b"IIRO\x08\0\0\0stuff..."), Container::Orf);
        assert_eq!(detect_container(b"IIU\0\x18\0\0\0........"), Container::Rw2);
        assert_eq!(detect_container(b"II*\0\x08\0\0\0........"), Container::Dng);
        assert_eq!(
            detect_container(b"\0\0\0\x18ftypheic\0\0\0\0"),
            Container::Heif
        );
        assert_eq!(detect_container(b"plain text here!"), Container::Unknown);
        assert_eq!(detect_container(&[]), Container::Unknown);
    }
}
