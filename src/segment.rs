//! Segment types and location tracking

/// A byte range in a file (offset and size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset from start of file
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
}

impl ByteRange {
    /// Create a new byte range
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this range
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Check if this range is immediately followed by another (contiguous)
    pub fn is_contiguous_with(&self, other: &ByteRange) -> bool {
        self.end_offset() == other.offset
    }
}

/// Logical classification of a segment or chunk
///
/// This represents what the segment IS from the session's perspective,
/// independent of how it's physically stored in any particular container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// File signature / container header
    Header,
    /// EXIF metadata (JPEG APP1, PNG eXIf, WebP EXIF)
    Exif,
    /// XMP metadata stored in its own marker or chunk
    Xmp,
    /// JPEG extended-XMP continuation segment
    ExtendedXmp,
    /// ICC color profile
    IccProfile,
    /// Photoshop image resources (JPEG APP13)
    Photoshop,
    /// Plain comment segment
    Comment,
    /// Compressed image data
    ImageData,
    /// Other/unknown segment type
    Other,
}

/// One discovered segment: full byte span including marker, length and
/// checksum fields, so splicing can copy it verbatim.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: ByteRange,
    /// Container-level label (JPEG marker name, PNG/WebP chunk type)
    pub label: Option<String>,
}

impl Segment {
    pub fn new(offset: u64, size: u64, kind: SegmentKind, label: Option<String>) -> Self {
        Self {
            kind,
            range: ByteRange::new(offset, size),
            label,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label.as_deref() == Some(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_contiguity() {
        let a = ByteRange::new(0, 10);
        let b = ByteRange::new(10, 5);
        let c = ByteRange::new(16, 5);
        assert!(a.is_contiguous_with(&b));
        assert!(!b.is_contiguous_with(&c));
        assert_eq!(b.end_offset(), 15);
    }
}
