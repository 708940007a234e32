//! Structure representation for parsed containers

use crate::formats::Container;
use crate::segment::{Segment, SegmentKind};

/// The discovered segment layout of a parsed container
///
/// Container adapters build this during their single parse pass; the save
/// pipeline walks it to copy every unrelated byte verbatim while replacing
/// only the metadata segments.
#[derive(Debug)]
pub struct Structure {
    /// All segments in file order
    pub segments: Vec<Segment>,

    /// Container format
    pub container: Container,

    /// Total size of the parsed file
    pub total_size: u64,

    /// Quick lookup: index of the first EXIF segment (if any)
    exif_index: Option<usize>,
}

impl Structure {
    pub fn new(container: Container) -> Self {
        Self {
            segments: Vec::new(),
            container,
            total_size: 0,
            exif_index: None,
        }
    }

    /// Add a segment and update indices
    pub fn add_segment(&mut self, segment: Segment) {
        let index = self.segments.len();
        if segment.kind == SegmentKind::Exif && self.exif_index.is_none() {
            self.exif_index = Some(index);
        }
        self.segments.push(segment);
    }

    pub fn exif_index(&self) -> Option<usize> {
        self.exif_index
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}
