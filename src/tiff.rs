//! TIFF directory codec
//!
//! Decodes and encodes TIFF-style Image File Directories at arbitrary byte
//! offsets inside an in-memory EXIF block. This is the engine behind every
//! container adapter: JPEG APP1 payloads, PNG `eXIf` chunks, WebP `EXIF`
//! chunks and the TIFF-structured RAW variants all land here.
//!
//! Block layout:
//! - Header: byte order (II/MM), start code (0x002A), first IFD offset
//! - IFD: entry count, entries (12 bytes each), next IFD offset
//! - Entry: tag id (2), format (2), component count (4), value/offset (4)

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::tags::{self, Group};
use crate::value::{ByteOrder, ExifAttribute, ExifFormat};

/// TIFF start code following the byte-order marker
pub(crate) const TIFF_START_CODE: u16 = 0x002A;

/// Upper bound on entries per directory, against hostile counts
const MAX_DIRECTORY_ENTRIES: u16 = 1000;

/// Header size preceding the first directory
const TIFF_HEADER_SIZE: u32 = 8;

/// Per-group name-to-attribute maps
///
/// Exclusively owned by one session; entries are created at parse time and
/// mutated only through the attribute-set operation.
#[derive(Debug)]
pub(crate) struct DirectoryStore {
    groups: Vec<HashMap<String, ExifAttribute>>,
}

impl DirectoryStore {
    pub fn new() -> Self {
        Self {
            groups: (0..Group::COUNT).map(|_| HashMap::new()).collect(),
        }
    }

    pub fn group(&self, group: Group) -> &HashMap<String, ExifAttribute> {
        &self.groups[group.index()]
    }

    pub fn group_mut(&mut self, group: Group) -> &mut HashMap<String, ExifAttribute> {
        &mut self.groups[group.index()]
    }

    pub fn get(&self, group: Group, name: &str) -> Option<&ExifAttribute> {
        self.groups[group.index()].get(name)
    }

    pub fn set(&mut self, group: Group, name: &str, attribute: ExifAttribute) {
        self.groups[group.index()].insert(name.to_string(), attribute);
    }

    pub fn remove(&mut self, group: Group, name: &str) -> Option<ExifAttribute> {
        self.groups[group.index()].remove(name)
    }

    /// First value for a name across groups, in fixed priority order with
    /// the primary image group first.
    pub fn find(&self, name: &str) -> Option<(Group, &ExifAttribute)> {
        Group::PRIORITY
            .iter()
            .find_map(|&g| self.get(g, name).map(|a| (g, a)))
    }

    /// Merge another store's groups into this one, keeping existing
    /// attributes on collision. Used when a container carries metadata in
    /// more than one place (RAF CFA block plus embedded JPEG).
    pub fn absorb(&mut self, other: DirectoryStore) {
        for (index, group) in other.groups.into_iter().enumerate() {
            let target = &mut self.groups[index];
            for (name, attribute) in group {
                target.entry(name).or_insert(attribute);
            }
        }
    }
}

/// Result of decoding one TIFF block
pub(crate) struct TiffBlock {
    pub store: DirectoryStore,
    pub byte_order: ByteOrder,
}

/// Decode a full TIFF block into a directory store.
///
/// `base_offset` is the file-absolute position of `data[0]`, recorded into
/// each attribute's `source_offset` for later byte-range queries.
/// `start_group` is the group the first directory populates (Primary for
/// most containers, Preview for embedded RAW previews). Start-code
/// validation is skipped for the RAW variants that deliberately use a
/// different code.
pub(crate) fn parse(
    data: &[u8],
    base_offset: u64,
    start_group: Group,
    validate_start_code: bool,
) -> Result<TiffBlock> {
    if data.len() < TIFF_HEADER_SIZE as usize {
        return Err(Error::InvalidFormat("truncated TIFF header".into()));
    }

    let order = match &data[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return Err(Error::InvalidFormat("bad TIFF byte-order marker".into())),
    };

    let start_code = order.read_u16(&data[2..4]);
    if validate_start_code && start_code != TIFF_START_CODE {
        return Err(Error::InvalidFormat(format!(
            "bad TIFF start code {start_code:#06X}"
        )));
    }

    let first_offset = order.read_u32(&data[4..8]) as usize;
    let mut store = DirectoryStore::new();

    if first_offset >= data.len() {
        warn!("first directory offset {first_offset} beyond block end, no directories read");
        return Ok(TiffBlock {
            store,
            byte_order: order,
        });
    }

    let mut visited = HashSet::new();
    read_directory(
        data,
        order,
        first_offset,
        start_group,
        base_offset,
        &mut store,
        &mut visited,
    );

    Ok(TiffBlock {
        store,
        byte_order: order,
    })
}

/// Decode one directory, recursing into pointer-tag children and following
/// the terminal next-directory offset.
///
/// Entry-level problems (unknown tag, incompatible format, absurd count,
/// offset beyond the block) skip the single entry and continue: real-world
/// files routinely carry vendor or malformed entries that must not abort
/// extraction of everything else. Directory offsets already seen in this
/// decode are skipped entirely, which bounds hostile pointer cycles.
fn read_directory(
    data: &[u8],
    order: ByteOrder,
    offset: usize,
    group: Group,
    base_offset: u64,
    store: &mut DirectoryStore,
    visited: &mut HashSet<usize>,
) {
    if !visited.insert(offset) {
        warn!("directory offset {offset} already visited, skipping cycle");
        return;
    }

    if offset + 2 > data.len() {
        warn!("directory offset {offset} beyond block end");
        return;
    }
    let count = order.read_u16(&data[offset..offset + 2]);
    if count == 0 {
        return;
    }
    if count > MAX_DIRECTORY_ENTRIES || offset + 2 + count as usize * 12 + 4 > data.len() {
        warn!("directory at {offset} claims {count} entries, beyond block end");
        return;
    }

    for index in 0..count as usize {
        let entry_offset = offset + 2 + index * 12;
        let entry = &data[entry_offset..entry_offset + 12];
        let tag_id = order.read_u16(&entry[0..2]);
        let raw_format = order.read_u16(&entry[2..4]);
        let components = order.read_u32(&entry[4..8]);

        let Some(format) = ExifFormat::from_raw(raw_format) else {
            debug!("tag {tag_id:#06X}: invalid format {raw_format}, skipping entry");
            continue;
        };

        let Some(def) = tags::find_by_id(group, tag_id) else {
            debug!("unknown tag {tag_id:#06X} in {group:?}, skipping entry");
            continue;
        };

        if !def.accepts(format) {
            debug!(
                "tag {} stored as {format:?}, not accepted, skipping entry",
                def.name
            );
            continue;
        }

        let Some(byte_len) = (components as u64).checked_mul(format.unit_size() as u64) else {
            debug!("tag {}: component count overflows, skipping entry", def.name);
            continue;
        };
        if byte_len > data.len() as u64 {
            debug!(
                "tag {}: value length {byte_len} beyond block end, skipping entry",
                def.name
            );
            continue;
        }

        let value_field = entry_offset + 8;
        let (value_offset, bytes) = if byte_len > 4 {
            let target = order.read_u32(&data[value_field..value_field + 4]) as usize;
            let Some(end) = target.checked_add(byte_len as usize) else {
                debug!("tag {}: value offset overflows, skipping entry", def.name);
                continue;
            };
            if end > data.len() {
                debug!(
                    "tag {}: value at {target} runs beyond block end, skipping entry",
                    def.name
                );
                continue;
            }
            (target, data[target..end].to_vec())
        } else {
            (
                value_field,
                data[value_field..value_field + byte_len as usize].to_vec(),
            )
        };

        if tags::is_pointer_tag(group, tag_id) {
            let Some(child) = tags::pointer_child_group(tag_id) else {
                continue;
            };
            let pointer = ExifAttribute::new(format, components, bytes);
            match pointer.int_value(order) {
                Some(child_offset) if child_offset > 0 && (child_offset as usize) < data.len() => {
                    read_directory(
                        data,
                        order,
                        child_offset as usize,
                        child,
                        base_offset,
                        store,
                        visited,
                    );
                }
                _ => debug!("pointer tag {} has unusable offset", def.name),
            }
            continue;
        }

        let mut attribute = ExifAttribute::new(format, components, bytes);
        attribute.source_offset = Some(base_offset + value_offset as u64);
        store.set(group, def.name, attribute);
    }

    // The trailing offset chains directories that carry embedded thumbnail
    // and preview data: the first chained directory fills Thumbnail, the
    // next fills Preview.
    let next_field = offset + 2 + count as usize * 12;
    let next_offset = order.read_u32(&data[next_field..next_field + 4]) as usize;
    if next_offset > 0 && next_offset < data.len() {
        let target = if store.group(Group::Thumbnail).is_empty() {
            Some(Group::Thumbnail)
        } else if store.group(Group::Preview).is_empty() {
            Some(Group::Preview)
        } else {
            None
        };
        if let Some(target) = target {
            read_directory(data, order, next_offset, target, base_offset, store, visited);
        }
    }
}

/// Decode a directory tree rooted at `offset` inside an isolated block
/// (vendor maker notes parse with offsets relative to their own buffer).
/// Returns a fresh store; anomalies degrade quietly exactly as in a
/// top-level decode.
pub(crate) fn parse_directories_at(
    data: &[u8],
    order: ByteOrder,
    offset: usize,
    group: Group,
    base_offset: u64,
) -> DirectoryStore {
    let mut store = DirectoryStore::new();
    if offset < data.len() {
        let mut visited = HashSet::new();
        read_directory(data, order, offset, group, base_offset, &mut store, &mut visited);
    }
    store
}

/// Thumbnail payload appended after the directory blocks on encode
pub(crate) struct ThumbnailPayload<'a> {
    pub bytes: &'a [u8],
    /// Write strip offset/byte-count tags instead of the JFIF pair
    pub as_strips: bool,
}

/// Groups emitted on save, in block order
const OUTPUT_GROUPS: [Group; 5] = [
    Group::Primary,
    Group::Exif,
    Group::Gps,
    Group::Interop,
    Group::Thumbnail,
];

const PRIMARY: usize = 0;
const EXIF: usize = 1;
const GPS: usize = 2;
const INTEROP: usize = 3;
const THUMBNAIL: usize = 4;

/// Encode the store back into a contiguous TIFF block.
///
/// Offsets for all groups are computed in a first pass so forward
/// references are known before any bytes are written; pointer tags in
/// parent groups are rewritten with the freshly computed child offsets
/// immediately before emission. Entries are written sorted by tag id with
/// values larger than four bytes placed in the owning group's overflow
/// area, in entry order.
pub(crate) fn encode(
    store: &DirectoryStore,
    order: ByteOrder,
    thumbnail: Option<&ThumbnailPayload<'_>>,
) -> Result<Vec<u8>> {
    // Working copies: pointer and thumbnail-location tags are synthesized
    // here, never persisted into the live store.
    let mut groups: Vec<HashMap<String, ExifAttribute>> = OUTPUT_GROUPS
        .iter()
        .map(|&g| store.group(g).clone())
        .collect();

    for name in [
        "JPEGInterchangeFormat",
        "JPEGInterchangeFormatLength",
        "StripOffsets",
        "StripByteCounts",
    ] {
        groups[THUMBNAIL].remove(name);
    }

    groups[PRIMARY].remove("ExifIFDPointer");
    groups[PRIMARY].remove("GPSInfoIFDPointer");
    groups[PRIMARY].remove("SubIFDPointer");
    groups[EXIF].remove("InteroperabilityIFDPointer");

    // Placeholder pointers make parent groups non-empty before layout.
    let placeholder = ExifAttribute::ulong(&[0], order);
    if !groups[INTEROP].is_empty() {
        groups[EXIF].insert("InteroperabilityIFDPointer".into(), placeholder.clone());
    }
    if !groups[EXIF].is_empty() {
        groups[PRIMARY].insert("ExifIFDPointer".into(), placeholder.clone());
    }
    if !groups[GPS].is_empty() {
        groups[PRIMARY].insert("GPSInfoIFDPointer".into(), placeholder.clone());
    }
    if let Some(payload) = thumbnail {
        if payload.as_strips {
            groups[THUMBNAIL].insert("StripOffsets".into(), placeholder.clone());
            groups[THUMBNAIL].insert("StripByteCounts".into(), placeholder.clone());
        } else {
            groups[THUMBNAIL].insert("JPEGInterchangeFormat".into(), placeholder.clone());
            groups[THUMBNAIL].insert("JPEGInterchangeFormatLength".into(), placeholder);
        }
    }

    // First pass: block offset per written group. The primary group is
    // always present so the block stays a valid TIFF instance.
    let written: Vec<bool> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| i == PRIMARY || !g.is_empty())
        .collect();

    let mut offsets = [0u32; 5];
    let mut position = TIFF_HEADER_SIZE;
    for (i, group) in groups.iter().enumerate() {
        if !written[i] {
            continue;
        }
        offsets[i] = position;
        let entry_count = group.len() as u32;
        let overflow: u32 = group
            .values()
            .map(|a| {
                let len = a.byte_len() as u32;
                if len > 4 {
                    len
                } else {
                    0
                }
            })
            .sum();
        position = position
            .checked_add(2 + 12 * entry_count + 4 + overflow)
            .ok_or_else(|| Error::InvalidFormat("encoded block too large".into()))?;
    }

    let thumbnail_offset = position;
    let total_len = position as usize + thumbnail.map(|t| t.bytes.len()).unwrap_or(0);

    // Rewrite pointers and thumbnail locations with real offsets.
    if written[EXIF] {
        groups[PRIMARY].insert(
            "ExifIFDPointer".into(),
            ExifAttribute::ulong(&[offsets[EXIF]], order),
        );
    }
    if written[GPS] {
        groups[PRIMARY].insert(
            "GPSInfoIFDPointer".into(),
            ExifAttribute::ulong(&[offsets[GPS]], order),
        );
    }
    if written[INTEROP] {
        groups[EXIF].insert(
            "InteroperabilityIFDPointer".into(),
            ExifAttribute::ulong(&[offsets[INTEROP]], order),
        );
    }
    if let Some(payload) = thumbnail {
        let length = payload.bytes.len() as u32;
        if payload.as_strips {
            groups[THUMBNAIL].insert(
                "StripOffsets".into(),
                ExifAttribute::ulong(&[thumbnail_offset], order),
            );
            groups[THUMBNAIL].insert(
                "StripByteCounts".into(),
                ExifAttribute::ulong(&[length], order),
            );
        } else {
            groups[THUMBNAIL].insert(
                "JPEGInterchangeFormat".into(),
                ExifAttribute::ulong(&[thumbnail_offset], order),
            );
            groups[THUMBNAIL].insert(
                "JPEGInterchangeFormatLength".into(),
                ExifAttribute::ulong(&[length], order),
            );
        }
    }

    // Second pass: emit bytes.
    let mut out = Vec::with_capacity(total_len);
    match order {
        ByteOrder::LittleEndian => out.extend_from_slice(b"II"),
        ByteOrder::BigEndian => out.extend_from_slice(b"MM"),
    }
    order.put_u16(&mut out, TIFF_START_CODE);
    order.put_u32(&mut out, TIFF_HEADER_SIZE);

    for (i, group) in groups.iter().enumerate() {
        if !written[i] {
            continue;
        }

        let group_id = OUTPUT_GROUPS[i];
        let mut entries: Vec<(u16, &ExifAttribute)> = group
            .iter()
            .filter_map(|(name, attr)| {
                tags::find_by_name(group_id, name).map(|def| (def.id, attr))
            })
            .collect();
        entries.sort_by_key(|&(id, _)| id);

        let entry_count = entries.len() as u32;
        order.put_u16(&mut out, entry_count as u16);

        let overflow_base = offsets[i] + 2 + 12 * entry_count + 4;
        let mut overflow: Vec<u8> = Vec::new();

        for (id, attr) in &entries {
            order.put_u16(&mut out, *id);
            order.put_u16(&mut out, attr.format as u16);
            order.put_u32(&mut out, attr.components);
            if attr.byte_len() > 4 {
                order.put_u32(&mut out, overflow_base + overflow.len() as u32);
                overflow.extend_from_slice(&attr.bytes);
            } else {
                let mut field = attr.bytes.clone();
                field.resize(4, 0);
                out.extend_from_slice(&field);
            }
        }

        // Next-directory offset: the primary block links the thumbnail
        // block when thumbnail data exists, all other blocks terminate.
        let next = if i == PRIMARY && thumbnail.is_some() && written[THUMBNAIL] {
            offsets[THUMBNAIL]
        } else {
            0
        };
        order.put_u32(&mut out, next);
        out.extend_from_slice(&overflow);
    }

    if let Some(payload) = thumbnail {
        out.extend_from_slice(payload.bytes);
    }

    Ok(out)
}
