//! Metadata session
//!
//! `ExifAsset` owns the directory store for one open file or stream. It is
//! created by a single parse pass, mutated only through the attribute-set
//! operation, and discarded when closed. Nothing here is safe for
//! concurrent mutation; callers wanting timeouts or cancellation wrap the
//! blocking calls at a higher layer.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{error, warn};

use crate::error::{Error, Result};
use crate::formats::{
    self, detect_container, Container, MetadataUpdate, Updates, EXIF_IDENTIFIER, SNIFF_LEN,
};
use crate::segment::ByteRange;
use crate::structure::Structure;
use crate::tags::{self, Group};
use crate::thumbnail::{self, ThumbnailCompression, ThumbnailDescriptor};
use crate::tiff::{self, DirectoryStore, ThumbnailPayload};
use crate::value::{normalize_datetime, ByteOrder, ExifAttribute, Rational};

/// Tags exposed and accepted in decimal string form although stored as
/// rational pairs
const DECIMAL_COMPAT_TAGS: [&str; 4] = [
    "ExposureTime",
    "FNumber",
    "SubjectDistance",
    "DigitalZoomRatio",
];

const DATETIME_TAGS: [&str; 3] = ["DateTime", "DateTimeOriginal", "DateTimeDigitized"];

// Orientation lattice: two disjoint 4-cycles (un-flipped 1,6,3,8 and
// flipped 2,7,4,5), indexed by the current orientation value.
const ROTATE_90: [i32; 9] = [0, 6, 7, 8, 5, 2, 3, 4, 1];
const FLIP_HORIZONTAL: [i32; 9] = [0, 2, 1, 4, 3, 6, 5, 8, 7];
const FLIP_VERTICAL: [i32; 9] = [0, 4, 3, 2, 1, 8, 7, 6, 5];

/// Location-like value object for the bulk GPS setter
#[derive(Debug, Clone, Default)]
pub struct GpsInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_meters: Option<f64>,
    pub speed_meters_per_second: Option<f64>,
    /// Millisecond epoch timestamp, recorded as UTC date and time stamps
    pub timestamp_millis: Option<i64>,
    /// Source of the fix, recorded as the processing method
    pub provider: Option<String>,
}

enum Source {
    Path(PathBuf),
    Handle(File),
    Memory(io::Cursor<Vec<u8>>),
}

/// One open file or stream with its parsed metadata
///
/// ```no_run
/// use exif_io::ExifAsset;
///
/// # fn main() -> exif_io::Result<()> {
/// let mut asset = ExifAsset::open("photo.jpg")?;
/// if let Some(make) = asset.get_attribute("Make") {
///     println!("taken with {make}");
/// }
/// asset.set_attribute("Orientation", Some("6"))?;
/// asset.save_attributes()?;
/// # Ok(())
/// # }
/// ```
pub struct ExifAsset {
    source: Source,
    container: Container,
    store: DirectoryStore,
    byte_order: ByteOrder,
    structure: Option<Structure>,
    thumbnail: Option<ThumbnailDescriptor>,
    xmp_from_separate_marker: bool,
    standalone: bool,
    modified: bool,
    saved: bool,
}

struct LoadedState {
    container: Container,
    store: DirectoryStore,
    byte_order: ByteOrder,
    structure: Option<Structure>,
    thumbnail: Option<ThumbnailDescriptor>,
    xmp_from_separate_marker: bool,
}

impl ExifAsset {
    /// Open a file by path. Mutation support requires the path to remain
    /// writable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(&path)?;
        let state = Self::load(&mut file)?;
        Ok(Self::from_state(state, Source::Path(path.as_ref().to_path_buf())))
    }

    /// Open from an owned file handle. Saving requires the handle to have
    /// been opened read-write.
    pub fn from_file(mut file: File) -> Result<Self> {
        let state = Self::load(&mut file)?;
        Ok(Self::from_state(state, Source::Handle(file)))
    }

    /// Open from a read-only stream. The stream is buffered in memory;
    /// in-place saving is not available.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let mut cursor = io::Cursor::new(data);
        let state = Self::load(&mut cursor)?;
        Ok(Self::from_state(state, Source::Memory(cursor)))
    }

    /// Open a standalone EXIF blob: exactly `Exif\0\0` followed by a TIFF
    /// block, with no surrounding container.
    pub fn from_standalone_exif<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if !data.starts_with(EXIF_IDENTIFIER) {
            return Err(Error::InvalidFormat(
                "standalone EXIF stream missing identifier".into(),
            ));
        }

        let base = EXIF_IDENTIFIER.len() as u64;
        let block = tiff::parse(&data[EXIF_IDENTIFIER.len()..], base, Group::Primary, true)?;
        let mut store = block.store;
        let byte_order = block.byte_order;

        let mut cursor = io::Cursor::new(data);
        let thumbnail = thumbnail::resolve(
            &mut store,
            byte_order,
            Container::Unknown,
            base,
            &mut cursor,
        );

        Ok(Self {
            source: Source::Memory(cursor),
            container: Container::Unknown,
            store,
            byte_order,
            structure: None,
            thumbnail,
            xmp_from_separate_marker: false,
            standalone: true,
            modified: false,
            saved: false,
        })
    }

    fn from_state(state: LoadedState, source: Source) -> Self {
        Self {
            source,
            container: state.container,
            store: state.store,
            byte_order: state.byte_order,
            structure: state.structure,
            thumbnail: state.thumbnail,
            xmp_from_separate_marker: state.xmp_from_separate_marker,
            standalone: false,
            modified: false,
            saved: false,
        }
    }

    /// One full parse: sniff the container, run its adapter, decode the
    /// TIFF block, resolve the thumbnail.
    ///
    /// Format-level failures while locating metadata are downgraded to
    /// "no metadata found" so slightly-malformed real-world files still
    /// open; I/O errors and unsupported containers surface.
    fn load<R: Read + Seek>(source: &mut R) -> Result<LoadedState> {
        source.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < header.len() {
            let n = source.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let container = detect_container(&header[..filled]);
        source.seek(SeekFrom::Start(0))?;

        let result = Self::load_container(container, source);
        match result {
            Ok(state) => Ok(state),
            Err(e) if e.is_format_error() => {
                warn!("no usable metadata in {container:?} source: {e}");
                Ok(LoadedState {
                    container,
                    store: DirectoryStore::new(),
                    byte_order: ByteOrder::BigEndian,
                    structure: None,
                    thumbnail: None,
                    xmp_from_separate_marker: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn load_container<R: Read + Seek>(container: Container, source: &mut R) -> Result<LoadedState> {
        match container {
            Container::Jpeg | Container::Png | Container::Webp => {
                let parsed = formats::parse_container(container, source)?;
                let (mut store, byte_order, blob_base) = match &parsed.exif {
                    Some(blob) => match tiff::parse(&blob.data, blob.base_offset, Group::Primary, true)
                    {
                        Ok(block) => (block.store, block.byte_order, blob.base_offset),
                        Err(e) => {
                            warn!("EXIF block unreadable, continuing without: {e}");
                            (DirectoryStore::new(), ByteOrder::BigEndian, 0)
                        }
                    },
                    None => (DirectoryStore::new(), ByteOrder::BigEndian, 0),
                };
                formats::apply_extras(&mut store, byte_order, &parsed.extras);

                let mut xmp_from_separate_marker = false;
                if let Some(xmp) = parsed.xmp {
                    if store.get(Group::Primary, "Xmp").is_none() {
                        store.set(Group::Primary, "Xmp", ExifAttribute::undefined(&xmp));
                        xmp_from_separate_marker = true;
                    }
                }

                let thumbnail =
                    thumbnail::resolve(&mut store, byte_order, container, blob_base, source);

                Ok(LoadedState {
                    container,
                    store,
                    byte_order,
                    structure: Some(parsed.structure),
                    thumbnail,
                    xmp_from_separate_marker,
                })
            }

            #[cfg(feature = "raw")]
            Container::Raf => {
                let raf = formats::raw_io::parse_raf(source)?;
                let mut store = raf.store;
                let thumbnail = thumbnail::resolve(
                    &mut store,
                    raf.byte_order,
                    container,
                    raf.thumbnail_base,
                    source,
                );
                Ok(LoadedState {
                    container,
                    store,
                    byte_order: raf.byte_order,
                    structure: None,
                    thumbnail,
                    xmp_from_separate_marker: false,
                })
            }

            #[cfg(feature = "raw")]
            Container::Orf | Container::Rw2 | Container::Pef | Container::Dng => {
                let mut data = Vec::new();
                source.read_to_end(&mut data)?;
                let validate = !matches!(container, Container::Orf | Container::Rw2);
                let block = tiff::parse(&data, 0, Group::Primary, validate)?;
                let mut store = block.store;
                let order = block.byte_order;

                let mut resolved = container;
                if resolved == Container::Dng && !formats::raw_io::is_dng(&store)
                    && formats::raw_io::is_pef(&store, order)
                {
                    resolved = Container::Pef;
                }

                let mut thumbnail_base = 0u64;
                match resolved {
                    Container::Orf => formats::raw_io::process_orf(&mut store, order),
                    Container::Rw2 => {
                        if let Some(base) = formats::raw_io::process_rw2(&mut store, order) {
                            thumbnail_base = base;
                        }
                    }
                    Container::Pef => formats::raw_io::process_pef(&mut store, order),
                    _ => {}
                }
                if formats::raw_io::is_dng(&store) {
                    formats::raw_io::process_dng(&mut store, order);
                }

                let mut cursor = io::Cursor::new(data);
                let thumbnail = thumbnail::resolve(
                    &mut store,
                    order,
                    resolved,
                    thumbnail_base,
                    &mut cursor,
                );

                Ok(LoadedState {
                    container: resolved,
                    store,
                    byte_order: order,
                    structure: None,
                    thumbnail,
                    xmp_from_separate_marker: false,
                })
            }

            Container::Heif => Err(Error::Unsupported(
                "HEIF metadata extraction is delegated to the platform media extractor".into(),
            )),

            _ => {
                warn!("no adapter available for {container:?}, no metadata read");
                Ok(LoadedState {
                    container,
                    store: DirectoryStore::new(),
                    byte_order: ByteOrder::BigEndian,
                    structure: None,
                    thumbnail: None,
                    xmp_from_separate_marker: false,
                })
            }
        }
    }

    /// The detected container kind
    pub fn container(&self) -> Container {
        self.container
    }

    /// Whether any attribute mutation is pending since open or the last
    /// successful save
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    // ------------------------------------------------------------------
    // Attribute API
    // ------------------------------------------------------------------

    /// Attribute value as a string, searching groups in fixed priority
    /// order with the primary image group first.
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        let name = tags::canonical_tag_name(name);
        let (_, attribute) = self.store.find(name)?;

        if name == "GPSTimeStamp" {
            if let Some(rationals) = attribute.rational_values(self.byte_order) {
                if rationals.len() == 3 && rationals.iter().all(|r| r.denominator != 0) {
                    return Some(format!(
                        "{:02}:{:02}:{:02}",
                        rationals[0].numerator / rationals[0].denominator,
                        rationals[1].numerator / rationals[1].denominator,
                        rationals[2].numerator / rationals[2].denominator,
                    ));
                }
            }
        } else if DECIMAL_COMPAT_TAGS.contains(&name) {
            if let Some(value) = attribute.double_value(self.byte_order) {
                return Some(value.to_string());
            }
        }

        attribute.string_value(self.byte_order)
    }

    /// Attribute value as an integer, or `default` when absent or not
    /// convertible.
    pub fn get_attribute_int(&self, name: &str, default: i32) -> i32 {
        let name = tags::canonical_tag_name(name);
        self.store
            .find(name)
            .and_then(|(_, a)| a.int_value(self.byte_order))
            .map(|v| v as i32)
            .unwrap_or(default)
    }

    /// Attribute value as a floating number, or `default` when absent or
    /// not convertible.
    pub fn get_attribute_double(&self, name: &str, default: f64) -> f64 {
        let name = tags::canonical_tag_name(name);
        self.store
            .find(name)
            .and_then(|(_, a)| a.double_value(self.byte_order))
            .unwrap_or(default)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.store.find(tags::canonical_tag_name(name)).is_some()
    }

    /// Set or clear an attribute.
    ///
    /// The value is written into every group whose table defines the name
    /// (the thumbnail group only when a thumbnail exists); `None` clears
    /// the attribute from all groups. Malformed date, GPS timestamp or
    /// decimal values fail without touching the store.
    pub fn set_attribute(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        let name = tags::canonical_tag_name(name);

        let Some(raw) = value else {
            for group in Group::PRIORITY {
                self.store.remove(group, name);
            }
            self.modified = true;
            return Ok(());
        };

        let mut value = raw.to_string();
        if DATETIME_TAGS.contains(&name) {
            value = normalize_datetime(raw)?;
        } else if name == "GPSTimeStamp" {
            value = gps_timestamp_to_rationals(raw)?;
        } else if DECIMAL_COMPAT_TAGS.contains(&name) && !value.contains('/') {
            let decimal: f64 = value.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!("{name} expects a decimal value, got {raw:?}"))
            })?;
            let rational = Rational::approximate(decimal);
            value = format!("{}/{}", rational.numerator, rational.denominator);
        }

        let mut applied = false;
        let mut known = false;
        let mut first_error: Option<Error> = None;

        for group in Group::PRIORITY {
            let Some(def) = tags::find_by_name(group, name) else {
                continue;
            };
            known = true;
            if group == Group::Thumbnail && self.thumbnail.is_none() {
                continue;
            }
            if group == Group::Preview && self.store.group(Group::Preview).is_empty() {
                continue;
            }
            match ExifAttribute::from_string(def.primary, def.secondary, &value, self.byte_order) {
                Ok(attribute) => {
                    self.store.set(group, name, attribute);
                    applied = true;
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if applied {
            self.modified = true;
            Ok(())
        } else if let Some(e) = first_error {
            Err(e)
        } else if known {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!("unknown tag name {name:?}")))
        }
    }

    /// Raw value bytes of an attribute
    pub fn get_attribute_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let name = tags::canonical_tag_name(name);
        self.store.find(name).map(|(_, a)| a.bytes.clone())
    }

    /// File-absolute byte range of an attribute's value, valid only until
    /// the file is rewritten.
    pub fn get_attribute_range(&self, name: &str) -> Result<Option<ByteRange>> {
        if self.saved {
            return Err(Error::Stale(
                "attribute ranges are invalid after saving".into(),
            ));
        }
        let name = tags::canonical_tag_name(name);
        Ok(self.store.find(name).and_then(|(_, a)| {
            a.source_offset
                .map(|offset| ByteRange::new(offset, a.byte_len() as u64))
        }))
    }

    // ------------------------------------------------------------------
    // Thumbnail accessors
    // ------------------------------------------------------------------

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }

    /// Raw thumbnail bytes: the JPEG stream, or concatenated strips for
    /// uncompressed thumbnails.
    pub fn thumbnail(&self) -> Option<Vec<u8>> {
        self.thumbnail.as_ref().map(|t| t.bytes.clone())
    }

    /// Whether the embedded thumbnail is JPEG-compressed
    pub fn is_thumbnail_compressed(&self) -> Option<bool> {
        self.thumbnail
            .as_ref()
            .map(|t| t.compression == ThumbnailCompression::Jpeg)
    }

    /// Single byte range covering the thumbnail, when one exists and the
    /// original strips were contiguous. Fails after any save.
    pub fn thumbnail_range(&self) -> Result<Option<ByteRange>> {
        if self.saved {
            return Err(Error::Stale(
                "thumbnail range is invalid after saving".into(),
            ));
        }
        Ok(self.thumbnail.as_ref().and_then(|t| t.range))
    }

    // ------------------------------------------------------------------
    // Orientation helpers
    // ------------------------------------------------------------------

    fn orientation(&self) -> i32 {
        self.get_attribute_int("Orientation", crate::ORIENTATION_NORMAL)
    }

    fn set_orientation(&mut self, orientation: i32) -> Result<()> {
        self.set_attribute("Orientation", Some(&orientation.to_string()))
    }

    /// Rotate the image orientation by a multiple of 90 degrees.
    pub fn rotate(&mut self, degrees: i32) -> Result<()> {
        if degrees % 90 != 0 {
            return Err(Error::InvalidArgument(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }
        let mut orientation = self.orientation();
        if !(1..=8).contains(&orientation) {
            // Unknown orientation stays unknown.
            return Ok(());
        }
        let turns = degrees.div_euclid(90).rem_euclid(4);
        for _ in 0..turns {
            orientation = ROTATE_90[orientation as usize];
        }
        self.set_orientation(orientation)
    }

    pub fn flip_horizontally(&mut self) -> Result<()> {
        let orientation = self.orientation();
        let flipped = if (1..=8).contains(&orientation) {
            FLIP_HORIZONTAL[orientation as usize]
        } else {
            crate::ORIENTATION_UNDEFINED
        };
        self.set_orientation(flipped)
    }

    pub fn flip_vertically(&mut self) -> Result<()> {
        let orientation = self.orientation();
        let flipped = if (1..=8).contains(&orientation) {
            FLIP_VERTICAL[orientation as usize]
        } else {
            crate::ORIENTATION_UNDEFINED
        };
        self.set_orientation(flipped)
    }

    pub fn reset_orientation(&mut self) -> Result<()> {
        self.set_orientation(crate::ORIENTATION_NORMAL)
    }

    pub fn is_flipped(&self) -> bool {
        matches!(self.orientation(), 2 | 4 | 5 | 7)
    }

    /// Clockwise rotation encoded by the orientation value
    pub fn rotation_degrees(&self) -> i32 {
        match self.orientation() {
            3 | 4 => 180,
            5 | 6 => 90,
            7 | 8 => 270,
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // GPS helpers
    // ------------------------------------------------------------------

    /// Decimal latitude and longitude, when both are present and valid
    pub fn lat_long(&self) -> Option<(f64, f64)> {
        let latitude = self.dms_attribute("GPSLatitude")?;
        let lat_ref = self.get_attribute("GPSLatitudeRef")?;
        let longitude = self.dms_attribute("GPSLongitude")?;
        let lng_ref = self.get_attribute("GPSLongitudeRef")?;

        let latitude = if lat_ref.trim() == "S" { -latitude } else { latitude };
        let longitude = if lng_ref.trim() == "W" { -longitude } else { longitude };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some((latitude, longitude))
    }

    fn dms_attribute(&self, name: &str) -> Option<f64> {
        let (_, attribute) = self.store.find(name)?;
        let rationals = attribute.rational_values(self.byte_order)?;
        let degrees = rationals.first().map(|r| r.to_f64()).unwrap_or(0.0);
        let minutes = rationals.get(1).map(|r| r.to_f64()).unwrap_or(0.0);
        let seconds = rationals.get(2).map(|r| r.to_f64()).unwrap_or(0.0);
        Some(degrees + minutes / 60.0 + seconds / 3600.0)
    }

    /// Set latitude and longitude with range validation.
    pub fn set_lat_long(&mut self, latitude: f64, longitude: f64) -> Result<()> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidArgument(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidArgument(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        self.set_attribute("GPSLatitude", Some(&decimal_to_dms(latitude.abs())))?;
        self.set_attribute(
            "GPSLatitudeRef",
            Some(if latitude >= 0.0 { "N" } else { "S" }),
        )?;
        self.set_attribute("GPSLongitude", Some(&decimal_to_dms(longitude.abs())))?;
        self.set_attribute(
            "GPSLongitudeRef",
            Some(if longitude >= 0.0 { "E" } else { "W" }),
        )?;
        Ok(())
    }

    /// Altitude in meters, negative below sea level, or `default`
    pub fn altitude(&self, default: f64) -> f64 {
        let value = self.get_attribute_double("GPSAltitude", f64::NAN);
        if value.is_nan() {
            return default;
        }
        let below_sea_level = self.get_attribute_int("GPSAltitudeRef", -1) == 1;
        if below_sea_level {
            -value
        } else {
            value
        }
    }

    /// Set altitude; the sign is encoded in the reference byte.
    pub fn set_altitude(&mut self, altitude: f64) -> Result<()> {
        if !altitude.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "altitude {altitude} is not finite"
            )));
        }
        let reference = if altitude >= 0.0 { "0" } else { "1" };
        let scaled = (altitude.abs() * 10000.0).round() as u64;
        self.set_attribute("GPSAltitude", Some(&format!("{scaled}/10000")))?;
        self.set_attribute("GPSAltitudeRef", Some(reference))?;
        Ok(())
    }

    /// Bulk GPS setter from a location-like value object.
    pub fn set_gps_info(&mut self, info: &GpsInfo) -> Result<()> {
        self.set_lat_long(info.latitude, info.longitude)?;
        if let Some(provider) = &info.provider {
            self.set_attribute("GPSProcessingMethod", Some(provider))?;
        }
        if let Some(altitude) = info.altitude_meters {
            self.set_altitude(altitude)?;
        }
        if let Some(speed) = info.speed_meters_per_second {
            let kph = Rational::approximate(speed * 3.6);
            self.set_attribute("GPSSpeedRef", Some("K"))?;
            self.set_attribute("GPSSpeed", Some(&kph.to_string()))?;
        }
        if let Some(millis) = info.timestamp_millis {
            let seconds = millis.div_euclid(1000);
            let (date, time) = split_epoch_seconds(seconds);
            self.set_attribute("GPSDateStamp", Some(&date))?;
            self.set_attribute("GPSTimeStamp", Some(&time))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Date-time helpers
    // ------------------------------------------------------------------

    /// `DateTime` as a millisecond epoch value with timezone-naive
    /// local-time semantics, sub-second precision from the companion tag.
    pub fn date_time(&self) -> Option<i64> {
        self.datetime_millis("DateTime", "SubSecTime")
    }

    /// `DateTimeOriginal` as a millisecond epoch value
    pub fn date_time_original(&self) -> Option<i64> {
        self.datetime_millis("DateTimeOriginal", "SubSecTimeOriginal")
    }

    /// GPS date and time stamps combined into a millisecond epoch value
    pub fn gps_date_time(&self) -> Option<i64> {
        let date = self.get_attribute("GPSDateStamp")?;
        let time = self.get_attribute("GPSTimeStamp")?;
        datetime_to_millis(&format!("{date} {time}"), None)
    }

    fn datetime_millis(&self, tag: &str, subsec_tag: &str) -> Option<i64> {
        let value = self.get_attribute(tag)?;
        let subsec = self.get_attribute(subsec_tag);
        datetime_to_millis(&value, subsec.as_deref())
    }

    /// Set `DateTime` (and the sub-second companion) from a millisecond
    /// epoch value.
    pub fn set_date_time(&mut self, millis: i64) -> Result<()> {
        let seconds = millis.div_euclid(1000);
        let remainder = millis.rem_euclid(1000);
        let (date, time) = split_epoch_seconds(seconds);
        self.set_attribute("DateTime", Some(&format!("{date} {time}")))?;
        self.set_attribute("SubSecTime", Some(&format!("{remainder:03}")))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Rewrite the backing file in place with the current attributes.
    ///
    /// Only JPEG, PNG and WebP containers are rewritable, and only when
    /// the session is backed by a named file or seekable handle. The
    /// original bytes are copied to a scratch file first; on failure they
    /// are restored and the scratch copy is kept for diagnostics. On
    /// success all stored byte offsets become permanently stale.
    pub fn save_attributes(&mut self) -> Result<()> {
        if self.standalone || !self.container.is_writable() {
            return Err(Error::Unsupported(format!(
                "saving is not supported for {:?}",
                self.container
            )));
        }
        if matches!(self.source, Source::Memory(_)) {
            return Err(Error::Unsupported(
                "in-place save requires a rewritable backing store".into(),
            ));
        }
        if self.structure.is_none() {
            return Err(Error::Unsupported(
                "container structure was not recovered at open".into(),
            ));
        }
        if let Some(desc) = &self.thumbnail {
            if desc.multi_strip && !desc.strips_contiguous {
                return Err(Error::Unsupported(
                    "thumbnail strips are not contiguous".into(),
                ));
            }
        }

        // An XMP attribute captured from its own marker is re-emitted as
        // its own segment, never folded into the EXIF block.
        let separate_xmp = if self.xmp_from_separate_marker {
            self.store.remove(Group::Primary, "Xmp")
        } else {
            None
        };

        let payload = self.thumbnail.as_ref().map(|t| ThumbnailPayload {
            bytes: &t.bytes,
            as_strips: t.compression == ThumbnailCompression::Uncompressed,
        });
        let encoded = tiff::encode(&self.store, self.byte_order, payload.as_ref());

        let xmp_update = if self.xmp_from_separate_marker {
            match &separate_xmp {
                Some(attr) => MetadataUpdate::Set(attr.bytes.clone()),
                None => MetadataUpdate::Remove,
            }
        } else {
            MetadataUpdate::Keep
        };
        if let Some(attr) = separate_xmp {
            self.store.set(Group::Primary, "Xmp", attr);
        }

        let updates = Updates {
            exif: MetadataUpdate::Set(encoded?),
            xmp: xmp_update,
            ..Default::default()
        };

        self.rewrite_source(&updates)?;
        self.saved = true;
        self.modified = false;

        // The freshly written layout replaces the stale one so another
        // save still splices correctly; offsets exposed to callers remain
        // invalid regardless.
        if let Err(e) = self.refresh_structure() {
            warn!("could not re-read saved file structure: {e}");
            self.structure = None;
        }
        Ok(())
    }

    fn rewrite_source(&mut self, updates: &Updates) -> Result<()> {
        let container = self.container;
        let Some(structure) = self.structure.as_ref() else {
            return Err(Error::Unsupported(
                "container structure was not recovered at open".into(),
            ));
        };

        let mut scratch = tempfile::NamedTempFile::new()?;
        match &mut self.source {
            Source::Path(path) => {
                {
                    let mut original = File::open(&path)?;
                    io::copy(&mut original, scratch.as_file_mut())?;
                }
                scratch.as_file_mut().seek(SeekFrom::Start(0))?;

                let result = (|| -> Result<()> {
                    let mut out = File::create(&path)?;
                    formats::splice_container(
                        container,
                        structure,
                        scratch.as_file_mut(),
                        &mut out,
                        updates,
                    )?;
                    out.flush()?;
                    Ok(())
                })();

                if let Err(e) = result {
                    scratch.as_file_mut().seek(SeekFrom::Start(0))?;
                    let mut out = File::create(&path)?;
                    io::copy(scratch.as_file_mut(), &mut out)?;
                    let kept = scratch.into_temp_path().keep().map_err(|k| k.error)?;
                    error!(
                        "save failed, original restored; scratch copy kept at {}",
                        kept.display()
                    );
                    return Err(e);
                }
                Ok(())
            }

            Source::Handle(file) => {
                file.seek(SeekFrom::Start(0))?;
                io::copy(file, scratch.as_file_mut())?;
                scratch.as_file_mut().seek(SeekFrom::Start(0))?;

                let result = (|| -> Result<()> {
                    file.set_len(0)?;
                    file.seek(SeekFrom::Start(0))?;
                    formats::splice_container(
                        container,
                        structure,
                        scratch.as_file_mut(),
                        file,
                        updates,
                    )?;
                    file.flush()?;
                    Ok(())
                })();

                if let Err(e) = result {
                    file.set_len(0)?;
                    file.seek(SeekFrom::Start(0))?;
                    scratch.as_file_mut().seek(SeekFrom::Start(0))?;
                    io::copy(scratch.as_file_mut(), file)?;
                    let kept = scratch.into_temp_path().keep().map_err(|k| k.error)?;
                    error!(
                        "save failed, original restored; scratch copy kept at {}",
                        kept.display()
                    );
                    return Err(e);
                }
                Ok(())
            }

            Source::Memory(_) => Err(Error::Unsupported(
                "in-place save requires a rewritable backing store".into(),
            )),
        }
    }

    fn refresh_structure(&mut self) -> Result<()> {
        let container = self.container;
        let structure = match &mut self.source {
            Source::Path(path) => {
                let mut file = File::open(path)?;
                formats::parse_container(container, &mut file)?.structure
            }
            Source::Handle(file) => {
                file.seek(SeekFrom::Start(0))?;
                formats::parse_container(container, file)?.structure
            }
            Source::Memory(_) => return Ok(()),
        };
        self.structure = Some(structure);
        Ok(())
    }
}

/// Copy `source` to `sink` with Exif, ICC, XMP, extended-XMP and
/// Photoshop-resource data stripped, optionally re-inserting a single-tag
/// directory carrying only the orientation.
pub fn save_exclusive<R: Read + Seek, W: Write>(
    source: &mut R,
    sink: &mut W,
    preserve_orientation: bool,
) -> Result<()> {
    source.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < header.len() {
        let n = source.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let container = detect_container(&header[..filled]);
    if !container.is_writable() {
        return Err(Error::Unsupported(format!(
            "metadata stripping is not supported for {container:?}"
        )));
    }

    source.seek(SeekFrom::Start(0))?;
    let parsed = formats::parse_container(container, source)?;

    let exif_update = if preserve_orientation {
        let orientation = parsed.exif.as_ref().and_then(|blob| {
            let block = tiff::parse(&blob.data, 0, Group::Primary, true).ok()?;
            let attribute = block.store.get(Group::Primary, "Orientation")?.clone();
            Some((attribute, block.byte_order))
        });
        match orientation {
            Some((attribute, order)) => {
                let mut store = DirectoryStore::new();
                store.set(Group::Primary, "Orientation", attribute);
                MetadataUpdate::Set(tiff::encode(&store, order, None)?)
            }
            None => MetadataUpdate::Remove,
        }
    } else {
        MetadataUpdate::Remove
    };

    let updates = Updates {
        exif: exif_update,
        xmp: MetadataUpdate::Remove,
        icc: MetadataUpdate::Remove,
        photoshop: MetadataUpdate::Remove,
    };

    source.seek(SeekFrom::Start(0))?;
    formats::splice_container(parsed.structure.container, &parsed.structure, source, sink, &updates)
}

/// `"HH:MM:SS"` to three denominator-1 rationals
fn gps_timestamp_to_rationals(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 8
        && bytes[2] == b':'
        && bytes[5] == b':'
        && [0, 1, 3, 4, 6, 7].iter().all(|&i| bytes[i].is_ascii_digit());
    if !well_formed {
        return Err(Error::InvalidArgument(format!(
            "GPS timestamp {value:?} must be \"HH:MM:SS\""
        )));
    }
    let malformed =
        || Error::InvalidArgument(format!("GPS timestamp {value:?} must be \"HH:MM:SS\""));
    let hours: u32 = value[0..2].parse().map_err(|_| malformed())?;
    let minutes: u32 = value[3..5].parse().map_err(|_| malformed())?;
    let seconds: u32 = value[6..8].parse().map_err(|_| malformed())?;
    Ok(format!("{hours}/1,{minutes}/1,{seconds}/1"))
}

/// Decimal degrees to the stored degrees/minutes/seconds rational triple
fn decimal_to_dms(value: f64) -> String {
    let degrees = value.trunc();
    let minutes = ((value - degrees) * 60.0).trunc();
    let seconds = (value - degrees - minutes / 60.0) * 3600.0;
    format!(
        "{}/1,{}/1,{}/10000000",
        degrees as u32,
        minutes as u32,
        (seconds * 10_000_000.0).round() as u64
    )
}

// Civil-date conversion without a calendar dependency; the canonical
// day-count algorithms over the proleptic Gregorian calendar.

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let year_of_era = year - era * 400;
    let month_shifted = if month > 2 { month - 3 } else { month + 9 };
    let day_of_year = (153 * month_shifted + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146097 + day_of_era - 719468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let days = days + 719468;
    let era = if days >= 0 { days } else { days - 146096 } / 146097;
    let day_of_era = days - era * 146097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146096) / 365;
    let year = year_of_era + era * 400;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_shifted = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_shifted + 2) / 5 + 1;
    let month = if month_shifted < 10 {
        month_shifted + 3
    } else {
        month_shifted - 9
    };
    let year = if month <= 2 { year + 1 } else { year };
    (year, month as u32, day as u32)
}

/// Parse `"YYYY:MM:DD HH:MM:SS"` (with an optional sub-second string) to
/// epoch milliseconds, timezone-naive.
fn datetime_to_millis(value: &str, subsec: Option<&str>) -> Option<i64> {
    let normalized = normalize_datetime(value).ok()?;
    let bytes = normalized.as_bytes();
    let year: i64 = normalized[0..4].parse().ok()?;
    let month: i64 = normalized[5..7].parse().ok()?;
    let day: i64 = normalized[8..10].parse().ok()?;
    let hours: i64 = normalized[11..13].parse().ok()?;
    let minutes: i64 = normalized[14..16].parse().ok()?;
    let seconds: i64 = normalized[17..19].parse().ok()?;
    debug_assert_eq!(bytes.len(), 19);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if hours > 23 || minutes > 59 || seconds > 60 {
        return None;
    }

    let days = days_from_civil(year, month, day);
    let mut millis = (days * 86400 + hours * 3600 + minutes * 60 + seconds) * 1000;

    if let Some(subsec) = subsec {
        let digits: String = subsec.chars().take(3).collect();
        if let Ok(parsed) = digits.parse::<i64>() {
            let scale = match digits.len() {
                1 => 100,
                2 => 10,
                _ => 1,
            };
            millis += parsed * scale;
        }
    }
    Some(millis)
}

/// Epoch seconds to (`"YYYY:MM:DD"`, `"HH:MM:SS"`)
fn split_epoch_seconds(seconds: i64) -> (String, String) {
    let days = seconds.div_euclid(86400);
    let rem = seconds.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days);
    (
        format!("{year:04}:{month:02}:{day:02}"),
        format!("{:02}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_round_trip() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(days_from_civil(2000, 3, 1), 11017);
        for days in [-1000, -1, 0, 1, 10000, 20000] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m as i64, d as i64), days);
        }
    }

    #[test]
    fn test_datetime_conversion() {
        let millis = datetime_to_millis("1970:01:01 00:00:00", None).unwrap();
        assert_eq!(millis, 0);

        let millis = datetime_to_millis("1970:01:02 01:01:01", Some("5")).unwrap();
        assert_eq!(millis, 86400_000 + 3661_000 + 500);

        let (date, time) = split_epoch_seconds(86400 + 3661);
        assert_eq!(date, "1970:01:02");
        assert_eq!(time, "01:01:01");

        assert!(datetime_to_millis("bad value", None).is_none());
        assert!(datetime_to_millis("1970:13:01 00:00:00", None).is_none());
    }

    #[test]
    fn test_gps_timestamp_validation() {
        assert_eq!(gps_timestamp_to_rationals("11:05:32").unwrap(), "11/1,5/1,32/1");
        assert!(gps_timestamp_to_rationals("1:5:32").is_err());
        assert!(gps_timestamp_to_rationals("11-05-32").is_err());
        assert!(gps_timestamp_to_rationals("aa:bb:cc").is_err());
    }

    #[test]
    fn test_decimal_to_dms() {
        let encoded = decimal_to_dms(37.773972);
        assert_eq!(encoded, "37/1,46/1,262992000/10000000");
    }

    #[test]
    fn test_orientation_tables_are_inverses() {
        for orientation in 1..=8usize {
            // Four quarter-turns return to the start
            let mut value = orientation as i32;
            for _ in 0..4 {
                value = ROTATE_90[value as usize];
            }
            assert_eq!(value, orientation as i32);

            // Flips are their own inverse
            assert_eq!(
                FLIP_HORIZONTAL[FLIP_HORIZONTAL[orientation] as usize],
                orientation as i32
            );
            assert_eq!(
                FLIP_VERTICAL[FLIP_VERTICAL[orientation] as usize],
                orientation as i32
            );
        }
    }
}
