//! Tag tables
//!
//! Static per-group registries mapping numeric tag id to tag name and
//! accepted value formats. Built once per process and shared read-only
//! across sessions; numeric-id lookup serves the decoder, name lookup
//! serves the attribute-set path.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::value::ExifFormat;

/// Directory group identifiers
///
/// The same tag name may appear with different meaning in different groups
/// (`Orientation` in Primary vs `ThumbnailOrientation` in Thumbnail), so
/// every group carries its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Primary,
    Exif,
    Gps,
    Interop,
    Thumbnail,
    Preview,
    OrfMakerNote,
    OrfCameraSettings,
    OrfImageProcessing,
    Pef,
}

impl Group {
    pub const COUNT: usize = 10;

    /// Lookup priority for cross-group attribute reads, primary image
    /// group first.
    pub const PRIORITY: [Group; Group::COUNT] = [
        Group::Primary,
        Group::Exif,
        Group::Gps,
        Group::Interop,
        Group::Thumbnail,
        Group::Preview,
        Group::OrfMakerNote,
        Group::OrfCameraSettings,
        Group::OrfImageProcessing,
        Group::Pef,
    ];

    pub fn index(self) -> usize {
        match self {
            Group::Primary => 0,
            Group::Exif => 1,
            Group::Gps => 2,
            Group::Interop => 3,
            Group::Thumbnail => 4,
            Group::Preview => 5,
            Group::OrfMakerNote => 6,
            Group::OrfCameraSettings => 7,
            Group::OrfImageProcessing => 8,
            Group::Pef => 9,
        }
    }
}

/// One registered tag: numeric id, name and accepted formats
#[derive(Debug)]
pub struct TagDef {
    pub id: u16,
    pub name: &'static str,
    pub primary: ExifFormat,
    pub secondary: Option<ExifFormat>,
}

impl TagDef {
    /// Whether a stored wire format is acceptable for this tag.
    pub fn accepts(&self, stored: ExifFormat) -> bool {
        self.primary.accepts(stored)
            || self.secondary.map(|s| s.accepts(stored)).unwrap_or(false)
    }
}

const fn tag(id: u16, name: &'static str, primary: ExifFormat) -> TagDef {
    TagDef {
        id,
        name,
        primary,
        secondary: None,
    }
}

const fn tag2(id: u16, name: &'static str, primary: ExifFormat, secondary: ExifFormat) -> TagDef {
    TagDef {
        id,
        name,
        primary,
        secondary: Some(secondary),
    }
}

use ExifFormat::{Ascii, Byte, Ifd, SRational, ULong, URational, UShort, Undefined};

// Baseline TIFF tags plus the vendor tags that land in the primary
// directory of RW2/DNG files.
static PRIMARY_TAGS: &[TagDef] = &[
    tag(0x00FE, "NewSubfileType", ULong),
    tag(0x00FF, "SubfileType", ULong),
    // RW2 sensor borders share the low id space with nothing else we read.
    tag(0x0004, "SensorTopBorder", ULong),
    tag(0x0005, "SensorLeftBorder", ULong),
    tag(0x0006, "SensorBottomBorder", ULong),
    tag(0x0007, "SensorRightBorder", ULong),
    tag(0x0017, "ISO", UShort),
    tag(0x002E, "JpgFromRaw", Undefined),
    tag2(0x0100, "ImageWidth", UShort, ULong),
    tag2(0x0101, "ImageLength", UShort, ULong),
    tag(0x0102, "BitsPerSample", UShort),
    tag(0x0103, "Compression", UShort),
    tag(0x0106, "PhotometricInterpretation", UShort),
    tag(0x010E, "ImageDescription", Ascii),
    tag(0x010F, "Make", Ascii),
    tag(0x0110, "Model", Ascii),
    tag2(0x0111, "StripOffsets", UShort, ULong),
    tag(0x0112, "Orientation", UShort),
    tag(0x0115, "SamplesPerPixel", UShort),
    tag2(0x0116, "RowsPerStrip", UShort, ULong),
    tag2(0x0117, "StripByteCounts", UShort, ULong),
    tag(0x011A, "XResolution", URational),
    tag(0x011B, "YResolution", URational),
    tag(0x011C, "PlanarConfiguration", UShort),
    tag(0x0128, "ResolutionUnit", UShort),
    tag(0x012D, "TransferFunction", UShort),
    tag(0x0131, "Software", Ascii),
    tag(0x0132, "DateTime", Ascii),
    tag(0x013B, "Artist", Ascii),
    tag(0x013E, "WhitePoint", URational),
    tag(0x013F, "PrimaryChromaticities", URational),
    tag2(0x014A, "SubIFDPointer", ULong, Ifd),
    tag(0x0201, "JPEGInterchangeFormat", ULong),
    tag(0x0202, "JPEGInterchangeFormatLength", ULong),
    tag(0x0211, "YCbCrCoefficients", URational),
    tag(0x0212, "YCbCrSubSampling", UShort),
    tag(0x0213, "YCbCrPositioning", UShort),
    tag(0x0214, "ReferenceBlackWhite", URational),
    tag(0x02BC, "Xmp", Undefined),
    tag(0x8298, "Copyright", Ascii),
    tag2(0x8769, "ExifIFDPointer", ULong, Ifd),
    tag2(0x8825, "GPSInfoIFDPointer", ULong, Ifd),
    tag(0xC612, "DNGVersion", Byte),
    // DNG writers store the crop size as shorts, longs or rationals.
    tag2(0xC620, "DefaultCropSize", ULong, URational),
];

static EXIF_TAGS: &[TagDef] = &[
    tag(0x829A, "ExposureTime", URational),
    tag(0x829D, "FNumber", URational),
    tag(0x8822, "ExposureProgram", UShort),
    tag(0x8824, "SpectralSensitivity", Ascii),
    tag(0x8827, "PhotographicSensitivity", UShort),
    tag(0x8828, "OECF", Undefined),
    tag(0x8830, "SensitivityType", UShort),
    tag(0x8831, "StandardOutputSensitivity", ULong),
    tag(0x8832, "RecommendedExposureIndex", ULong),
    tag(0x8833, "ISOSpeed", ULong),
    tag(0x9000, "ExifVersion", Ascii),
    tag(0x9003, "DateTimeOriginal", Ascii),
    tag(0x9004, "DateTimeDigitized", Ascii),
    tag(0x9010, "OffsetTime", Ascii),
    tag(0x9011, "OffsetTimeOriginal", Ascii),
    tag(0x9012, "OffsetTimeDigitized", Ascii),
    tag(0x9101, "ComponentsConfiguration", Undefined),
    tag(0x9102, "CompressedBitsPerPixel", URational),
    tag(0x9201, "ShutterSpeedValue", SRational),
    tag(0x9202, "ApertureValue", URational),
    tag(0x9203, "BrightnessValue", SRational),
    tag(0x9204, "ExposureBiasValue", SRational),
    tag(0x9205, "MaxApertureValue", URational),
    tag(0x9206, "SubjectDistance", URational),
    tag(0x9207, "MeteringMode", UShort),
    tag(0x9208, "LightSource", UShort),
    tag(0x9209, "Flash", UShort),
    tag(0x920A, "FocalLength", URational),
    tag(0x9214, "SubjectArea", UShort),
    tag(0x927C, "MakerNote", Undefined),
    tag(0x9286, "UserComment", Undefined),
    tag(0x9290, "SubSecTime", Ascii),
    tag(0x9291, "SubSecTimeOriginal", Ascii),
    tag(0x9292, "SubSecTimeDigitized", Ascii),
    tag(0xA000, "FlashpixVersion", Undefined),
    tag(0xA001, "ColorSpace", UShort),
    tag2(0xA002, "PixelXDimension", ULong, UShort),
    tag2(0xA003, "PixelYDimension", ULong, UShort),
    tag(0xA004, "RelatedSoundFile", Ascii),
    tag2(0xA005, "InteroperabilityIFDPointer", ULong, Ifd),
    tag(0xA20B, "FlashEnergy", URational),
    tag(0xA20C, "SpatialFrequencyResponse", Undefined),
    tag(0xA20E, "FocalPlaneXResolution", URational),
    tag(0xA20F, "FocalPlaneYResolution", URational),
    tag(0xA210, "FocalPlaneResolutionUnit", UShort),
    tag(0xA214, "SubjectLocation", UShort),
    tag(0xA215, "ExposureIndex", URational),
    tag(0xA217, "SensingMethod", UShort),
    tag(0xA300, "FileSource", Undefined),
    tag(0xA301, "SceneType", Undefined),
    tag(0xA302, "CFAPattern", Undefined),
    tag(0xA401, "CustomRendered", UShort),
    tag(0xA402, "ExposureMode", UShort),
    tag(0xA403, "WhiteBalance", UShort),
    tag(0xA404, "DigitalZoomRatio", URational),
    tag(0xA405, "FocalLengthIn35mmFilm", UShort),
    tag(0xA406, "SceneCaptureType", UShort),
    tag(0xA407, "GainControl", UShort),
    tag(0xA408, "Contrast", UShort),
    tag(0xA409, "Saturation", UShort),
    tag(0xA40A, "Sharpness", UShort),
    tag(0xA40B, "DeviceSettingDescription", Undefined),
    tag(0xA40C, "SubjectDistanceRange", UShort),
    tag(0xA420, "ImageUniqueID", Ascii),
    tag(0xA430, "CameraOwnerName", Ascii),
    tag(0xA431, "BodySerialNumber", Ascii),
    tag(0xA432, "LensSpecification", URational),
    tag(0xA433, "LensMake", Ascii),
    tag(0xA434, "LensModel", Ascii),
    tag(0xA500, "Gamma", URational),
];

static GPS_TAGS: &[TagDef] = &[
    tag(0x0000, "GPSVersionID", Byte),
    tag(0x0001, "GPSLatitudeRef", Ascii),
    tag(0x0002, "GPSLatitude", URational),
    tag(0x0003, "GPSLongitudeRef", Ascii),
    tag(0x0004, "GPSLongitude", URational),
    tag(0x0005, "GPSAltitudeRef", Byte),
    tag(0x0006, "GPSAltitude", URational),
    tag(0x0007, "GPSTimeStamp", URational),
    tag(0x0008, "GPSSatellites", Ascii),
    tag(0x0009, "GPSStatus", Ascii),
    tag(0x000A, "GPSMeasureMode", Ascii),
    tag(0x000B, "GPSDOP", URational),
    tag(0x000C, "GPSSpeedRef", Ascii),
    tag(0x000D, "GPSSpeed", URational),
    tag(0x000E, "GPSTrackRef", Ascii),
    tag(0x000F, "GPSTrack", URational),
    tag(0x0010, "GPSImgDirectionRef", Ascii),
    tag(0x0011, "GPSImgDirection", URational),
    tag(0x0012, "GPSMapDatum", Ascii),
    tag(0x0013, "GPSDestLatitudeRef", Ascii),
    tag(0x0014, "GPSDestLatitude", URational),
    tag(0x0015, "GPSDestLongitudeRef", Ascii),
    tag(0x0016, "GPSDestLongitude", URational),
    tag(0x0017, "GPSDestBearingRef", Ascii),
    tag(0x0018, "GPSDestBearing", URational),
    tag(0x0019, "GPSDestDistanceRef", Ascii),
    tag(0x001A, "GPSDestDistance", URational),
    tag(0x001B, "GPSProcessingMethod", Undefined),
    tag(0x001C, "GPSAreaInformation", Undefined),
    tag(0x001D, "GPSDateStamp", Ascii),
    tag(0x001E, "GPSDifferential", UShort),
    tag(0x001F, "GPSHPositioningError", URational),
];

static INTEROP_TAGS: &[TagDef] = &[tag(0x0001, "InteroperabilityIndex", Ascii)];

// The thumbnail directory is baseline TIFF again, but the size and
// orientation tags are exposed under thumbnail-specific names so they never
// shadow the primary image's values.
static THUMBNAIL_TAGS: &[TagDef] = &[
    tag(0x00FE, "NewSubfileType", ULong),
    tag(0x00FF, "SubfileType", ULong),
    tag2(0x0100, "ThumbnailImageWidth", UShort, ULong),
    tag2(0x0101, "ThumbnailImageLength", UShort, ULong),
    tag(0x0102, "BitsPerSample", UShort),
    tag(0x0103, "Compression", UShort),
    tag(0x0106, "PhotometricInterpretation", UShort),
    tag(0x010E, "ImageDescription", Ascii),
    tag(0x010F, "Make", Ascii),
    tag(0x0110, "Model", Ascii),
    tag2(0x0111, "StripOffsets", UShort, ULong),
    tag(0x0112, "ThumbnailOrientation", UShort),
    tag(0x0115, "SamplesPerPixel", UShort),
    tag2(0x0116, "RowsPerStrip", UShort, ULong),
    tag2(0x0117, "StripByteCounts", UShort, ULong),
    tag(0x011A, "XResolution", URational),
    tag(0x011B, "YResolution", URational),
    tag(0x011C, "PlanarConfiguration", UShort),
    tag(0x0128, "ResolutionUnit", UShort),
    tag(0x0131, "Software", Ascii),
    tag(0x0132, "DateTime", Ascii),
    tag(0x013B, "Artist", Ascii),
    tag2(0x014A, "SubIFDPointer", ULong, Ifd),
    tag(0x0201, "JPEGInterchangeFormat", ULong),
    tag(0x0202, "JPEGInterchangeFormatLength", ULong),
    tag(0x0211, "YCbCrCoefficients", URational),
    tag(0x0212, "YCbCrSubSampling", UShort),
    tag(0x0213, "YCbCrPositioning", UShort),
    tag(0x0214, "ReferenceBlackWhite", URational),
    tag(0x8298, "Copyright", Ascii),
    tag2(0x8769, "ExifIFDPointer", ULong, Ifd),
    tag2(0x8825, "GPSInfoIFDPointer", ULong, Ifd),
    tag(0xC612, "DNGVersion", Byte),
    // DNG writers store the crop size as shorts, longs or rationals.
    tag2(0xC620, "DefaultCropSize", ULong, URational),
];

static ORF_MAKER_NOTE_TAGS: &[TagDef] = &[
    tag(0x0100, "ThumbnailImage", Undefined),
    tag2(0x2020, "CameraSettingsIFDPointer", ULong, Ifd),
    tag2(0x2040, "ImageProcessingIFDPointer", ULong, Ifd),
];

static ORF_CAMERA_SETTINGS_TAGS: &[TagDef] = &[
    tag(0x0101, "PreviewImageStart", ULong),
    tag(0x0102, "PreviewImageLength", ULong),
];

static ORF_IMAGE_PROCESSING_TAGS: &[TagDef] = &[tag(0x1113, "AspectFrame", UShort)];

static PEF_TAGS: &[TagDef] = &[tag(0x0037, "ColorSpace", UShort)];

/// Static table for one group
pub(crate) fn table(group: Group) -> &'static [TagDef] {
    match group {
        Group::Primary | Group::Preview => PRIMARY_TAGS,
        Group::Exif => EXIF_TAGS,
        Group::Gps => GPS_TAGS,
        Group::Interop => INTEROP_TAGS,
        Group::Thumbnail => THUMBNAIL_TAGS,
        Group::OrfMakerNote => ORF_MAKER_NOTE_TAGS,
        Group::OrfCameraSettings => ORF_CAMERA_SETTINGS_TAGS,
        Group::OrfImageProcessing => ORF_IMAGE_PROCESSING_TAGS,
        Group::Pef => PEF_TAGS,
    }
}

struct TagRegistry {
    by_id: Vec<HashMap<u16, &'static TagDef>>,
    by_name: Vec<HashMap<&'static str, &'static TagDef>>,
}

static REGISTRY: LazyLock<TagRegistry> = LazyLock::new(|| {
    let mut by_id = Vec::with_capacity(Group::COUNT);
    let mut by_name = Vec::with_capacity(Group::COUNT);
    for group in Group::PRIORITY {
        let defs = table(group);
        by_id.push(defs.iter().map(|d| (d.id, d)).collect());
        by_name.push(defs.iter().map(|d| (d.name, d)).collect());
    }
    TagRegistry { by_id, by_name }
});

/// Numeric-id lookup within one group (decoder path)
pub(crate) fn find_by_id(group: Group, id: u16) -> Option<&'static TagDef> {
    REGISTRY.by_id[group.index()].get(&id).copied()
}

/// Name lookup within one group (attribute-set path)
pub(crate) fn find_by_name(group: Group, name: &str) -> Option<&'static TagDef> {
    REGISTRY.by_name[group.index()].get(name).copied()
}

/// Child group referenced by a pointer tag, if the id is one of the
/// sub-IFD pointers.
pub(crate) fn pointer_child_group(id: u16) -> Option<Group> {
    match id {
        0x014A => Some(Group::Preview),
        0x8769 => Some(Group::Exif),
        0x8825 => Some(Group::Gps),
        0xA005 => Some(Group::Interop),
        0x2020 => Some(Group::OrfCameraSettings),
        0x2040 => Some(Group::OrfImageProcessing),
        _ => None,
    }
}

/// Pointer-tag ids that may appear in TIFF-shaped groups. The ORF pointer
/// ids overlap this space, so callers gate on the current group.
pub(crate) fn is_pointer_tag(group: Group, id: u16) -> bool {
    match group {
        Group::OrfMakerNote => matches!(id, 0x2020 | 0x2040),
        Group::Primary | Group::Thumbnail | Group::Preview => {
            matches!(id, 0x014A | 0x8769 | 0x8825)
        }
        Group::Exif => id == 0xA005,
        _ => false,
    }
}

/// Deprecated tag-name spelling, transparently mapped on read and write.
pub(crate) fn canonical_tag_name(name: &str) -> &str {
    if name == "ISOSpeedRatings" {
        "PhotographicSensitivity"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_lookup_per_group() {
        let orientation = find_by_id(Group::Primary, 0x0112).unwrap();
        assert_eq!(orientation.name, "Orientation");

        let thumb_orientation = find_by_id(Group::Thumbnail, 0x0112).unwrap();
        assert_eq!(thumb_orientation.name, "ThumbnailOrientation");
    }

    #[test]
    fn test_name_lookup() {
        assert!(find_by_name(Group::Exif, "FNumber").is_some());
        assert!(find_by_name(Group::Primary, "FNumber").is_none());
        assert!(find_by_name(Group::Gps, "GPSTimeStamp").is_some());
    }

    #[test]
    fn test_pointer_tags() {
        assert_eq!(pointer_child_group(0x8769), Some(Group::Exif));
        assert_eq!(pointer_child_group(0x8825), Some(Group::Gps));
        assert!(is_pointer_tag(Group::Primary, 0x8769));
        assert!(!is_pointer_tag(Group::Gps, 0x8769));
        assert!(is_pointer_tag(Group::OrfMakerNote, 0x2020));
        assert!(!is_pointer_tag(Group::Primary, 0x2020));
    }

    #[test]
    fn test_deprecated_alias() {
        assert_eq!(canonical_tag_name("ISOSpeedRatings"), "PhotographicSensitivity");
        assert_eq!(canonical_tag_name("FNumber"), "FNumber");
    }

    #[test]
    fn test_no_duplicate_ids_within_group() {
        for group in Group::PRIORITY {
            let defs = table(group);
            let mut seen = std::collections::HashSet::new();
            for def in defs {
                assert!(seen.insert(def.id), "duplicate id {:#06X} in {:?}", def.id, group);
            }
        }
    }
}
