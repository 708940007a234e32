//! Media type support queries

use crate::formats::Container;

/// MIME types this crate can read metadata from
const SUPPORTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
    "image/x-olympus-orf",
    "image/x-panasonic-rw2",
    "image/x-pentax-pef",
    "image/x-fuji-raf",
    "image/x-adobe-dng",
];

/// Whether metadata can be read from files of the given MIME type.
///
/// This is a pure lookup; it does not inspect any bytes.
///
/// # Example
///
/// ```
/// assert!(exif_io::is_supported_mime_type("image/jpeg"));
/// assert!(!exif_io::is_supported_mime_type("image/gif"));
/// ```
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    let lowered = mime_type.to_ascii_lowercase();
    SUPPORTED_MIME_TYPES.contains(&lowered.as_str())
}

/// The container a MIME type maps to, if supported
pub fn container_from_mime(mime_type: &str) -> Option<Container> {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(Container::Jpeg),
        "image/png" => Some(Container::Png),
        "image/webp" => Some(Container::Webp),
        "image/heic" | "image/heif" => Some(Container::Heif),
        "image/x-olympus-orf" => Some(Container::Orf),
        "image/x-panasonic-rw2" => Some(Container::Rw2),
        "image/x-pentax-pef" => Some(Container::Pef),
        "image/x-fuji-raf" => Some(Container::Raf),
        "image/x-adobe-dng" => Some(Container::Dng),
        _ => None,
    }
}

impl Container {
    /// Primary MIME type for this container
    pub fn to_mime(&self) -> Option<&'static str> {
        match self {
            Container::Jpeg => Some("image/jpeg"),
            Container::Png => Some("image/png"),
            Container::Webp => Some("image/webp"),
            Container::Heif => Some("image/heic"),
            Container::Orf => Some("image/x-olympus-orf"),
            Container::Rw2 => Some("image/x-panasonic-rw2"),
            Container::Pef => Some("image/x-pentax-pef"),
            Container::Raf => Some("image/x-fuji-raf"),
            Container::Dng => Some("image/x-adobe-dng"),
            Container::Unknown => None,
        }
    }

    /// File extensions conventionally used for this container
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Container::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            Container::Png => &["png"],
            Container::Webp => &["webp"],
            Container::Heif => &["heic", "heif"],
            Container::Orf => &["orf"],
            Container::Rw2 => &["rw2"],
            Container::Pef => &["pef"],
            Container::Raf => &["raf"],
            Container::Dng => &["dng"],
            Container::Unknown => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_support() {
        assert!(is_supported_mime_type("image/jpeg"));
        assert!(is_supported_mime_type("IMAGE/PNG"));
        assert!(is_supported_mime_type("image/x-adobe-dng"));
        assert!(!is_supported_mime_type("image/gif"));
        assert!(!is_supported_mime_type("video/mp4"));
    }

    #[test]
    fn test_mime_round_trip() {
        for &mime in SUPPORTED_MIME_TYPES {
            let container = container_from_mime(mime).unwrap();
            assert!(container.to_mime().is_some());
        }
        assert_eq!(container_from_mime("text/plain"), None);
    }
}
