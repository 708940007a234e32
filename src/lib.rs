//! Read and rewrite embedded photo metadata without re-encoding pixels.
//!
//! This crate parses and rewrites EXIF/TIFF tag directories inside several
//! container formats (JPEG marker segments, PNG chunks, WebP RIFF chunks,
//! and the TIFF-structured RAW variants ORF, RW2, PEF, RAF and DNG) while
//! preserving every unrelated byte of the host file.
//!
//! # Design Principles
//!
//! - **Byte preservation**: saving splices a freshly encoded metadata block
//!   into the container and copies everything else verbatim
//! - **Tolerant reading**: malformed directory entries degrade quietly, so
//!   one vendor quirk never aborts extraction of everything else
//! - **Single pass**: each container is scanned once to locate metadata,
//!   dimensions and thumbnails
//!
//! # Quick Start
//!
//! ```no_run
//! use exif_io::ExifAsset;
//!
//! # fn main() -> exif_io::Result<()> {
//! let mut asset = ExifAsset::open("image.jpg")?;
//!
//! // Read attributes by name
//! if let Some(model) = asset.get_attribute("Model") {
//!     println!("camera: {model}");
//! }
//! let orientation = asset.get_attribute_int("Orientation", 1);
//!
//! // Edit and rewrite in place
//! asset.rotate(90)?;
//! asset.save_attributes()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thumbnails
//!
//! ```no_run
//! use exif_io::ExifAsset;
//!
//! # fn main() -> exif_io::Result<()> {
//! let asset = ExifAsset::open("image.jpg")?;
//! if asset.has_thumbnail() {
//!     let bytes = asset.thumbnail().unwrap();
//!     println!("embedded thumbnail: {} bytes", bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

mod asset;
mod error;
mod formats;
mod media_type;
mod segment;
mod structure;
mod tags;
mod thumbnail;
mod tiff;
mod value;

pub use asset::{save_exclusive, ExifAsset, GpsInfo};
pub use error::{Error, Result};
pub use formats::{ByteRangeSource, Container};
pub use media_type::{container_from_mime, is_supported_mime_type};
pub use segment::ByteRange;
pub use tags::Group;
pub use thumbnail::ThumbnailCompression;
pub use value::{ExifFormat, Rational, SRational};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Orientation values of the 8-state lattice
pub const ORIENTATION_UNDEFINED: i32 = 0;
pub const ORIENTATION_NORMAL: i32 = 1;
pub const ORIENTATION_FLIP_HORIZONTAL: i32 = 2;
pub const ORIENTATION_ROTATE_180: i32 = 3;
pub const ORIENTATION_FLIP_VERTICAL: i32 = 4;
pub const ORIENTATION_TRANSPOSE: i32 = 5;
pub const ORIENTATION_ROTATE_90: i32 = 6;
pub const ORIENTATION_TRANSVERSE: i32 = 7;
pub const ORIENTATION_ROTATE_270: i32 = 8;

// WhiteBalance values
pub const WHITE_BALANCE_AUTO: i32 = 0;
pub const WHITE_BALANCE_MANUAL: i32 = 1;

// Saturation values
pub const SATURATION_NORMAL: i32 = 0;
pub const SATURATION_LOW: i32 = 0;
pub const SATURATION_HIGH: i32 = 0;

// GPSAltitudeRef values
pub const ALTITUDE_ABOVE_SEA_LEVEL: i32 = 0;
pub const ALTITUDE_BELOW_SEA_LEVEL: i32 = 1;
