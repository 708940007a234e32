#![no_main]

use exif_io::ExifAsset;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Standalone blobs take the TIFF codec directly, no container scan.
    if let Ok(asset) = ExifAsset::from_standalone_exif(Cursor::new(data.to_vec())) {
        let _ = asset.get_attribute("Orientation");
        let _ = asset.get_attribute("DateTime");
        let _ = asset.has_thumbnail();
    }
});
