#![no_main]

use exif_io::ExifAsset;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Any byte stream must parse without panicking; damaged metadata
    // degrades to an empty session, never an abort.
    if let Ok(asset) = ExifAsset::from_reader(Cursor::new(data.to_vec())) {
        let _ = asset.container();
        let _ = asset.get_attribute("Orientation");
        let _ = asset.get_attribute("Make");
        let _ = asset.get_attribute("FNumber");
        let _ = asset.get_attribute("GPSTimeStamp");
        let _ = asset.get_attribute_int("Orientation", 1);
        let _ = asset.lat_long();
        let _ = asset.has_thumbnail();
        let _ = asset.thumbnail();
        let _ = asset.thumbnail_range();
        let _ = asset.date_time();
    }
});
