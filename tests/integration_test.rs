// End-to-end tests over synthetic in-memory fixtures

use std::io::Cursor;
use std::path::PathBuf;

use exif_io::{save_exclusive, test_utils::*, Error, ExifAsset, GpsInfo};

/// Write fixture bytes into a fresh temp file and return its path plus the
/// guard keeping the directory alive.
fn fixture_file(bytes: &[u8], name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    (dir, path)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_minimal_jpeg_gains_orientation() {
    // A JPEG with no APP1 at all gets one on save.
    let (_dir, path) = fixture_file(&minimal_jpeg(), "plain.jpg");

    let mut asset = ExifAsset::open(&path).unwrap();
    assert!(!asset.has_thumbnail());
    asset.set_attribute("Orientation", Some("6")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 1), 6);
    assert!(!reopened.has_thumbnail());
}

#[test]
fn test_jpeg_round_trip_preserves_attributes() {
    let (_dir, path) = fixture_file(&jpeg_with_exif(&sample_tiff()), "sample.jpg");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute("Make").as_deref(), Some("ACME Cameras"));
    assert_eq!(reopened.get_attribute("Model").as_deref(), Some("Model 100"));
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 1);
    assert_eq!(reopened.get_attribute_int("PhotographicSensitivity", 0), 200);
    assert_eq!(reopened.get_attribute("GPSTimeStamp").as_deref(), Some("11:05:32"));

    let f_number: f64 = reopened.get_attribute("FNumber").unwrap().parse().unwrap();
    assert!((f_number - 2.8).abs() < 1e-6);
    let exposure = reopened.get_attribute_double("ExposureTime", 0.0);
    assert!((exposure - 0.004).abs() < 1e-9);
}

#[test]
fn test_png_round_trip() {
    let (_dir, path) = fixture_file(&png_with_exif(&sample_tiff()), "sample.png");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("3")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 3);
    assert_eq!(reopened.get_attribute("Make").as_deref(), Some("ACME Cameras"));
}

#[test]
fn test_png_without_exif_gains_chunk() {
    let (_dir, path) = fixture_file(&minimal_png(), "plain.png");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("8")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 8);
}

#[test]
fn test_webp_round_trip() {
    let (_dir, path) = fixture_file(&webp_with_exif(&sample_tiff()), "sample.webp");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("6")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 6);
    assert_eq!(reopened.get_attribute("Make").as_deref(), Some("ACME Cameras"));
}

#[test]
fn test_webp_without_vp8x_gains_exif() {
    let (_dir, path) = fixture_file(&minimal_webp(), "plain.webp");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("2")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 2);
}

#[test]
fn test_byte_preservation_outside_metadata() {
    let (_dir, path) = fixture_file(&jpeg_with_scan(Some(&sample_tiff())), "scan.jpg");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("6")).unwrap();
    asset.save_attributes().unwrap();

    let saved = std::fs::read(&path).unwrap();
    // The entropy-coded scan and the quantization table survive verbatim.
    assert!(contains_subslice(&saved, b"scan-data"));
    let dqt_ramp: Vec<u8> = (1u8..=64).collect();
    assert!(contains_subslice(&saved, &dqt_ramp));

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 6);
}

#[test]
fn test_set_null_clears_everywhere() {
    let mut asset = ExifAsset::from_reader(Cursor::new(jpeg_with_exif(&sample_tiff()))).unwrap();

    assert!(asset.has_attribute("Make"));
    assert!(asset.has_attribute("FNumber"));
    assert!(asset.has_attribute("GPSTimeStamp"));

    asset.set_attribute("Make", None).unwrap();
    asset.set_attribute("FNumber", None).unwrap();
    asset.set_attribute("GPSTimeStamp", None).unwrap();

    assert!(!asset.has_attribute("Make"));
    assert!(!asset.has_attribute("FNumber"));
    assert!(!asset.has_attribute("GPSTimeStamp"));
}

#[test]
fn test_rotation_lattice() {
    for orientation in 1..=8 {
        let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
        asset
            .set_attribute("Orientation", Some(&orientation.to_string()))
            .unwrap();

        asset.rotate(90).unwrap();
        asset.rotate(270).unwrap();
        assert_eq!(
            asset.get_attribute_int("Orientation", 0),
            orientation,
            "rotate(90) then rotate(270) must be identity for {orientation}"
        );

        asset.flip_horizontally().unwrap();
        asset.flip_horizontally().unwrap();
        assert_eq!(
            asset.get_attribute_int("Orientation", 0),
            orientation,
            "flip_horizontally must be its own inverse for {orientation}"
        );
    }

    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    asset.set_attribute("Orientation", Some("6")).unwrap();
    assert_eq!(asset.rotation_degrees(), 90);
    assert!(!asset.is_flipped());
    asset.flip_horizontally().unwrap();
    assert!(asset.is_flipped());
    assert!(asset.rotate(45).is_err());
}

#[test]
fn test_gps_timestamp_format() {
    let asset = ExifAsset::from_reader(Cursor::new(jpeg_with_exif(&sample_tiff()))).unwrap();
    assert_eq!(asset.get_attribute("GPSTimeStamp").as_deref(), Some("11:05:32"));

    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    asset.set_attribute("GPSTimeStamp", Some("11:05:32")).unwrap();
    assert_eq!(asset.get_attribute("GPSTimeStamp").as_deref(), Some("11:05:32"));
    assert!(asset.set_attribute("GPSTimeStamp", Some("1:2:3")).is_err());
}

#[test]
fn test_fnumber_decimal_compatibility() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    asset.set_attribute("FNumber", Some("2.8")).unwrap();
    let value: f64 = asset.get_attribute("FNumber").unwrap().parse().unwrap();
    assert!((value - 2.8).abs() < 1e-6);
}

#[test]
fn test_deprecated_iso_alias() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    asset.set_attribute("ISOSpeedRatings", Some("400")).unwrap();
    assert_eq!(asset.get_attribute_int("PhotographicSensitivity", 0), 400);
    assert_eq!(asset.get_attribute_int("ISOSpeedRatings", 0), 400);
}

#[test]
fn test_lat_long_round_trip() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();

    asset.set_lat_long(37.773972, -122.431297).unwrap();
    let (lat, lng) = asset.lat_long().unwrap();
    assert!((lat - 37.773972).abs() < 1e-6);
    assert!((lng + 122.431297).abs() < 1e-6);

    assert!(asset.set_lat_long(91.0, 0.0).is_err());
    assert!(asset.set_lat_long(0.0, 181.0).is_err());
}

#[test]
fn test_altitude_sign_encoding() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();

    asset.set_altitude(-10.5).unwrap();
    assert!((asset.altitude(0.0) + 10.5).abs() < 1e-4);
    assert_eq!(asset.get_attribute_int("GPSAltitudeRef", -1), 1);

    asset.set_altitude(120.25).unwrap();
    assert!((asset.altitude(0.0) - 120.25).abs() < 1e-4);
    assert_eq!(asset.get_attribute_int("GPSAltitudeRef", -1), 0);
}

#[test]
fn test_gps_info_bulk_setter() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    let info = GpsInfo {
        latitude: 48.858844,
        longitude: 2.294351,
        altitude_meters: Some(300.5),
        speed_meters_per_second: Some(10.0),
        timestamp_millis: Some(86_400_000 + 3_600_000),
        provider: Some("gps".into()),
    };
    asset.set_gps_info(&info).unwrap();

    let (lat, lng) = asset.lat_long().unwrap();
    assert!((lat - 48.858844).abs() < 1e-6);
    assert!((lng - 2.294351).abs() < 1e-6);
    assert_eq!(asset.get_attribute("GPSDateStamp").as_deref(), Some("1970:01:02"));
    assert_eq!(asset.get_attribute("GPSTimeStamp").as_deref(), Some("01:00:00"));
    assert!((asset.get_attribute_double("GPSSpeed", 0.0) - 36.0).abs() < 1e-6);
}

#[test]
fn test_date_time_millis_round_trip() {
    let mut asset = ExifAsset::from_reader(Cursor::new(minimal_jpeg())).unwrap();
    let millis = 1_700_000_123_456;
    asset.set_date_time(millis).unwrap();
    assert_eq!(asset.date_time(), Some(millis));

    assert!(asset
        .set_attribute("DateTime", Some("not a date at all!"))
        .is_err());
    // Legacy dash-separated form is normalized to the canonical one.
    asset
        .set_attribute("DateTime", Some("2024-05-01 10:20:30"))
        .unwrap();
    assert_eq!(
        asset.get_attribute("DateTime").as_deref(),
        Some("2024:05:01 10:20:30")
    );
}

#[test]
fn test_save_exclusive_strips_metadata() {
    let source = jpeg_with_scan(Some(&sample_tiff_with_orientation(6)));

    // preserve_orientation = false: everything goes
    let mut stripped = Vec::new();
    save_exclusive(&mut Cursor::new(source.clone()), &mut stripped, false).unwrap();
    let reopened = ExifAsset::from_reader(Cursor::new(stripped.clone())).unwrap();
    assert!(!reopened.has_attribute("Orientation"));
    assert!(!reopened.has_attribute("Make"));
    assert!(contains_subslice(&stripped, b"scan-data"));

    // preserve_orientation = true: a single-tag directory survives
    let mut preserved = Vec::new();
    save_exclusive(&mut Cursor::new(source), &mut preserved, true).unwrap();
    let reopened = ExifAsset::from_reader(Cursor::new(preserved)).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 6);
    assert!(!reopened.has_attribute("Make"));
}

#[test]
fn test_standalone_exif_blob() {
    let asset = ExifAsset::from_standalone_exif(Cursor::new(standalone_exif(&sample_tiff()))).unwrap();
    assert_eq!(asset.get_attribute("Make").as_deref(), Some("ACME Cameras"));

    let mut asset = asset;
    assert!(matches!(
        asset.save_attributes(),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_range_queries_go_stale_after_save() {
    let (_dir, path) = fixture_file(&jpeg_with_exif(&sample_tiff()), "stale.jpg");

    let mut asset = ExifAsset::open(&path).unwrap();
    let range = asset.get_attribute_range("Make").unwrap();
    assert!(range.is_some());

    asset.save_attributes().unwrap();
    assert!(matches!(
        asset.get_attribute_range("Make"),
        Err(Error::Stale(_))
    ));
    assert!(matches!(asset.thumbnail_range(), Err(Error::Stale(_))));

    // Attribute access still works after saving.
    assert_eq!(asset.get_attribute("Make").as_deref(), Some("ACME Cameras"));
    asset.set_attribute("Orientation", Some("3")).unwrap();
}

#[test]
fn test_save_requires_writable_backing_store() {
    let mut asset = ExifAsset::from_reader(Cursor::new(jpeg_with_exif(&sample_tiff()))).unwrap();
    asset.set_attribute("Orientation", Some("6")).unwrap();
    assert!(matches!(
        asset.save_attributes(),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_second_save_still_works() {
    let (_dir, path) = fixture_file(&jpeg_with_exif(&sample_tiff()), "twice.jpg");

    let mut asset = ExifAsset::open(&path).unwrap();
    asset.set_attribute("Orientation", Some("6")).unwrap();
    asset.save_attributes().unwrap();
    asset.set_attribute("Orientation", Some("3")).unwrap();
    asset.save_attributes().unwrap();

    let reopened = ExifAsset::open(&path).unwrap();
    assert_eq!(reopened.get_attribute_int("Orientation", 0), 3);
}

#[test]
fn test_mime_support_query() {
    assert!(exif_io::is_supported_mime_type("image/jpeg"));
    assert!(exif_io::is_supported_mime_type("image/webp"));
    assert!(exif_io::is_supported_mime_type("image/x-olympus-orf"));
    assert!(!exif_io::is_supported_mime_type("image/bmp"));
}
