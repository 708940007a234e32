#![no_main]

use exif_io::save_exclusive;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // The stripping copy must never panic, and its output must never be
    // larger than input plus one orientation-only metadata block.
    let mut sink = Vec::new();
    let _ = save_exclusive(&mut Cursor::new(data.to_vec()), &mut sink, true);
});
