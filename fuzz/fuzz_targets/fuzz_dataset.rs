//! Fuzz target for gridded dataset files.
//!
//! Declared shapes and coordinate axes are untrusted; mismatches must come
//! back as errors.

#![no_main]

use ds_core::io::parse_dataset;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_dataset(text);
    }
});
