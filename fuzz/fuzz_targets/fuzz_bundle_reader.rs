//! Fuzz target for .dsb bundle reading.
//!
//! Bundles are shared between machines, so opening and verifying one must
//! fail with an error, never a panic.

#![no_main]

use ds_bundle::BundleReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = BundleReader::from_bytes(data.to_vec()) {
        let _ = reader.verify_all();
        let _ = reader.read_relevance_map::<serde_json::Value>();
    }
});
