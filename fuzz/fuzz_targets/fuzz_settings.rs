//! Fuzz target for relevance.json parsing and validation.

#![no_main]

use ds_config::{validate_settings, RelevanceSettings};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(settings) = RelevanceSettings::from_json_str(text) {
        let _ = validate_settings(&settings);
        let _ = settings.to_canonical_json();
    }
});
