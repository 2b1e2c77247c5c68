//! Fuzz target for relevance map documents.

#![no_main]

use ds_core::relevance::{RelevanceMap, RelevanceMapDocument};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = serde_json::from_slice::<RelevanceMapDocument>(data) {
        if let Ok(map) = RelevanceMap::from_document(doc) {
            let _ = map.channel_importance();
            let _ = map.mean_abs_over_time();
        }
    }
});
