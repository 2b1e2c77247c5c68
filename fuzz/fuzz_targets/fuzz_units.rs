//! Fuzz target for patch enumeration: patches must tile every channel
//! exactly once.

#![no_main]

use arbitrary::Arbitrary;
use ds_core::relevance::UnitScheme;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Grid {
    rows: u8,
    cols: u8,
    channels: u8,
    patch: u8,
}

fuzz_target!(|grid: Grid| {
    let (rows, cols, channels) = (
        grid.rows as usize % 40,
        grid.cols as usize % 40,
        grid.channels as usize % 6,
    );
    let scheme = UnitScheme::Patch { size: grid.patch as usize % 12 };
    let Ok(units) = scheme.units(rows, cols, channels) else {
        assert_eq!(grid.patch as usize % 12, 0);
        return;
    };

    let mut hits = vec![0u8; rows * cols * channels];
    for (i, unit) in units.iter().enumerate() {
        assert_eq!(unit.index, i);
        for (r, c) in unit.cells() {
            hits[(unit.channel * rows + r) * cols + c] += 1;
        }
    }
    assert!(hits.iter().all(|h| *h == 1));
});
