//! Perturbation units.
//!
//! A unit is the set of cells perturbed together: a whole channel layer,
//! or one square patch of one channel.

use ds_common::{Error, Result};
use ds_config::{UnitMode, UnitSettings};
use std::ops::Range;

/// Cells `rows x cols` of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Stable position in the unit enumeration. Seeds the unit's sampler.
    pub index: usize,
    pub channel: usize,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Unit {
    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    /// `(row, col)` of every cell in the unit.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .clone()
            .flat_map(move |r| self.cols.clone().map(move |c| (r, c)))
    }
}

/// How a sample is split into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitScheme {
    #[default]
    Channel,
    /// Non-overlapping `size x size` patches; edge patches are truncated.
    Patch { size: usize },
}

impl UnitScheme {
    pub fn from_settings(settings: &UnitSettings) -> Self {
        match settings.mode {
            UnitMode::Channel => UnitScheme::Channel,
            UnitMode::Patch => UnitScheme::Patch {
                size: settings.patch_size,
            },
        }
    }

    /// Enumerate units channel by channel, patches in row-major order.
    pub fn units(&self, rows: usize, cols: usize, channels: usize) -> Result<Vec<Unit>> {
        let size = match *self {
            UnitScheme::Channel => return Ok(channel_units(rows, cols, channels)),
            UnitScheme::Patch { size } => size,
        };
        if size == 0 {
            return Err(Error::InvalidSettings("patch_size must be at least 1".into()));
        }

        let mut units = Vec::with_capacity(channels * rows.div_ceil(size) * cols.div_ceil(size));
        for channel in 0..channels {
            for r0 in (0..rows).step_by(size) {
                for c0 in (0..cols).step_by(size) {
                    units.push(Unit {
                        index: units.len(),
                        channel,
                        rows: r0..(r0 + size).min(rows),
                        cols: c0..(c0 + size).min(cols),
                    });
                }
            }
        }
        Ok(units)
    }
}

fn channel_units(rows: usize, cols: usize, channels: usize) -> Vec<Unit> {
    (0..channels)
        .map(|channel| Unit {
            index: channel,
            channel,
            rows: 0..rows,
            cols: 0..cols,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_units_cover_layers() {
        let units = UnitScheme::Channel.units(3, 4, 2).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].channel, 1);
        assert_eq!(units[1].cell_count(), 12);
    }

    #[test]
    fn test_patch_units_truncate_at_edges() {
        let units = UnitScheme::Patch { size: 2 }.units(3, 3, 1).unwrap();
        assert_eq!(units.len(), 4);
        let sizes: Vec<usize> = units.iter().map(Unit::cell_count).collect();
        assert_eq!(sizes, vec![4, 2, 2, 1]);
        assert_eq!(units[3].rows, 2..3);
        assert_eq!(units[3].cols, 2..3);
    }

    #[test]
    fn test_patches_partition_every_channel() {
        let (rows, cols, channels) = (5, 7, 3);
        let units = UnitScheme::Patch { size: 3 }.units(rows, cols, channels).unwrap();
        let mut seen = vec![0u32; rows * cols * channels];
        for unit in &units {
            for (r, c) in unit.cells() {
                seen[(r * cols + c) * channels + unit.channel] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
        assert!(units.iter().enumerate().all(|(i, u)| u.index == i));
    }

    #[test]
    fn test_zero_patch_rejected() {
        assert!(matches!(
            UnitScheme::Patch { size: 0 }.units(2, 2, 1),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = UnitSettings {
            mode: UnitMode::Patch,
            patch_size: 4,
        };
        assert_eq!(UnitScheme::from_settings(&settings), UnitScheme::Patch { size: 4 });
        assert_eq!(UnitScheme::from_settings(&UnitSettings::default()), UnitScheme::Channel);
    }
}
