//! Multi-channel gridded tensors.
//!
//! A `ChannelTensor` holds values indexed `(sample, row, col, channel)`
//! together with the grid coordinates and channel names that give those
//! indices meaning.

use ds_common::{Error, Result};
use ndarray::{Array4, ArrayView3, ArrayView4};
use serde::{Deserialize, Serialize};

/// Coordinates and labels for the axes of a `ChannelTensor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    /// Latitude of each row.
    pub lats: Vec<f64>,
    /// Longitude of each column.
    pub lons: Vec<f64>,
    /// Predictor variable name of each channel.
    pub channels: Vec<String>,
    /// Label of each sample (usually a date).
    pub times: Vec<String>,
}

impl GridMetadata {
    /// Index-valued coordinates for a tensor of the given shape.
    pub fn indexed(samples: usize, rows: usize, cols: usize, channels: usize) -> Self {
        GridMetadata {
            lats: (0..rows).map(|r| r as f64).collect(),
            lons: (0..cols).map(|c| c as f64).collect(),
            channels: (0..channels).map(|c| format!("ch{c}")).collect(),
            times: (0..samples).map(|t| t.to_string()).collect(),
        }
    }

    fn check(&self, shape: (usize, usize, usize, usize)) -> Result<()> {
        let (samples, rows, cols, channels) = shape;
        let axes = [
            ("lats", self.lats.len(), rows),
            ("lons", self.lons.len(), cols),
            ("channels", self.channels.len(), channels),
            ("times", self.times.len(), samples),
        ];
        for (what, actual, expected) in axes {
            if actual != expected {
                return Err(Error::ShapeMismatch {
                    what: format!("grid metadata {what}"),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Values indexed `(sample, row, col, channel)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTensor {
    data: Array4<f64>,
    meta: GridMetadata,
}

impl ChannelTensor {
    /// Pair values with metadata. Axis lengths must agree.
    pub fn new(data: Array4<f64>, meta: GridMetadata) -> Result<Self> {
        meta.check(data.dim())?;
        Ok(ChannelTensor { data, meta })
    }

    /// Wrap bare values with index coordinates.
    pub fn from_array(data: Array4<f64>) -> Self {
        let (s, r, c, ch) = data.dim();
        ChannelTensor {
            meta: GridMetadata::indexed(s, r, c, ch),
            data,
        }
    }

    pub fn samples(&self) -> usize {
        self.data.dim().0
    }

    pub fn rows(&self) -> usize {
        self.data.dim().1
    }

    pub fn cols(&self) -> usize {
        self.data.dim().2
    }

    pub fn channels(&self) -> usize {
        self.data.dim().3
    }

    /// `(rows, cols, channels)`.
    pub fn spatial_shape(&self) -> (usize, usize, usize) {
        let (_, r, c, ch) = self.data.dim();
        (r, c, ch)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayView4<'_, f64> {
        self.data.view()
    }

    /// One sample as `(row, col, channel)`.
    pub fn sample(&self, index: usize) -> ArrayView3<'_, f64> {
        self.data.index_axis(ndarray::Axis(0), index)
    }

    pub fn metadata(&self) -> &GridMetadata {
        &self.meta
    }

    pub fn into_parts(self) -> (Array4<f64>, GridMetadata) {
        (self.data, self.meta)
    }

    /// Position of the first NaN or infinite value, if any.
    pub fn first_non_finite(&self) -> Option<(usize, usize, usize, usize)> {
        self.data
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(idx, _)| idx)
    }
}

/// Longest axis accepted in a declared shape.
pub const MAX_AXIS_LEN: usize = 1 << 20;

/// Check that `actual` values fill a declared `shape`.
///
/// Axes longer than `MAX_AXIS_LEN` and element counts that overflow
/// `usize` are rejected.
pub fn check_declared_shape(what: &str, shape: &[usize], actual: usize) -> Result<()> {
    if let Some(&axis) = shape.iter().find(|&&n| n > MAX_AXIS_LEN) {
        return Err(Error::ShapeMismatch {
            what: format!("{what} axis length"),
            expected: format!("at most {MAX_AXIS_LEN}"),
            actual: axis.to_string(),
        });
    }
    let expected = shape.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n));
    if expected != Some(actual) {
        return Err(Error::ShapeMismatch {
            what: what.to_string(),
            expected: match expected {
                Some(n) => format!("{n} values for shape {shape:?}"),
                None => format!("shape {shape:?} within usize"),
            },
            actual: format!("{actual} values"),
        });
    }
    Ok(())
}
