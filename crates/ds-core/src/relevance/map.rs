//! Relevance map container and its JSON document form.

use ds_common::{Error, Result, SCHEMA_VERSION};
use ds_config::{LossKind, ScoreMode, ScoreTarget};
use ndarray::{Array2, Array4, Array5, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::grid::OutputLocation;
use crate::tensor::{check_declared_shape, GridMetadata};

/// Scores indexed `(sample, row, col, channel, location)`.
///
/// Cells of a failed or skipped sample hold `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceMap {
    scores: Array5<f64>,
    pub grid: GridMetadata,
    pub locations: Vec<OutputLocation>,
    pub loss: LossKind,
    pub score_mode: ScoreMode,
    pub score_target: ScoreTarget,
}

impl RelevanceMap {
    pub fn new(
        scores: Array5<f64>,
        grid: GridMetadata,
        locations: Vec<OutputLocation>,
        loss: LossKind,
        score_mode: ScoreMode,
        score_target: ScoreTarget,
    ) -> Result<Self> {
        let (s, r, c, ch, l) = scores.dim();
        let axes = [
            ("times", grid.times.len(), s),
            ("lats", grid.lats.len(), r),
            ("lons", grid.lons.len(), c),
            ("channels", grid.channels.len(), ch),
            ("locations", locations.len(), l),
        ];
        for (what, actual, expected) in axes {
            if actual != expected {
                return Err(Error::ShapeMismatch {
                    what: format!("relevance map {what}"),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(RelevanceMap {
            scores,
            grid,
            locations,
            loss,
            score_mode,
            score_target,
        })
    }

    pub fn scores(&self) -> &Array5<f64> {
        &self.scores
    }

    pub fn into_scores(self) -> Array5<f64> {
        self.scores
    }

    /// `(samples, rows, cols, channels, locations)`.
    pub fn shape(&self) -> (usize, usize, usize, usize, usize) {
        self.scores.dim()
    }

    pub fn num_locations(&self) -> usize {
        self.scores.len_of(Axis(4))
    }

    /// Scores for one location, `(sample, row, col, channel)`.
    pub fn location_view(&self, location: usize) -> Result<ArrayView4<'_, f64>> {
        if location >= self.num_locations() {
            return Err(Error::Config(format!(
                "location index {location} out of range ({} locations)",
                self.num_locations()
            )));
        }
        Ok(self.scores.index_axis(Axis(4), location))
    }

    /// Mean of `|score|` over samples, `(row, col, channel, location)`.
    /// NaN cells are left out; a cell with no finite value is NaN.
    pub fn mean_abs_over_time(&self) -> Array4<f64> {
        let (_, r, c, ch, l) = self.shape();
        let mut out = Array4::from_elem((r, c, ch, l), f64::NAN);
        for (idx, slot) in out.indexed_iter_mut() {
            let (ri, ci, chi, li) = idx;
            let column = self.scores.slice(ndarray::s![.., ri, ci, chi, li]);
            if let Some(mean) = finite_mean(column.iter().map(|v| v.abs())) {
                *slot = mean;
            }
        }
        out
    }

    /// Mean `|score|` per `(channel, location)` across samples and cells.
    pub fn channel_importance(&self) -> Array2<f64> {
        let (_, _, _, ch, l) = self.shape();
        let mut out = Array2::from_elem((ch, l), f64::NAN);
        for ((chi, li), slot) in out.indexed_iter_mut() {
            let layer = self.scores.slice(ndarray::s![.., .., .., chi, li]);
            if let Some(mean) = finite_mean(layer.iter().map(|v| v.abs())) {
                *slot = mean;
            }
        }
        out
    }

    /// Number of NaN cells.
    pub fn nan_count(&self) -> usize {
        self.scores.iter().filter(|v| v.is_nan()).count()
    }

    pub fn to_document(&self) -> RelevanceMapDocument {
        let (s, r, c, ch, l) = self.shape();
        let data = self
            .scores
            .iter()
            .map(|&v| if v.is_finite() { Some(v) } else { None })
            .collect();
        RelevanceMapDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            shape: [s, r, c, ch, l],
            data,
            lats: self.grid.lats.clone(),
            lons: self.grid.lons.clone(),
            channels: self.grid.channels.clone(),
            times: self.grid.times.clone(),
            locations: self.locations.clone(),
            loss: self.loss,
            score_mode: self.score_mode,
            score_target: self.score_target,
        }
    }

    pub fn from_document(doc: RelevanceMapDocument) -> Result<Self> {
        if !ds_common::schema::is_compatible(&doc.schema_version) {
            return Err(Error::Config(format!(
                "unsupported relevance map schema version {} (expected {})",
                doc.schema_version, SCHEMA_VERSION
            )));
        }
        check_declared_shape("relevance map data", &doc.shape, doc.data.len())?;
        let [s, r, c, ch, l] = doc.shape;
        let values: Vec<f64> = doc.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let scores = Array5::from_shape_vec((s, r, c, ch, l), values).map_err(|e| {
            Error::ShapeMismatch {
                what: "relevance map data".into(),
                expected: format!("{:?}", doc.shape),
                actual: e.to_string(),
            }
        })?;
        let grid = GridMetadata {
            lats: doc.lats,
            lons: doc.lons,
            channels: doc.channels,
            times: doc.times,
        };
        RelevanceMap::new(scores, grid, doc.locations, doc.loss, doc.score_mode, doc.score_target)
    }
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Serialized relevance map. `data` is the row-major flattening of the
/// 5-d score array; non-finite cells are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceMapDocument {
    pub schema_version: String,
    pub shape: [usize; 5],
    pub data: Vec<Option<f64>>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    pub channels: Vec<String>,
    pub times: Vec<String>,
    pub locations: Vec<OutputLocation>,
    pub loss: LossKind,
    pub score_mode: ScoreMode,
    pub score_target: ScoreTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> RelevanceMap {
        let mut scores = Array5::from_shape_fn((2, 2, 2, 2, 1), |(s, r, c, ch, _)| {
            let v = (r * 2 + c) as f64 + ch as f64 * 10.0;
            if s == 0 {
                v
            } else {
                -v
            }
        });
        scores[[1, 0, 0, 1, 0]] = f64::NAN;
        RelevanceMap::new(
            scores,
            GridMetadata::indexed(2, 2, 2, 2),
            vec![OutputLocation::new(0.0, 0.0)],
            LossKind::Gaussian,
            ScoreMode::Signed,
            ScoreTarget::Expectation,
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_axes() {
        let err = RelevanceMap::new(
            Array5::zeros((1, 2, 2, 1, 2)),
            GridMetadata::indexed(1, 2, 2, 1),
            vec![OutputLocation::new(0.0, 0.0)],
            LossKind::Gaussian,
            ScoreMode::Signed,
            ScoreTarget::Expectation,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_mean_abs_over_time_skips_nan() {
        let map = sample_map();
        let agg = map.mean_abs_over_time();
        assert_eq!(agg.dim(), (2, 2, 2, 1));
        assert_eq!(agg[[1, 1, 0, 0]], 3.0);
        // Only sample 0 is finite here.
        assert_eq!(agg[[0, 0, 1, 0]], 10.0);
    }

    #[test]
    fn test_channel_importance() {
        let map = sample_map();
        let imp = map.channel_importance();
        assert_eq!(imp.dim(), (2, 1));
        assert!((imp[[0, 0]] - 1.5).abs() < 1e-12);
        assert!(imp[[1, 0]] > imp[[0, 0]]);
    }

    #[test]
    fn test_location_view_bounds() {
        let map = sample_map();
        assert_eq!(map.location_view(0).unwrap().dim(), (2, 2, 2, 2));
        assert!(map.location_view(1).is_err());
    }

    #[test]
    fn test_document_nan_as_null() {
        let map = sample_map();
        let doc = map.to_document();
        assert_eq!(doc.data.iter().filter(|v| v.is_none()).count(), 1);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("null"));

        let back = RelevanceMap::from_document(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(back.shape(), map.shape());
        assert_eq!(back.nan_count(), 1);
        assert_eq!(back.scores()[[0, 1, 1, 1, 0]], 13.0);
    }

    #[test]
    fn test_document_rejects_short_data() {
        let mut doc = sample_map().to_document();
        doc.data.pop();
        assert!(matches!(
            RelevanceMap::from_document(doc),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_document_rejects_overflowing_shape() {
        let mut doc = sample_map().to_document();
        doc.shape = [1 << 20, 1 << 20, 1 << 20, 1 << 20, 1];
        assert!(matches!(
            RelevanceMap::from_document(doc),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_document_json_keeps_every_bit() {
        let values = [-101.69999999999999, 0.1 + 0.2, 1.0 / 3.0, -2.2250738585072014e-308];
        let scores = Array5::from_shape_fn((1, 2, 2, 1, 1), |(_, r, c, _, _)| values[r * 2 + c]);
        let map = RelevanceMap::new(
            scores,
            GridMetadata::indexed(1, 2, 2, 1),
            vec![OutputLocation::new(0.0, 0.0)],
            LossKind::Gaussian,
            ScoreMode::Signed,
            ScoreTarget::Expectation,
        )
        .unwrap();

        let json = serde_json::to_string(&map.to_document()).unwrap();
        let back = RelevanceMap::from_document(serde_json::from_str(&json).unwrap()).unwrap();
        for (a, b) in back.scores().iter().zip(map.scores()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_document_rejects_other_major() {
        let mut doc = sample_map().to_document();
        doc.schema_version = "2.0.0".into();
        assert!(RelevanceMap::from_document(doc).is_err());
    }
}
