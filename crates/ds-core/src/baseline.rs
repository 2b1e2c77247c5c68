//! Baseline distribution for perturbation values.
//!
//! The baseline is a set of training-period time steps on the same grid as
//! the test inputs. Perturbed values are resampled from it: a time step is
//! drawn uniformly and the unit's cells are copied from that step, either
//! from the same cells or from a randomly shifted window.

use ds_common::{Error, Result};
use ds_config::{SamplingScopeKind, SamplingSettings};
use ndarray::{Array4, ArrayViewMut3, Axis};
use rand::Rng;

use crate::relevance::units::Unit;
use crate::tensor::ChannelTensor;

/// Where replacement values are drawn from within a baseline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingScope {
    /// Same cells of the drawn step.
    #[default]
    Global,
    /// Cells shifted by up to `window_size` in each direction, clamped at the
    /// grid edge.
    Local { window_size: usize },
}

impl SamplingScope {
    pub fn from_settings(settings: &SamplingSettings) -> Self {
        match settings.scope {
            SamplingScopeKind::Global => SamplingScope::Global,
            SamplingScopeKind::Local => SamplingScope::Local {
                window_size: settings.window_size,
            },
        }
    }
}

/// Training-period values indexed `(time, row, col, channel)`.
#[derive(Debug, Clone)]
pub struct Baseline {
    data: Array4<f64>,
}

impl Baseline {
    /// Fails when there are no time steps or a value is non-finite.
    pub fn new(data: Array4<f64>) -> Result<Self> {
        if data.len_of(Axis(0)) == 0 {
            return Err(Error::EmptyInput("baseline has no time steps".into()));
        }
        if let Some((idx, _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!(
                "baseline contains a non-finite value at {idx:?}"
            )));
        }
        Ok(Baseline { data })
    }

    pub fn from_tensor(tensor: ChannelTensor) -> Result<Self> {
        let (data, _) = tensor.into_parts();
        Self::new(data)
    }

    pub fn time_steps(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// `(rows, cols, channels)`.
    pub fn spatial_shape(&self) -> (usize, usize, usize) {
        let (_, r, c, ch) = self.data.dim();
        (r, c, ch)
    }

    pub fn check_compatible(&self, shape: (usize, usize, usize)) -> Result<()> {
        if self.spatial_shape() != shape {
            return Err(Error::ShapeMismatch {
                what: "baseline (rows, cols, channels)".into(),
                expected: format!("{shape:?}"),
                actual: format!("{:?}", self.spatial_shape()),
            });
        }
        Ok(())
    }

    /// Overwrite `unit`'s cells in `copy` with values resampled from the
    /// baseline. `copy` is `(row, col, channel)`.
    pub fn resample_unit<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        unit: &Unit,
        scope: SamplingScope,
        copy: &mut ArrayViewMut3<'_, f64>,
    ) {
        let (rows, cols, _) = self.spatial_shape();
        let t = rng.random_range(0..self.time_steps());
        let (dr, dc) = match scope {
            SamplingScope::Global => (0, 0),
            SamplingScope::Local { window_size } => {
                let k = window_size as i64;
                (
                    rng.random_range(-k..=k) as isize,
                    rng.random_range(-k..=k) as isize,
                )
            }
        };

        let step = self.data.index_axis(Axis(0), t);
        for (r, c) in unit.cells() {
            let sr = shift(r, dr, rows);
            let sc = shift(c, dc, cols);
            copy[[r, c, unit.channel]] = step[[sr, sc, unit.channel]];
        }
    }
}

/// `index + delta`, clamped into `0..len`.
fn shift(index: usize, delta: isize, len: usize) -> usize {
    let moved = index as isize + delta;
    moved.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ramp(steps: usize, rows: usize, cols: usize) -> Array4<f64> {
        Array4::from_shape_fn((steps, rows, cols, 2), |(t, r, c, ch)| {
            (t * 1000 + r * 100 + c * 10 + ch) as f64
        })
    }

    #[test]
    fn test_new_rejects_empty_and_non_finite() {
        assert!(matches!(
            Baseline::new(Array4::zeros((0, 2, 2, 1))),
            Err(Error::EmptyInput(_))
        ));
        let mut data = Array4::zeros((1, 2, 2, 1));
        data[[0, 1, 1, 0]] = f64::INFINITY;
        assert!(matches!(Baseline::new(data), Err(Error::Config(_))));
    }

    #[test]
    fn test_check_compatible() {
        let baseline = Baseline::new(ramp(2, 3, 3)).unwrap();
        assert!(baseline.check_compatible((3, 3, 2)).is_ok());
        assert!(matches!(
            baseline.check_compatible((3, 4, 2)),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_global_copies_same_cells_of_one_step() {
        let baseline = Baseline::new(ramp(5, 3, 3)).unwrap();
        let unit = Unit {
            index: 0,
            channel: 1,
            rows: 0..3,
            cols: 0..3,
        };
        let mut copy = Array3::from_elem((3, 3, 2), -1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        baseline.resample_unit(&mut rng, &unit, SamplingScope::Global, &mut copy.view_mut());

        let t = (copy[[0, 0, 1]] / 1000.0).floor();
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(copy[[r, c, 1]], t * 1000.0 + (r * 100 + c * 10 + 1) as f64);
                assert_eq!(copy[[r, c, 0]], -1.0);
            }
        }
    }

    #[test]
    fn test_local_shift_stays_in_grid_and_window() {
        let baseline = Baseline::new(ramp(1, 4, 4)).unwrap();
        let unit = Unit {
            index: 0,
            channel: 0,
            rows: 1..2,
            cols: 1..2,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let mut copy = Array3::zeros((4, 4, 2));
            baseline.resample_unit(
                &mut rng,
                &unit,
                SamplingScope::Local { window_size: 1 },
                &mut copy.view_mut(),
            );
            let v = copy[[1, 1, 0]] as usize;
            let (sr, sc) = (v / 100, (v / 10) % 10);
            assert!(sr <= 2 && sc <= 2, "shift out of window: {v}");
        }
    }

    #[test]
    fn test_shift_clamps() {
        assert_eq!(shift(0, -3, 5), 0);
        assert_eq!(shift(4, 2, 5), 4);
        assert_eq!(shift(2, 1, 5), 3);
    }

    #[test]
    fn test_local_shift_covers_whole_window() {
        let baseline = Baseline::new(ramp(1, 5, 5)).unwrap();
        let unit = Unit {
            index: 0,
            channel: 1,
            rows: 2..3,
            cols: 2..3,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..400 {
            let mut copy = Array3::zeros((5, 5, 2));
            baseline.resample_unit(
                &mut rng,
                &unit,
                SamplingScope::Local { window_size: 2 },
                &mut copy.view_mut(),
            );
            let v = copy[[2, 2, 1]] as usize;
            seen.insert((v / 100, (v / 10) % 10));
        }
        assert_eq!(seen.len(), 25);
        assert!(seen.contains(&(0, 0)) && seen.contains(&(4, 4)));
    }
}
