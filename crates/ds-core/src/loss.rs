//! Distributional losses the downscaling models are trained with.
//!
//! Each loss names the parameters the model emits per location, how raw
//! network outputs map onto them, and how to evaluate an expectation or a
//! negative log-likelihood from them.

use ds_config::{LossKind, LossSettings};
use ds_math::bernoulli_gamma::{self, BernoulliGammaParams};
use ds_math::normal::{self, GaussianParams};
use ds_math::{sigmoid, DEFAULT_EPSILON};

/// Largest parameter count of any loss.
pub const MAX_PARAMS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionalLoss {
    /// Occurrence probability and Gamma amount: `(p, shape, scale)`.
    BernoulliGamma { epsilon: f64, wet_threshold: f64 },
    /// `(mean, log_scale)`.
    Gaussian { epsilon: f64 },
}

impl DistributionalLoss {
    pub fn bernoulli_gamma() -> Self {
        DistributionalLoss::BernoulliGamma {
            epsilon: DEFAULT_EPSILON,
            wet_threshold: 0.0,
        }
    }

    pub fn gaussian() -> Self {
        DistributionalLoss::Gaussian {
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn from_settings(settings: &LossSettings) -> Self {
        match settings.kind {
            LossKind::BernoulliGamma => DistributionalLoss::BernoulliGamma {
                epsilon: settings.epsilon,
                wet_threshold: settings.wet_threshold,
            },
            LossKind::Gaussian => DistributionalLoss::Gaussian {
                epsilon: settings.epsilon,
            },
        }
    }

    pub fn kind(&self) -> LossKind {
        match self {
            DistributionalLoss::BernoulliGamma { .. } => LossKind::BernoulliGamma,
            DistributionalLoss::Gaussian { .. } => LossKind::Gaussian,
        }
    }

    pub fn param_count(&self) -> usize {
        self.param_names().len()
    }

    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            DistributionalLoss::BernoulliGamma { .. } => &["p", "shape", "scale"],
            DistributionalLoss::Gaussian { .. } => &["mean", "log_scale"],
        }
    }

    /// Map a raw linear output onto parameter `param`'s domain.
    pub fn link(&self, param: usize, raw: f64) -> f64 {
        match self {
            DistributionalLoss::BernoulliGamma { .. } => match param {
                0 => sigmoid(raw),
                _ => raw.exp(),
            },
            DistributionalLoss::Gaussian { .. } => raw,
        }
    }

    /// Expected value of the predictive distribution.
    ///
    /// `params` holds exactly `param_count()` values.
    pub fn expectation(&self, params: &[f64]) -> f64 {
        match self {
            DistributionalLoss::BernoulliGamma { .. } => {
                BernoulliGammaParams::new(params[0], params[1], params[2]).mean()
            }
            DistributionalLoss::Gaussian { .. } => params[0],
        }
    }

    /// Negative log-likelihood of observation `y`.
    pub fn negative_log_likelihood(&self, y: f64, params: &[f64]) -> f64 {
        match *self {
            DistributionalLoss::BernoulliGamma {
                epsilon,
                wet_threshold,
            } => bernoulli_gamma::nll(
                y,
                &BernoulliGammaParams::new(params[0], params[1], params[2]),
                wet_threshold,
                epsilon,
            ),
            DistributionalLoss::Gaussian { epsilon } => {
                normal::nll(y, &GaussianParams::new(params[0], params[1]), epsilon)
            }
        }
    }

    /// Gather the parameters of `location` from a parameter-major output row
    /// `[param_0 @ loc_0..loc_{L-1}, param_1 @ loc_0.., ...]`.
    pub fn gather(&self, row: &[f64], location: usize, num_locations: usize) -> [f64; MAX_PARAMS] {
        let mut params = [0.0; MAX_PARAMS];
        for (p, slot) in params.iter_mut().take(self.param_count()).enumerate() {
            *slot = row[p * num_locations + location];
        }
        params
    }
}

impl Default for DistributionalLoss {
    fn default() -> Self {
        DistributionalLoss::gaussian()
    }
}
