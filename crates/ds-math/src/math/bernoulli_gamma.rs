//! Zero-inflated Bernoulli-Gamma distribution for daily precipitation.
//!
//! The model is:
//! - occurrence: `wet ~ Bernoulli(p)`
//! - amount: `y | wet ~ Gamma(shape, scale)`, `y = 0` otherwise
//!
//! A day counts as wet when `y > wet_threshold`. The negative log-likelihood
//! is
//!
//! ```text
//! dry:  -ln(1 - p)
//! wet:  -[ln p + (k-1) ln y - y/θ - k ln θ - lnΓ(k)]
//! ```
//!
//! and the expectation is `E[y] = p k θ`.

use serde::{Deserialize, Serialize};

use super::bernoulli;
use super::gamma::gamma_log_pdf;
use super::stable::{clamp_probability, floor_positive};

/// Parameters of one Bernoulli-Gamma predictive distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BernoulliGammaParams {
    /// Probability of a wet day.
    pub p: f64,
    /// Gamma shape of wet-day amounts.
    pub shape: f64,
    /// Gamma scale of wet-day amounts.
    pub scale: f64,
}

impl BernoulliGammaParams {
    pub fn new(p: f64, shape: f64, scale: f64) -> Self {
        Self { p, shape, scale }
    }

    /// Return a copy with `p` clamped into `[eps, 1 - eps]` and shape/scale
    /// floored at `eps`.
    pub fn stabilized(&self, eps: f64) -> Self {
        Self {
            p: clamp_probability(self.p, eps),
            shape: floor_positive(self.shape, eps),
            scale: floor_positive(self.scale, eps),
        }
    }

    /// Expected amount `p * shape * scale` (unclamped parameters).
    pub fn mean(&self) -> f64 {
        self.p * self.shape * self.scale
    }

    /// Variance `p k θ² (1 + k (1 - p))`.
    pub fn variance(&self) -> f64 {
        let k = self.shape;
        let theta = self.scale;
        self.p * k * theta * theta * (1.0 + k * (1.0 - self.p))
    }
}

/// Log-likelihood of an observed amount `y`.
pub fn log_likelihood(y: f64, params: &BernoulliGammaParams, wet_threshold: f64, eps: f64) -> f64 {
    if y.is_nan() {
        return f64::NAN;
    }
    let params = params.stabilized(eps);
    if y <= wet_threshold {
        return bernoulli::log_pmf(false, params.p, eps);
    }
    bernoulli::log_pmf(true, params.p, eps) + gamma_log_pdf(y, params.shape, params.scale)
}

/// Negative log-likelihood of an observed amount `y`.
pub fn nll(y: f64, params: &BernoulliGammaParams, wet_threshold: f64, eps: f64) -> f64 {
    -log_likelihood(y, params, wet_threshold, eps)
}
