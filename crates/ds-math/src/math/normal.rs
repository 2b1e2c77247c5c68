//! Gaussian predictive distribution parameterized by mean and log-scale.
//!
//! Used for temperature targets. The log-scale parameterization keeps the
//! standard deviation positive without clamping; an `eps` floor is still
//! applied to the scale to guard against underflow of `exp(log_scale)`.

use serde::{Deserialize, Serialize};

use super::stable::LOG_SQRT_2PI;

/// Parameters of one Gaussian predictive distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub mean: f64,
    /// Natural log of the standard deviation.
    pub log_scale: f64,
}

impl GaussianParams {
    pub fn new(mean: f64, log_scale: f64) -> Self {
        Self { mean, log_scale }
    }

    /// Standard deviation `exp(log_scale)` floored at `eps`.
    pub fn scale(&self, eps: f64) -> f64 {
        self.log_scale.exp().max(eps)
    }
}

/// Log density of `y` under `N(mean, exp(log_scale)²)`.
pub fn log_pdf(y: f64, params: &GaussianParams, eps: f64) -> f64 {
    if y.is_nan() || params.mean.is_nan() || params.log_scale.is_nan() {
        return f64::NAN;
    }
    let sigma = params.scale(eps);
    let z = (y - params.mean) / sigma;
    -LOG_SQRT_2PI - sigma.ln() - 0.5 * z * z
}

/// Negative log-likelihood of `y`.
pub fn nll(y: f64, params: &GaussianParams, eps: f64) -> f64 {
    -log_pdf(y, params, eps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn standard_normal_at_zero() {
        let params = GaussianParams::new(0.0, 0.0);
        assert!(approx_eq(nll(0.0, &params, 1e-6), LOG_SQRT_2PI, 1e-15));
    }

    #[test]
    fn nll_grows_with_distance() {
        let params = GaussianParams::new(1.0, 0.0);
        assert!(nll(3.0, &params, 1e-6) > nll(2.0, &params, 1e-6));
        assert!(approx_eq(nll(3.0, &params, 1e-6) - nll(1.0, &params, 1e-6), 2.0, 1e-12));
    }

    #[test]
    fn symmetric_about_the_mean() {
        let params = GaussianParams::new(2.5, -0.3);
        let y = 4.0;
        let mirrored = 2.0 * params.mean - y;
        assert!(approx_eq(nll(y, &params, 1e-6), nll(mirrored, &params, 1e-6), 1e-12));
    }

    #[test]
    fn tiny_scale_is_floored() {
        let params = GaussianParams::new(0.0, -1000.0);
        assert!(nll(0.0, &params, 1e-6).is_finite());
        assert!(nll(1.0, &params, 1e-6).is_finite());
    }

    #[test]
    fn nan_propagates() {
        let params = GaussianParams::new(f64::NAN, 0.0);
        assert!(nll(1.0, &params, 1e-6).is_nan());
    }
}
