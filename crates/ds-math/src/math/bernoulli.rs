//! Bernoulli occurrence model for wet/dry day indicators.
//!
//! Probabilities are clamped into `[eps, 1 - eps]` before any logarithm is
//! taken, so degenerate model outputs (exactly 0 or 1) yield large but finite
//! log-probabilities.

use super::stable::{clamp_probability, log1m};

/// Log probability of a binary outcome `x` under `Bernoulli(p)`.
///
/// # Arguments
/// * `x` - The outcome (`true` = event occurred)
/// * `p` - Event probability; clamped into `[eps, 1 - eps]`
/// * `eps` - Clamping floor
pub fn log_pmf(x: bool, p: f64, eps: f64) -> f64 {
    let p = clamp_probability(p, eps);
    if p.is_nan() {
        return f64::NAN;
    }
    if x {
        p.ln()
    } else {
        log1m(p)
    }
}

/// Negative log probability of `x` under `Bernoulli(p)`.
pub fn nll(x: bool, p: f64, eps: f64) -> f64 {
    -log_pmf(x, p, eps)
}

/// Variance of `Bernoulli(p)`: `p (1 - p)`.
pub fn variance(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    p * (1.0 - p)
}
