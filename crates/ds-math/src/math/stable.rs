//! Numerically stable primitives for log-domain likelihood math.

use std::f64::consts::PI;

/// 0.5 * ln(2*pi)
pub const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Default floor used when clamping probabilities and positive parameters.
pub const DEFAULT_EPSILON: f64 = 1e-6;

const LANCZOS_G: f64 = 7.0;
#[allow(clippy::excessive_precision)] // These are published numerical constants
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the Gamma function (log |Gamma(z)|).
///
/// Uses a Lanczos approximation with reflection for z < 0.5.
pub fn log_gamma(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z == f64::INFINITY {
        return f64::INFINITY;
    }
    if z == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if z <= 0.0 {
        let z_round = z.round();
        if (z - z_round).abs() < 1e-15 {
            return f64::NAN;
        }
    }
    if z < 0.5 {
        let sin_pi = (PI * z).sin();
        if sin_pi == 0.0 {
            return f64::NAN;
        }
        return PI.ln() - sin_pi.abs().ln() - log_gamma(1.0 - z);
    }

    let z_minus = z - 1.0;
    let mut x = LANCZOS_COEFFS[0];
    for (i, coeff) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        x += coeff / (z_minus + i as f64);
    }
    let t = z_minus + LANCZOS_G + 0.5;
    LOG_SQRT_2PI + (z_minus + 0.5) * t.ln() - t + x.ln()
}

/// Clamp a probability into `[eps, 1 - eps]` so that both `ln(p)` and
/// `ln(1 - p)` stay finite.
///
/// NaN passes through unchanged.
pub fn clamp_probability(p: f64, eps: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    let eps = eps.clamp(0.0, 0.5);
    p.clamp(eps, 1.0 - eps)
}

/// Floor a strictly-positive parameter (shape, scale) at `eps`.
///
/// NaN passes through unchanged.
pub fn floor_positive(x: f64, eps: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    x.max(eps)
}

/// Stable ln(1 - p) for p in [0, 1].
pub fn log1m(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    if p >= 1.0 {
        return f64::NEG_INFINITY;
    }
    (-p).ln_1p()
}

/// Logistic sigmoid, evaluated without overflow for large |x|.
pub fn sigmoid(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
