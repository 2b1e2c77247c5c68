//! Gamma distribution utilities for wet-day precipitation amounts.
//!
//! # Parameterization
//!
//! Uses **scale parameterization**: `Gamma(k, θ)` where:
//! - `k` = shape parameter (k > 0)
//! - `θ` = scale parameter (θ > 0)
//!
//! The density is: `f(y) = y^(k-1) e^(-y/θ) / (Γ(k) θ^k)`
//!
//! This is equivalent to rate parameterization with `β = 1/θ`; the rate form
//! is kept for callers that work with rates.

use super::stable::log_gamma;

/// Log of the Gamma distribution PDF at y (scale parameterization).
///
/// # Arguments
/// * `y` - The value at which to evaluate (y >= 0)
/// * `shape` - Shape parameter (k > 0)
/// * `scale` - Scale parameter (θ > 0)
///
/// # Returns
/// * `log f(y | k, θ)` or appropriate boundary value
pub fn gamma_log_pdf(y: f64, shape: f64, scale: f64) -> f64 {
    if y.is_nan() || shape.is_nan() || scale.is_nan() {
        return f64::NAN;
    }
    if shape <= 0.0 || scale <= 0.0 {
        return f64::NAN;
    }
    if y < 0.0 {
        return f64::NEG_INFINITY;
    }

    if y == 0.0 {
        if shape < 1.0 {
            return f64::INFINITY;
        } else if shape == 1.0 {
            // Exponential case: f(0) = 1/θ
            return -scale.ln();
        } else {
            return f64::NEG_INFINITY;
        }
    }

    // log f(y) = (k-1)*log(y) - y/θ - k*log(θ) - log(Γ(k))
    (shape - 1.0) * y.ln() - y / scale - shape * scale.ln() - log_gamma(shape)
}

/// Log of the Gamma distribution PDF at y (rate parameterization).
pub fn gamma_log_pdf_rate(y: f64, shape: f64, rate: f64) -> f64 {
    if rate.is_nan() || rate <= 0.0 {
        return f64::NAN;
    }
    gamma_log_pdf(y, shape, 1.0 / rate)
}

/// Gamma distribution PDF at y.
///
/// Returns `exp(gamma_log_pdf(y, shape, scale))` with proper handling of
/// boundary cases.
pub fn gamma_pdf(y: f64, shape: f64, scale: f64) -> f64 {
    let log_pdf = gamma_log_pdf(y, shape, scale);
    if log_pdf.is_nan() {
        return f64::NAN;
    }
    if log_pdf == f64::INFINITY {
        return f64::INFINITY;
    }
    if log_pdf == f64::NEG_INFINITY {
        return 0.0;
    }
    log_pdf.exp()
}

/// Mean of Gamma(k, θ): `k θ`.
pub fn gamma_mean(shape: f64, scale: f64) -> f64 {
    if shape <= 0.0 || scale <= 0.0 {
        return f64::NAN;
    }
    shape * scale
}

/// Variance of Gamma(k, θ): `k θ²`.
pub fn gamma_var(shape: f64, scale: f64) -> f64 {
    if shape <= 0.0 || scale <= 0.0 {
        return f64::NAN;
    }
    shape * scale * scale
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
    fn exponential_special_case() {
        // Gamma(1, θ) is Exponential(1/θ): f(y) = e^(-y/θ) / θ
        let scale: f64 = 2.0;
        for y in [0.1f64, 1.0, 4.5] {
            let expected = (-y / scale).exp() / scale;
            assert!(approx_eq(gamma_pdf(y, 1.0, scale), expected, 1e-12));
        }
        assert!(approx_eq(gamma_log_pdf(0.0, 1.0, scale), -scale.ln(), 1e-12));
    }

    #[test]
    fn known_density_value() {
        // Gamma(2, 3) at y=3: 3 * e^-1 / (Γ(2) * 9) = e^-1 / 3
        let expected = (-1.0f64).exp() / 3.0;
        assert!(approx_eq(gamma_pdf(3.0, 2.0, 3.0), expected, 1e-12));
    }

    #[test]
    fn rate_and_scale_agree() {
        let a = gamma_log_pdf(1.7, 2.5, 0.5);
        let b = gamma_log_pdf_rate(1.7, 2.5, 2.0);
        assert!(approx_eq(a, b, 1e-12));
    }

    #[test]
    fn boundary_values() {
        assert_eq!(gamma_log_pdf(-1.0, 2.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(gamma_log_pdf(0.0, 0.5, 1.0), f64::INFINITY);
        assert_eq!(gamma_log_pdf(0.0, 3.0, 1.0), f64::NEG_INFINITY);
        assert!(gamma_log_pdf(1.0, 0.0, 1.0).is_nan());
        assert!(gamma_log_pdf(1.0, 1.0, -1.0).is_nan());
        assert!(gamma_log_pdf(f64::NAN, 1.0, 1.0).is_nan());
        assert_eq!(gamma_pdf(-1.0, 2.0, 1.0), 0.0);
    }

    #[test]
    fn moments() {
        assert!(approx_eq(gamma_mean(2.0, 3.0), 6.0, 1e-15));
        assert!(approx_eq(gamma_var(2.0, 3.0), 18.0, 1e-15));
        assert!(gamma_mean(0.0, 3.0).is_nan());
    }
}
