//! Property-based tests for ds-math likelihood kernels.
//!
//! Uses proptest to check invariants the relevance engine relies on: finite
//! losses under clamping, closed-form expectations, and symmetry.

use ds_math::bernoulli_gamma::{self, BernoulliGammaParams};
use ds_math::normal::{self, GaussianParams};
use ds_math::{clamp_probability, gamma_log_pdf, log_gamma, sigmoid, DEFAULT_EPSILON};
use proptest::prelude::*;

const TOL: f64 = 1e-10;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any probability in [0, 1] yields a finite Bernoulli-Gamma loss.
    #[test]
    fn bernoulli_gamma_nll_finite(
        p in 0.0..=1.0f64,
        shape in 0.0..20.0f64,
        scale in 0.0..20.0f64,
        y in 0.0..100.0f64,
    ) {
        let params = BernoulliGammaParams::new(p, shape, scale);
        let out = bernoulli_gamma::nll(y, &params, 0.0, DEFAULT_EPSILON);
        prop_assert!(out.is_finite(), "nll({}, {:?}) = {}", y, params, out);
    }

    /// The dry-day loss depends only on p.
    #[test]
    fn dry_day_ignores_amount_params(
        p in 0.01..0.99f64,
        shape_a in 0.1..10.0f64,
        shape_b in 0.1..10.0f64,
        scale in 0.1..10.0f64,
    ) {
        let dry = |shape| {
            let params = BernoulliGammaParams::new(p, shape, scale);
            bernoulli_gamma::nll(0.0, &params, 0.0, DEFAULT_EPSILON)
        };
        let (a, b) = (dry(shape_a), dry(shape_b));
        prop_assert!(approx_eq(a, b, TOL));
    }

    /// E[y] = p * shape * scale.
    #[test]
    fn bernoulli_gamma_mean_closed_form(
        p in 0.0..=1.0f64,
        shape in 0.1..10.0f64,
        scale in 0.1..10.0f64,
    ) {
        let params = BernoulliGammaParams::new(p, shape, scale);
        prop_assert!(approx_eq(params.mean(), p * shape * scale, TOL));
    }

    /// Gaussian loss is symmetric about the mean.
    #[test]
    fn gaussian_nll_symmetric(
        mean in -50.0..50.0f64,
        log_scale in -3.0..3.0f64,
        d in 0.0..20.0f64,
    ) {
        let params = GaussianParams::new(mean, log_scale);
        let up = normal::nll(mean + d, &params, DEFAULT_EPSILON);
        let down = normal::nll(mean - d, &params, DEFAULT_EPSILON);
        prop_assert!(approx_eq(up, down, 1e-8), "{} vs {}", up, down);
    }

    /// Gaussian loss is minimized at the mean.
    #[test]
    fn gaussian_nll_minimized_at_mean(
        mean in -50.0..50.0f64,
        log_scale in -3.0..3.0f64,
        y in -100.0..100.0f64,
    ) {
        let params = GaussianParams::new(mean, log_scale);
        let at_mean = normal::nll(mean, &params, DEFAULT_EPSILON);
        prop_assert!(normal::nll(y, &params, DEFAULT_EPSILON) >= at_mean - TOL);
    }

    /// Clamped probabilities stay in [eps, 1 - eps].
    #[test]
    fn clamp_probability_in_range(p in -10.0..10.0f64, eps in 1e-12..0.1f64) {
        let c = clamp_probability(p, eps);
        prop_assert!(c >= eps && c <= 1.0 - eps);
    }

    /// sigmoid(x) + sigmoid(-x) = 1.
    #[test]
    fn sigmoid_complement(x in -700.0..700.0f64) {
        prop_assert!(approx_eq(sigmoid(x) + sigmoid(-x), 1.0, 1e-12));
    }

    /// Gamma recurrence: lnΓ(z+1) = ln z + lnΓ(z).
    #[test]
    fn log_gamma_recurrence(z in 0.1..50.0f64) {
        prop_assert!(approx_eq(log_gamma(z + 1.0), z.ln() + log_gamma(z), 1e-8));
    }

    /// Gamma density with shape 1 is the exponential density.
    #[test]
    fn gamma_shape_one_is_exponential(y in 0.01..50.0f64, scale in 0.1..10.0f64) {
        let expected = -y / scale - scale.ln();
        prop_assert!(approx_eq(gamma_log_pdf(y, 1.0, scale), expected, 1e-9));
    }
}
