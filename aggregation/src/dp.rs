//! Laplace mechanism.

use rand::distributions::Open01;
use rand::Rng;

/// z-score of a two-sided 95% interval.
const Z_95: f64 = 1.96;

/// One draw from Laplace(0, `scale`) by inverse CDF over `u ~ U(-0.5, 0.5)`.
pub fn laplace_noise<R: Rng + ?Sized>(scale: f64, rng: &mut R) -> f64 {
    // Open01 excludes both endpoints, so 1 - 2|u| > 0 and the log is finite.
    let u: f64 = rng.sample::<f64, _>(Open01) - 0.5;
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
}

/// Half width of the 95% confidence interval reported with each release: `1.96·√2/ε`.
pub fn confidence_half_width(epsilon: f64) -> f64 {
    Z_95 * std::f64::consts::SQRT_2 / epsilon
}

pub fn validate_epsilon(epsilon: f64) -> bool {
    epsilon.is_finite() && epsilon > 0.0
}
