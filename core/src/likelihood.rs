//! Closed-form normal CDF approximation used to score observation residuals.
//!
//! The approximation is
//!
//! $$
//! \Phi(x) \approx \frac{1}{2}\left(1 + \operatorname{sgn}(x - \mu)\right) \sqrt{1 - \exp\left(-\frac{2}{\pi} \frac{(x - \mu)^2}{\sigma^2 + \epsilon}\right)}
//! $$
//!
//! It is not the exact error-function CDF. Observation standard deviations
//! and resampling thresholds in this crate are calibrated against this shape.

use crate::EPSILON;

/// Sign of `value` as `-1.0`, `0.0` or `1.0`. Unlike [`f64::signum`], zero maps to zero.
#[inline]
fn sign(value: f64) -> f64 {
    let positive = if value > 0.0 { 1.0 } else { 0.0 };
    let negative = if value < 0.0 { 1.0 } else { 0.0 };
    positive - negative
}

/// Approximate normal cumulative distribution function.
///
/// # Arguments
/// * `mean` - mean of the distribution
/// * `variance` - variance of the distribution (an epsilon is added internally)
/// * `value` - point at which to evaluate
///
/// # Returns
/// A probability in `[0, 1]`.
pub fn normal_cdf(mean: f64, variance: f64, value: f64) -> f64 {
    let variance = variance + EPSILON;
    let delta = value - mean;
    let base = 0.5 * (1.0 + sign(delta));
    let exponent = -((2.0 / std::f64::consts::PI) * (delta * delta) / variance);
    base * (1.0 - exponent.exp()).sqrt()
}

/// Likelihood factor for a non-negative observation residual.
///
/// Returns `1 - normal_cdf(0, std_dev², residual)`: one for a perfect match,
/// decaying towards zero as the residual grows relative to `std_dev`.
#[inline]
pub fn residual_likelihood(residual: f64, std_dev: f64) -> f64 {
    1.0 - normal_cdf(0.0, std_dev * std_dev, residual)
}
