//! Random-variate primitives for particle propagation and resampling.
//!
//! Every routine in this crate that consumes randomness is generic over a
//! [`rand::Rng`] passed by mutable reference. A seeded [`rand::rngs::StdRng`]
//! gives reproducible runs; `rand::rng()` draws from process-wide entropy.
//!
//! Gaussian variates are produced with a three-draw Box–Muller transform:
//!
//! $$
//! z = \sqrt{-2 \ln a} \cdot \begin{cases} \sin(2 \pi b) & c < 0.5 \\\\ \cos(2 \pi b) & c \geq 0.5 \end{cases}
//! $$
//!
//! where $a$, $b$, $c$ are independent uniform draws. The radius draw is taken
//! from $(0, 1]$ so that $\ln a$ is always finite.

use std::ops::Range;

use nalgebra::DVector;
use rand::{Rng, RngCore};
use rand_distr::Distribution;

/// Uniform draw from `[0, 1)`.
#[inline]
pub fn uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random::<f64>()
}

/// Uniform draw from `range.start .. range.end`.
///
/// An empty range (`start == end`) always yields `start`.
pub fn uniform_in<R: Rng + ?Sized>(rng: &mut R, range: Range<f64>) -> f64 {
    let width = range.end - range.start;
    range.start + width * uniform(rng)
}

/// Gaussian distribution sampled through the Box–Muller transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxMuller {
    pub mean: f64,
    pub std_dev: f64,
}

impl Default for BoxMuller {
    fn default() -> Self {
        BoxMuller::standard()
    }
}

impl BoxMuller {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        assert!(
            std_dev >= 0.0 && std_dev.is_finite(),
            "BoxMuller: standard deviation must be finite and non-negative, got {std_dev}"
        );
        BoxMuller { mean, std_dev }
    }

    /// Zero mean, unit standard deviation.
    pub fn standard() -> Self {
        BoxMuller {
            mean: 0.0,
            std_dev: 1.0,
        }
    }

    /// Map three uniform draws onto a standard normal variate.
    ///
    /// `a` is expected in `(0, 1]`, `b` and `c` in `[0, 1]`.
    pub fn transform(a: f64, b: f64, c: f64) -> f64 {
        debug_assert!(a > 0.0 && a <= 1.0);
        let radius = (-2.0 * a.ln()).abs().sqrt();
        let angle = 2.0 * std::f64::consts::PI * b;
        if c < 0.5 {
            radius * angle.sin()
        } else {
            radius * angle.cos()
        }
    }
}

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let a = 1.0 - uniform(rng);
        let b = uniform(rng);
        let c = uniform(rng);
        self.mean + self.std_dev * BoxMuller::transform(a, b, c)
    }
}

/// Draw an `n`-vector of independent standard normal variates.
pub fn standard_normal_vector<R: Rng + ?Sized>(rng: &mut R, n: usize) -> DVector<f64> {
    let normal = BoxMuller::standard();
    DVector::from_fn(n, |_, _| normal.sample(rng))
}

/// A random source that repeats a single uniform draw forever.
///
/// Useful for pinning the resampling offset or for ablating noise when a
/// particular code path has to be reproduced exactly. Every call to
/// [`uniform`] on this source returns `u` truncated to 53 bits.
#[derive(Clone, Copy, Debug)]
pub struct FixedUniform {
    bits: u64,
}

impl FixedUniform {
    pub fn new(u: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&u),
            "FixedUniform: draw must lie in [0, 1), got {u}"
        );
        let mantissa = (u * (1u64 << 53) as f64) as u64;
        FixedUniform {
            bits: mantissa << 11,
        }
    }
}

impl RngCore for FixedUniform {
    fn next_u32(&mut self) -> u32 {
        (self.bits >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.bits
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let bytes = self.bits.to_le_bytes();
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = bytes[i % bytes.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let u = uniform(&mut rng);
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn uniform_in_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let u = uniform_in(&mut rng, -2.0..3.0);
            assert!((-2.0..3.0).contains(&u));
        }
        assert_eq!(uniform_in(&mut rng, 1.5..1.5), 1.5);
    }

    #[test]
    fn fixed_uniform_repeats_its_draw() {
        let mut rng = FixedUniform::new(0.5);
        assert_eq!(uniform(&mut rng), 0.5);
        assert_eq!(uniform(&mut rng), 0.5);
        let mut rng = FixedUniform::new(0.1);
        assert_approx_eq!(uniform(&mut rng), 0.1, 1e-15);
    }

    #[test]
    #[should_panic(expected = "draw must lie in [0, 1)")]
    fn fixed_uniform_rejects_one() {
        let _ = FixedUniform::new(1.0);
    }

    #[test]
    fn box_muller_transform_known_values() {
        // a = e^{-1/2} gives a unit radius.
        let a = (-0.5_f64).exp();
        assert_approx_eq!(BoxMuller::transform(a, 0.25, 0.0), 1.0, 1e-12);
        assert_approx_eq!(BoxMuller::transform(a, 0.0, 0.9), 1.0, 1e-12);
        assert_approx_eq!(BoxMuller::transform(a, 0.5, 0.9), -1.0, 1e-12);
        assert_approx_eq!(BoxMuller::transform(1.0, 0.3, 0.2), 0.0, 1e-12);
    }

    #[test]
    fn box_muller_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let normal = BoxMuller::new(3.0, 2.0);
        let n = 200_000;
        let samples: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert_approx_eq!(mean, 3.0, 0.05);
        assert_approx_eq!(var, 4.0, 0.1);
    }

    #[test]
    fn box_muller_zero_std_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let normal = BoxMuller::new(1.25, 0.0);
        for _ in 0..100 {
            assert_eq!(normal.sample(&mut rng), 1.25);
        }
    }

    #[test]
    fn standard_normal_vector_has_requested_dimension() {
        let mut rng = StdRng::seed_from_u64(3);
        let v = standard_normal_vector(&mut rng, 5);
        assert_eq!(v.len(), 5);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn seeded_sources_are_reproducible() {
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);
        let normal = BoxMuller::standard();
        for _ in 0..50 {
            assert_eq!(normal.sample(&mut a), normal.sample(&mut b));
        }
    }
}
