//! Resampling stage: redraw an equally weighted cloud from a weighted one.
//!
//! Both strategies keep the particle count, reset every weight to `1/n`, and
//! emit survivors in their original order.
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::particle::ParticleEstimate;
use crate::sampling::uniform;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Low-variance sampling with one offset and `n` evenly spaced pointers.
    #[default]
    StochasticUniversal,
    /// `floor(n·wᵢ)` deterministic copies; the remainder by stochastic universal sampling over residuals.
    Residual,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticleResampler {
    pub strategy: ResamplingStrategy,
}

impl ParticleResampler {
    pub fn new(strategy: ResamplingStrategy) -> Self {
        ParticleResampler { strategy }
    }

    /// Resample using the process-wide random source.
    pub fn resample(&self, particles: &ParticleEstimate) -> ParticleEstimate {
        self.resample_with(particles, &mut rand::rng())
    }

    pub fn resample_with<R: Rng + ?Sized>(
        &self,
        particles: &ParticleEstimate,
        rng: &mut R,
    ) -> ParticleEstimate {
        let total = particles.total_weight();
        if !(total > 0.0 && total.is_finite()) {
            warn!(
                "cannot resample {} particles with total weight {}; resetting to uniform weights",
                particles.len(),
                total
            );
            return ParticleEstimate::new(particles.states().to_vec(), None);
        }
        let indices = match self.strategy {
            ResamplingStrategy::StochasticUniversal => {
                stochastic_universal_indices(particles.weights(), particles.len(), uniform(rng))
            }
            ResamplingStrategy::Residual => residual_indices(particles.weights(), total, rng),
        };
        debug!(
            "{:?} resampling kept {} distinct of {} particles",
            self.strategy,
            count_distinct(&indices),
            particles.len()
        );
        let states = indices
            .into_iter()
            .map(|i| particles.states()[i].clone())
            .collect();
        ParticleEstimate::new(states, None)
    }
}

/// Pick `count` indices from `weights` with evenly spaced pointers.
///
/// `u ∈ [0, 1)` positions the first pointer inside the first stride. The
/// walking index never passes the last particle, even when rounding leaves
/// the cumulative weight short of the final pointer.
pub(crate) fn stochastic_universal_indices(weights: &[f64], count: usize, u: f64) -> Vec<usize> {
    assert!(!weights.is_empty(), "Number of particles must be positive");
    let total: f64 = weights.iter().sum();
    let stride = total / count as f64;
    let offset = u * stride;
    let last = weights.len() - 1;
    let mut index = 0;
    let mut cursor = weights[0];
    (0..count)
        .map(|m| {
            let sample = offset + m as f64 * stride;
            while cursor < sample && index < last {
                index += 1;
                cursor += weights[index];
            }
            index
        })
        .collect()
}

fn residual_indices<R: Rng + ?Sized>(weights: &[f64], total: f64, rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let scaled: Vec<f64> = weights.iter().map(|w| w / total * n as f64).collect();
    let mut indices = Vec::with_capacity(n);
    let mut residual = Vec::with_capacity(n);
    for (i, s) in scaled.iter().enumerate() {
        let copies = (s.floor() as usize).min(n - indices.len());
        indices.extend(std::iter::repeat_n(i, copies));
        residual.push(s - copies as f64);
    }
    let remaining = n - indices.len();
    if remaining > 0 {
        let residual_total: f64 = residual.iter().sum();
        let source = if residual_total > 0.0 { &residual } else { &scaled };
        let u = uniform(rng);
        indices.extend(stochastic_universal_indices(source, remaining, u));
        indices.sort_unstable();
    }
    indices
}

fn count_distinct(sorted: &[usize]) -> usize {
    let mut distinct = 0;
    let mut previous = None;
    for &i in sorted {
        if previous != Some(i) {
            distinct += 1;
            previous = Some(i);
        }
    }
    distinct
}
