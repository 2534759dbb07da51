//! Weighted particle clouds and the statistics derived from them.
//!
//! A [`ParticleEstimate`] is an immutable, non-empty sequence of
//! `(state, weight)` pairs stored as parallel arrays. Every filter stage
//! consumes one cloud and produces a new one; derived statistics are
//! recomputed on request rather than cached.
use std::fmt::{self, Debug, Display};

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::ProcessNoise;

#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub state: DVector<f64>,
    pub weight: f64,
}

impl Particle {
    pub fn new(state: DVector<f64>, weight: f64) -> Particle {
        Particle { state, weight }
    }
    pub fn with_state(&self, state: DVector<f64>) -> Particle {
        Particle::new(state, self.weight)
    }
    pub fn with_weight(&self, weight: f64) -> Particle {
        Particle::new(self.state.clone(), weight)
    }
}

impl From<(DVector<f64>, f64)> for Particle {
    fn from(tuple: (DVector<f64>, f64)) -> Self {
        let (state, weight) = tuple;
        Particle::new(state, weight)
    }
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("state", &self.state.as_slice())
            .field("weight", &self.weight)
            .finish()
    }
}

/// How a single state estimate is derived from a particle cloud.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragingStrategy {
    #[default]
    WeightedAverage,
    UnweightedAverage,
    HighestWeight,
}

impl AveragingStrategy {
    pub fn estimate(&self, particles: &ParticleEstimate) -> StateEstimate {
        let mean = match self {
            AveragingStrategy::WeightedAverage => particles.mean(true),
            AveragingStrategy::UnweightedAverage => particles.mean(false),
            AveragingStrategy::HighestWeight => particles.highest_weight().state,
        };
        let weighted = !matches!(self, AveragingStrategy::UnweightedAverage);
        let variance = particles.variance(&mean, weighted);
        StateEstimate { mean, variance }
    }
}

/// Point estimate with per-dimension variance.
#[derive(Clone, Debug, PartialEq)]
pub struct StateEstimate {
    pub mean: DVector<f64>,
    pub variance: DVector<f64>,
}

/// An immutable weighted particle cloud.
///
/// Invariants upheld by every constructor: at least one particle, all states
/// share one dimension, and every weight is non-negative.
#[derive(Clone, PartialEq)]
pub struct ParticleEstimate {
    states: Vec<DVector<f64>>,
    weights: Vec<f64>,
}

impl ParticleEstimate {
    /// Build a cloud from states and optional weights. Missing weights default to `1/n`.
    pub fn new(states: Vec<DVector<f64>>, weights: Option<Vec<f64>>) -> ParticleEstimate {
        assert!(!states.is_empty(), "Number of particles must be positive");
        let dimension = states[0].len();
        assert!(dimension > 0, "Particle state dimension must be positive");
        assert!(
            states.iter().all(|s| s.len() == dimension),
            "All particle states must share dimension {dimension}"
        );
        let n = states.len();
        let weights = weights.unwrap_or_else(|| vec![1.0 / n as f64; n]);
        assert_eq!(
            weights.len(),
            n,
            "Number of weights must match number of particles"
        );
        assert!(
            weights.iter().all(|w| *w >= 0.0),
            "Particle weights must be non-negative"
        );
        ParticleEstimate { states, weights }
    }

    pub fn from_particles(particles: Vec<Particle>) -> ParticleEstimate {
        let (states, weights) = particles.into_iter().map(|p| (p.state, p.weight)).unzip();
        ParticleEstimate::new(states, Some(weights))
    }

    /// `n` copies of `state`, uniformly weighted.
    pub fn uniform(state: &DVector<f64>, n: usize) -> ParticleEstimate {
        ParticleEstimate::new(vec![state.clone(); n], None)
    }

    /// `n` uniformly weighted draws of `mean + noise`.
    pub fn from_prior<R: Rng + ?Sized>(
        mean: &DVector<f64>,
        noise: &ProcessNoise,
        n: usize,
        rng: &mut R,
    ) -> ParticleEstimate {
        assert_eq!(
            mean.len(),
            noise.dimension(),
            "Prior noise dimension must match the prior mean"
        );
        let states = (0..n).map(|_| mean + noise.sample(rng)).collect();
        ParticleEstimate::new(states, None)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false; kept for parity with `len`.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.states[0].len()
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn get(&self, index: usize) -> Particle {
        Particle::new(self.states[index].clone(), self.weights[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = Particle> + '_ {
        self.states
            .iter()
            .zip(self.weights.iter())
            .map(|(s, w)| Particle::new(s.clone(), *w))
    }

    pub fn into_parts(self) -> (Vec<DVector<f64>>, Vec<f64>) {
        (self.states, self.weights)
    }

    /// Same states with replacement weights.
    pub fn with_weights(&self, weights: Vec<f64>) -> ParticleEstimate {
        ParticleEstimate::new(self.states.clone(), Some(weights))
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Weights rescaled to sum to one; uniform when the total is not positive.
    pub fn normalized(&self) -> ParticleEstimate {
        let total = self.total_weight();
        if total > 0.0 && total.is_finite() {
            self.with_weights(self.weights.iter().map(|w| w / total).collect())
        } else {
            ParticleEstimate::new(self.states.clone(), None)
        }
    }

    fn normalizing_weights(&self, weighted: bool) -> (Vec<f64>, f64) {
        let n = self.len() as f64;
        if weighted {
            let total = self.total_weight();
            if total > 0.0 && total.is_finite() {
                return (self.weights.clone(), total);
            }
        }
        (vec![1.0 / n; self.len()], 1.0)
    }

    /// `Σ wᵢ xᵢ / Σ wᵢ`, or the arithmetic mean when `weighted` is false.
    ///
    /// A weighted mean of a cloud whose weights sum to zero falls back to the
    /// arithmetic mean.
    pub fn mean(&self, weighted: bool) -> DVector<f64> {
        let (weights, total) = self.normalizing_weights(weighted);
        let mut mean = DVector::zeros(self.dimension());
        for (state, w) in self.states.iter().zip(weights.iter()) {
            mean.axpy(*w, state, 1.0);
        }
        mean / total
    }

    /// Per-dimension variance about `around`.
    pub fn variance(&self, around: &DVector<f64>, weighted: bool) -> DVector<f64> {
        assert_eq!(
            around.len(),
            self.dimension(),
            "variance: reference point dimension mismatch"
        );
        let (weights, total) = self.normalizing_weights(weighted);
        let mut variance = DVector::zeros(self.dimension());
        for (state, w) in self.states.iter().zip(weights.iter()) {
            let delta = state - around;
            variance.axpy(*w, &delta.component_mul(&delta), 1.0);
        }
        variance / total
    }

    /// Full covariance about `around`.
    pub fn covariance(&self, around: &DVector<f64>, weighted: bool) -> DMatrix<f64> {
        assert_eq!(
            around.len(),
            self.dimension(),
            "covariance: reference point dimension mismatch"
        );
        let (weights, total) = self.normalizing_weights(weighted);
        let n = self.dimension();
        let mut covariance = DMatrix::zeros(n, n);
        for (state, w) in self.states.iter().zip(weights.iter()) {
            let delta = state - around;
            covariance += (&delta * delta.transpose()) * *w;
        }
        covariance / total
    }

    /// Scalar sample variance of the distance to `around`: `Σ ‖xᵢ − around‖² / (n − 1 + 1e-4)`.
    pub fn spread(&self, around: &DVector<f64>) -> f64 {
        assert_eq!(
            around.len(),
            self.dimension(),
            "spread: reference point dimension mismatch"
        );
        let sum: f64 = self
            .states
            .iter()
            .map(|s| (s - around).norm_squared())
            .sum();
        sum / (self.len() as f64 - 1.0 + 1e-4)
    }

    /// The particle carrying the largest weight. Ties resolve to the lowest index.
    pub fn highest_weight(&self) -> Particle {
        let mut best = 0;
        for (i, w) in self.weights.iter().enumerate() {
            if *w > self.weights[best] {
                best = i;
            }
        }
        self.get(best)
    }

    /// `(Σw)² / Σw²`. Zero for an all-zero cloud.
    pub fn effective_particles(&self) -> f64 {
        let total = self.total_weight();
        let squared: f64 = self.weights.iter().map(|w| w * w).sum();
        if squared > 0.0 {
            total * total / squared
        } else {
            0.0
        }
    }
}

impl FromIterator<Particle> for ParticleEstimate {
    fn from_iter<I: IntoIterator<Item = Particle>>(iter: I) -> Self {
        ParticleEstimate::from_particles(iter.into_iter().collect())
    }
}

impl Debug for ParticleEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        f.debug_struct("ParticleEstimate")
            .field("num_particles", &self.len())
            .field("dimension", &self.dimension())
            .field("effective_particles", &self.effective_particles())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("mean", &self.mean(true).as_slice())
            .finish()
    }
}
