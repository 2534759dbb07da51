//! Sequential Monte Carlo (particle filter) toolbox for state estimation
//!
//! This crate estimates the hidden state of a dynamical process from noisy control inputs and noisy
//! observations. A belief over the state is represented by a weighted cloud of hypotheses ("particles")
//! which is propagated through a motion model, reweighted against one or more observation models,
//! checked for degeneracy, and resampled when impoverished. It is intended for problems where the
//! state transition or observation relationship is non-linear or non-Gaussian and closed-form
//! Kalman-family filters are inadequate.
//!
//! This crate is primarily built off of two additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the state, control, and observation vector types.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provide
//!   the random sources. Every stochastic operation accepts an explicit `Rng` so seeded runs are reproducible.
//!
//! ## Crate overview
//!
//! - [linalg]: Dimension-checked vector helpers and covariance square roots.
//! - [sampling]: Uniform and Box–Muller Gaussian variates over an injectable random source.
//! - [likelihood]: Closed-form normal CDF approximation used to score residuals.
//! - [models]: Motion and observation model traits plus concrete variants.
//! - [particle]: The immutable weighted particle cloud and its statistics.
//! - [predictor], [weighter], [evaluator], [resampler]: The four stages of a filter step.
//! - [updater]: Single and multi-modal measurement updaters composing weighting, evaluation, and resampling.
//! - [filter]: The stateful [`filter::ParticleFilter`] and the stateless [`filter::run_cycle`].
//! - [config]: Serializable filter configuration.
//! - [sim]: Signal generation, trajectory similarity, and canned tracking scenarios.
//!
//! ## Filter step
//!
//! Each step runs Predictor → Weighter → Evaluator → (conditionally) Resampler. With particles
//! $x_i$ and weights $w_i$, the evaluator computes the normalized effective sample size
//!
//! $$
//! \hat N_{eff} = \frac{1}{n} \frac{\left(\sum_i w_i\right)^2}{\sum_i w_i^2 + \epsilon}
//! $$
//!
//! and the cloud is resampled whenever $\hat N_{eff}$ does not exceed the configured threshold.
pub mod config;
pub mod evaluator;
pub mod filter;
pub mod likelihood;
pub mod linalg;
pub mod models;
pub mod particle;
pub mod predictor;
pub mod resampler;
pub mod sampling;
pub mod sim;
pub mod updater;
pub mod weighter;

use nalgebra::{DMatrix, DVector};

pub use crate::evaluator::{Evaluation, EvaluationModel, ParticleEvaluator};
pub use crate::filter::{FilterOutput, ParticleFilter, run_cycle};
pub use crate::particle::{AveragingStrategy, Particle, ParticleEstimate, StateEstimate};
pub use crate::predictor::ParticlePredictor;
pub use crate::resampler::{ParticleResampler, ResamplingStrategy};
pub use crate::updater::{MultiModal, MultiModalParticleUpdater, ParticleUpdate, ParticleUpdater};
pub use crate::weighter::ParticleWeighter;

/// Guard added to denominators that may vanish (CDF variance, weight sums, `Σw²`).
pub const EPSILON: f64 = 1e-6;

/// Generic recursive Bayesian filter trait.
pub trait BayesFilter {
    type Observation;
    fn predict(&mut self, control: Option<&DVector<f64>>);
    fn update(&mut self, observation: &Self::Observation) -> Evaluation;
    fn batch_update(&mut self, observations: &[Self::Observation]) -> Evaluation;
    fn get_estimate(&self) -> DVector<f64>;
    fn get_certainty(&self) -> DMatrix<f64>;
}
