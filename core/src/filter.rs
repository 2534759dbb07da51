//! The particle filter: prediction, update, and estimation over an owned cloud.
//!
//! [`ParticleFilter`] is the stateful entry point. It composes a
//! [`ParticlePredictor`] with any [`ParticleUpdate`] implementation, owns a
//! seeded random source, and replaces its cloud on every step.
//!
//! [`run_cycle`] is the stateless equivalent for landmark-range tracking
//! with a fixed noise [`Model`]: every argument is explicit and nothing
//! survives the call.
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::BayesFilter;
use crate::evaluator::{Evaluation, EvaluationModel, ParticleEvaluator};
use crate::models::{
    BrownianMotionModel, LandmarkObservation, MotionModel, ProcessNoise, TranslationMotionModel,
    ZeroMotionModel,
};
use crate::particle::{AveragingStrategy, ParticleEstimate, StateEstimate};
use crate::predictor::ParticlePredictor;
use crate::resampler::ParticleResampler;
use crate::updater::ParticleUpdate;
use crate::weighter::ParticleWeighter;

/// Result of one full filter cycle.
#[derive(Clone, Debug)]
pub struct FilterOutput {
    pub state: StateEstimate,
    pub particles: ParticleEstimate,
    pub evaluation: Evaluation,
}

pub struct ParticleFilter<M, U> {
    particles: ParticleEstimate,
    pub predictor: ParticlePredictor<M>,
    pub updater: U,
    pub averaging_strategy: AveragingStrategy,
    rng: StdRng,
}

impl<M: MotionModel, U: ParticleUpdate> ParticleFilter<M, U> {
    /// Filter seeded from system entropy.
    pub fn new(particles: ParticleEstimate, motion: M, updater: U) -> Self {
        Self::new_with_seed(particles, motion, updater, rand::random())
    }

    pub fn new_with_seed(particles: ParticleEstimate, motion: M, updater: U, seed: u64) -> Self {
        ParticleFilter {
            particles,
            predictor: ParticlePredictor::new(motion),
            updater,
            averaging_strategy: AveragingStrategy::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_averaging(mut self, strategy: AveragingStrategy) -> Self {
        self.averaging_strategy = strategy;
        self
    }

    pub fn particles(&self) -> &ParticleEstimate {
        &self.particles
    }

    /// Replace the cloud, e.g. to re-initialise after a reset.
    pub fn set_particles(&mut self, particles: ParticleEstimate) {
        self.particles = particles;
    }

    pub fn estimate(&self) -> StateEstimate {
        self.averaging_strategy.estimate(&self.particles)
    }

    /// Predict with `control`, fuse `observations`, and report the new estimate.
    pub fn filter(
        &mut self,
        control: Option<&DVector<f64>>,
        observations: &[U::Observation],
    ) -> FilterOutput {
        BayesFilter::predict(self, control);
        let evaluation = BayesFilter::batch_update(self, observations);
        FilterOutput {
            state: self.estimate(),
            particles: self.particles.clone(),
            evaluation,
        }
    }
}

impl<M: MotionModel, U: ParticleUpdate> BayesFilter for ParticleFilter<M, U> {
    type Observation = U::Observation;

    fn predict(&mut self, control: Option<&DVector<f64>>) {
        self.particles = self
            .predictor
            .predict_with(&self.particles, control, &mut self.rng);
    }

    fn update(&mut self, observation: &U::Observation) -> Evaluation {
        self.batch_update(std::slice::from_ref(observation))
    }

    fn batch_update(&mut self, observations: &[U::Observation]) -> Evaluation {
        let (particles, evaluation) =
            self.updater
                .batch_update(&self.particles, observations, &mut self.rng);
        self.particles = particles;
        evaluation
    }

    fn get_estimate(&self) -> DVector<f64> {
        self.estimate().mean
    }

    fn get_certainty(&self) -> DMatrix<f64> {
        let mean = self.get_estimate();
        let weighted = !matches!(self.averaging_strategy, AveragingStrategy::UnweightedAverage);
        self.particles.covariance(&mean, weighted)
    }
}

// ============= Stateless cycle ===================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct MotionNoise {
    /// Per-dimension process noise standard deviation.
    pub std_deviation: DVector<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationNoise {
    pub std_deviation: f64,
}

/// Noise and resampling parameters for [`run_cycle`].
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub motion: MotionNoise,
    pub observation: ObservationNoise,
    pub evaluation: EvaluationModel,
}

impl Model {
    pub fn new(motion_std: DVector<f64>, observation_std: f64, evaluation: EvaluationModel) -> Self {
        Model {
            motion: MotionNoise {
                std_deviation: motion_std,
            },
            observation: ObservationNoise {
                std_deviation: observation_std,
            },
            evaluation,
        }
    }
}

/// One predict/weight/evaluate/resample pass without any retained state.
///
/// Particles move by `control` (when given) plus Brownian noise, are weighted
/// by their range to each observed landmark, and are resampled by stochastic
/// universal sampling when impoverished.
pub fn run_cycle<R: Rng + ?Sized>(
    particles: &ParticleEstimate,
    observations: &[LandmarkObservation],
    model: &Model,
    control: Option<&DVector<f64>>,
    rng: &mut R,
) -> (ParticleEstimate, Evaluation) {
    let noise = ProcessNoise::StdDev(model.motion.std_deviation.clone());
    let predicted = match control {
        Some(u) => ParticlePredictor::new(BrownianMotionModel::new(
            TranslationMotionModel::new(u.len()),
            noise,
        ))
        .predict_with(particles, Some(u), rng),
        None => ParticlePredictor::new(BrownianMotionModel::new(ZeroMotionModel, noise))
            .predict_with(particles, None, rng),
    };
    trace!("stateless cycle over {} landmark observations", observations.len());

    let models: Vec<_> = observations.iter().map(|o| o.landmark.range_model()).collect();
    let values: Vec<DVector<f64>> = observations
        .iter()
        .map(|o| DVector::from_element(1, o.measurement))
        .collect();
    let pairs: Vec<_> = models.iter().zip(values.iter()).collect();
    let weighted = ParticleWeighter::new(model.observation.std_deviation).weight(&predicted, &pairs);

    let evaluation = ParticleEvaluator::new(model.evaluation).evaluate(&weighted);
    if evaluation.is_impoverished() {
        debug!("stateless cycle resampling {} particles", weighted.len());
        (ParticleResampler::default().resample_with(&weighted, rng), evaluation)
    } else {
        (weighted, evaluation)
    }
}
