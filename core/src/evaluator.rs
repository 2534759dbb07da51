//! Degeneracy detection through the normalised effective sample size.
use std::fmt::{self, Display};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::EPSILON;
use crate::particle::ParticleEstimate;

/// Resampling trigger configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationModel {
    /// Normalised effective sample size at or below which the cloud is impoverished. In `(0, 1]`.
    pub threshold: f64,
}

impl Default for EvaluationModel {
    fn default() -> Self {
        EvaluationModel { threshold: 0.5 }
    }
}

impl EvaluationModel {
    pub fn new(threshold: f64) -> Self {
        assert!(
            threshold > 0.0 && threshold <= 1.0,
            "Evaluation threshold must lie in (0, 1], got {threshold}"
        );
        EvaluationModel { threshold }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Evaluation {
    Healthy,
    Impoverished,
}

impl Evaluation {
    pub fn is_impoverished(&self) -> bool {
        matches!(self, Evaluation::Impoverished)
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Healthy => write!(f, "healthy"),
            Evaluation::Impoverished => write!(f, "impoverished"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleEvaluator {
    pub model: EvaluationModel,
}

impl ParticleEvaluator {
    pub fn new(model: EvaluationModel) -> Self {
        ParticleEvaluator { model }
    }

    /// `(Σw)² / (Σw² + ε) / n`
    pub fn normalized_effective_sample_size(particles: &ParticleEstimate) -> f64 {
        let total: f64 = particles.total_weight();
        let squared: f64 = particles.weights().iter().map(|w| w * w).sum();
        let effective = total * total / (squared + EPSILON);
        effective / particles.len() as f64
    }

    pub fn evaluate(&self, particles: &ParticleEstimate) -> Evaluation {
        let neff = Self::normalized_effective_sample_size(particles);
        let evaluation = if neff > self.model.threshold {
            Evaluation::Healthy
        } else {
            Evaluation::Impoverished
        };
        debug!(
            "normalized effective sample size {:.4} against threshold {:.4}: {}",
            neff, self.model.threshold, evaluation
        );
        evaluation
    }
}
