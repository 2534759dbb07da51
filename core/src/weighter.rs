//! Weighting stage: score every particle against a batch of observations.
//!
//! For particle $i$ and observations $z_1 \dots z_k$ with models $h_j$:
//!
//! $$
//! \tilde w_i = \prod_j \left(1 - \Phi\left(\lVert h_j(x_i) - z_j \rVert; 0, \sigma^2\right)\right),
//! \qquad w_i = \frac{\tilde w_i}{\sum_l \tilde w_l + \epsilon}
//! $$
//!
//! where $\Phi$ is [`crate::likelihood::normal_cdf`]. The prior weight of the
//! particle does not enter the product; resampling or the evaluator decide what
//! survives between steps.
use log::warn;
use nalgebra::DVector;

use crate::EPSILON;
use crate::likelihood::residual_likelihood;
use crate::linalg::distance;
use crate::models::ObservationModel;
use crate::particle::ParticleEstimate;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleWeighter {
    /// Expected standard deviation of observation residuals.
    pub std_deviation: f64,
}

impl ParticleWeighter {
    pub fn new(std_deviation: f64) -> Self {
        assert!(
            std_deviation >= 0.0 && std_deviation.is_finite(),
            "Observation standard deviation must be finite and non-negative"
        );
        ParticleWeighter { std_deviation }
    }

    /// Fuse `observations` into a freshly normalised set of weights.
    ///
    /// Each entry pairs the model that produced an observation with the
    /// observed value. An empty batch yields uniform weights.
    pub fn weight<O: ObservationModel>(
        &self,
        particles: &ParticleEstimate,
        observations: &[(&O, &DVector<f64>)],
    ) -> ParticleEstimate {
        let mut weights = vec![1.0; particles.len()];
        for (model, actual) in observations {
            for (w, state) in weights.iter_mut().zip(particles.states()) {
                let residual = distance(&model.apply(state), actual);
                *w *= residual_likelihood(residual, self.std_deviation);
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            warn!(
                "all {} particle weights vanished across {} observations",
                particles.len(),
                observations.len()
            );
        }
        let norm = total + EPSILON;
        particles.with_weights(weights.into_iter().map(|w| w / norm).collect())
    }
}
