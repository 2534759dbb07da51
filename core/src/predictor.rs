//! Prediction stage: propagate every particle through a motion model.
use log::trace;
use nalgebra::DVector;
use rand::Rng;

use crate::models::MotionModel;
use crate::particle::ParticleEstimate;

#[derive(Clone, Debug)]
pub struct ParticlePredictor<M> {
    pub model: M,
}

impl<M: MotionModel> ParticlePredictor<M> {
    pub fn new(model: M) -> Self {
        ParticlePredictor { model }
    }

    /// Predict using the process-wide random source.
    pub fn predict(
        &self,
        particles: &ParticleEstimate,
        control: Option<&DVector<f64>>,
    ) -> ParticleEstimate {
        self.predict_with(particles, control, &mut rand::rng())
    }

    /// Predict with an explicit random source. Weights are carried through unchanged.
    ///
    /// # Panics
    /// When the control dimension differs from the model's control dimension,
    /// or when the model changes the state dimension.
    pub fn predict_with<R: Rng + ?Sized>(
        &self,
        particles: &ParticleEstimate,
        control: Option<&DVector<f64>>,
        rng: &mut R,
    ) -> ParticleEstimate {
        let expected = self.model.control_dimension();
        let provided = control.map_or(0, |u| u.len());
        assert_eq!(
            provided, expected,
            "Control dimension mismatch: model expects {expected}, got {provided}"
        );
        let control = control.filter(|_| expected > 0);
        let dimension = particles.dimension();
        let states: Vec<DVector<f64>> = particles
            .states()
            .iter()
            .map(|state| {
                let next = self.model.sample(state, control, rng);
                assert_eq!(
                    next.len(),
                    dimension,
                    "Motion model changed the state dimension from {} to {}",
                    dimension,
                    next.len()
                );
                next
            })
            .collect();
        trace!(
            "predicted {} particles of dimension {}",
            states.len(),
            dimension
        );
        ParticleEstimate::new(states, Some(particles.weights().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BrownianMotionModel, ProcessNoise, TranslationMotionModel, ZeroMotionModel,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cloud() -> ParticleEstimate {
        ParticleEstimate::new(
            vec![
                DVector::from_vec(vec![0.0, 1.0]),
                DVector::from_vec(vec![-2.0, 0.5]),
                DVector::from_vec(vec![3.0, 3.0]),
            ],
            Some(vec![0.2, 0.3, 0.5]),
        )
    }

    #[test]
    fn zero_noise_zero_control_is_bit_identical() {
        let predictor = ParticlePredictor::new(BrownianMotionModel::new(
            TranslationMotionModel::new(2),
            ProcessNoise::isotropic(2, 0.0),
        ));
        let before = cloud();
        let after = predictor.predict_with(
            &before,
            Some(&DVector::zeros(2)),
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(after, before);
    }

    #[test]
    fn zero_noise_control_shifts_exactly() {
        let predictor = ParticlePredictor::new(BrownianMotionModel::new(
            TranslationMotionModel::new(2),
            ProcessNoise::isotropic(2, 0.0),
        ));
        let control = DVector::from_vec(vec![0.5, -1.5]);
        let before = cloud();
        let after = predictor.predict_with(&before, Some(&control), &mut StdRng::seed_from_u64(1));
        for i in 0..before.len() {
            assert_eq!(after.get(i).state, &before.get(i).state + &control);
            assert_eq!(after.get(i).weight, before.get(i).weight);
        }
    }

    #[test]
    fn noisy_prediction_is_seed_reproducible() {
        let predictor = ParticlePredictor::new(BrownianMotionModel::new(
            ZeroMotionModel,
            ProcessNoise::isotropic(2, 0.3),
        ));
        let a = predictor.predict_with(&cloud(), None, &mut StdRng::seed_from_u64(21));
        let b = predictor.predict_with(&cloud(), None, &mut StdRng::seed_from_u64(21));
        assert_eq!(a, b);
        assert_ne!(a, cloud());
        assert_eq!(a.weights(), cloud().weights());
    }

    #[test]
    fn default_source_predicts() {
        let predictor = ParticlePredictor::new(ZeroMotionModel);
        assert_eq!(predictor.predict(&cloud(), None), cloud());
    }

    #[test]
    #[should_panic(expected = "Control dimension mismatch")]
    fn wrong_control_dimension_panics() {
        let predictor = ParticlePredictor::new(TranslationMotionModel::new(2));
        let _ = predictor.predict(&cloud(), Some(&DVector::zeros(3)));
    }

    #[test]
    #[should_panic(expected = "Control dimension mismatch")]
    fn missing_control_panics() {
        let predictor = ParticlePredictor::new(TranslationMotionModel::new(2));
        let _ = predictor.predict(&cloud(), None);
    }

    #[test]
    #[should_panic(expected = "Control dimension mismatch")]
    fn control_for_uncontrollable_model_panics() {
        let predictor = ParticlePredictor::new(ZeroMotionModel);
        let _ = predictor.predict(&cloud(), Some(&DVector::zeros(1)));
    }
}
