//! Measurement updaters: weight, evaluate, and resample when impoverished.
//!
//! [`MultiModalParticleUpdater`] fuses observations from heterogeneous
//! sources. Each observation names the model that produced it through a key;
//! models are created by a factory on first use and cached for every later
//! batch. [`ParticleUpdater`] is the single-source special case.
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;

use log::debug;
use nalgebra::DVector;
use rand::Rng;

use crate::evaluator::{Evaluation, EvaluationModel, ParticleEvaluator};
use crate::models::ObservationModel;
use crate::particle::ParticleEstimate;
use crate::resampler::{ParticleResampler, ResamplingStrategy};
use crate::weighter::ParticleWeighter;

/// A measurement update over a predicted cloud.
pub trait ParticleUpdate {
    type Observation;

    /// Fuse every observation into one weight update, then resample if impoverished.
    fn batch_update<R: Rng + ?Sized>(
        &mut self,
        prediction: &ParticleEstimate,
        observations: &[Self::Observation],
        rng: &mut R,
    ) -> (ParticleEstimate, Evaluation);

    /// A batch of one.
    fn update<R: Rng + ?Sized>(
        &mut self,
        prediction: &ParticleEstimate,
        observation: &Self::Observation,
        rng: &mut R,
    ) -> (ParticleEstimate, Evaluation) {
        self.batch_update(prediction, std::slice::from_ref(observation), rng)
    }
}

/// An observation tagged with the key of the model that explains it.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiModal<K> {
    pub model: K,
    pub value: DVector<f64>,
}

impl<K> MultiModal<K> {
    pub fn new(model: K, value: DVector<f64>) -> Self {
        MultiModal { model, value }
    }
}

type ModelFactory<K, O> = Box<dyn Fn(&K) -> O + Send + Sync>;

pub struct MultiModalParticleUpdater<K, O> {
    pub weighter: ParticleWeighter,
    pub evaluator: ParticleEvaluator,
    pub resampler: ParticleResampler,
    models: HashMap<K, O>,
    factory: Option<ModelFactory<K, O>>,
}

impl<K, O> MultiModalParticleUpdater<K, O>
where
    K: Eq + Hash + Clone,
    O: ObservationModel,
{
    /// Updater whose models are built on demand by `factory`.
    pub fn new<F>(std_deviation: f64, evaluation: EvaluationModel, factory: F) -> Self
    where
        F: Fn(&K) -> O + Send + Sync + 'static,
    {
        MultiModalParticleUpdater {
            weighter: ParticleWeighter::new(std_deviation),
            evaluator: ParticleEvaluator::new(evaluation),
            resampler: ParticleResampler::default(),
            models: HashMap::new(),
            factory: Some(Box::new(factory)),
        }
    }

    /// Updater over a fixed set of models. An observation naming any other key panics.
    pub fn from_models(std_deviation: f64, evaluation: EvaluationModel, models: HashMap<K, O>) -> Self {
        MultiModalParticleUpdater {
            weighter: ParticleWeighter::new(std_deviation),
            evaluator: ParticleEvaluator::new(evaluation),
            resampler: ParticleResampler::default(),
            models,
            factory: None,
        }
    }

    pub fn with_resampling(mut self, strategy: ResamplingStrategy) -> Self {
        self.resampler = ParticleResampler::new(strategy);
        self
    }

    /// Number of models resolved so far.
    pub fn cached_models(&self) -> usize {
        self.models.len()
    }

    pub fn model(&self, key: &K) -> Option<&O> {
        self.models.get(key)
    }

    fn resolve(&mut self, key: &K) {
        if self.models.contains_key(key) {
            return;
        }
        let factory = match &self.factory {
            Some(factory) => factory,
            None => panic!("No observation model registered for the requested key"),
        };
        self.models.insert(key.clone(), factory(key));
    }
}

impl<K, O> ParticleUpdate for MultiModalParticleUpdater<K, O>
where
    K: Eq + Hash + Clone,
    O: ObservationModel,
{
    type Observation = MultiModal<K>;

    fn batch_update<R: Rng + ?Sized>(
        &mut self,
        prediction: &ParticleEstimate,
        observations: &[MultiModal<K>],
        rng: &mut R,
    ) -> (ParticleEstimate, Evaluation) {
        for observation in observations {
            self.resolve(&observation.model);
        }
        let pairs: Vec<(&O, &DVector<f64>)> = observations
            .iter()
            .map(|o| (&self.models[&o.model], &o.value))
            .collect();
        let weighted = self.weighter.weight(prediction, &pairs);
        let evaluation = self.evaluator.evaluate(&weighted);
        if evaluation.is_impoverished() {
            debug!("resampling {} particles", weighted.len());
            (self.resampler.resample_with(&weighted, rng), evaluation)
        } else {
            (weighted, evaluation)
        }
    }
}

impl<K, O> Debug for MultiModalParticleUpdater<K, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiModalParticleUpdater")
            .field("weighter", &self.weighter)
            .field("evaluator", &self.evaluator)
            .field("resampler", &self.resampler)
            .field("cached_models", &self.models.len())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Updater for a single observation model.
#[derive(Debug)]
pub struct ParticleUpdater<O> {
    inner: MultiModalParticleUpdater<(), O>,
}

impl<O: ObservationModel> ParticleUpdater<O> {
    pub fn new(model: O, std_deviation: f64, evaluation: EvaluationModel) -> Self {
        let models = HashMap::from([((), model)]);
        ParticleUpdater {
            inner: MultiModalParticleUpdater::from_models(std_deviation, evaluation, models),
        }
    }

    pub fn with_resampling(self, strategy: ResamplingStrategy) -> Self {
        ParticleUpdater {
            inner: self.inner.with_resampling(strategy),
        }
    }

    pub fn model(&self) -> Option<&O> {
        self.inner.model(&())
    }
}

impl<O: ObservationModel> ParticleUpdate for ParticleUpdater<O> {
    type Observation = DVector<f64>;

    fn batch_update<R: Rng + ?Sized>(
        &mut self,
        prediction: &ParticleEstimate,
        observations: &[DVector<f64>],
        rng: &mut R,
    ) -> (ParticleEstimate, Evaluation) {
        let tagged: Vec<MultiModal<()>> = observations
            .iter()
            .map(|value| MultiModal::new((), value.clone()))
            .collect();
        self.inner.batch_update(prediction, &tagged, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Landmark, RangeObservationModel, TransparentObservationModel};
    use crate::sampling::FixedUniform;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    fn prediction() -> ParticleEstimate {
        ParticleEstimate::new(
            vec![v(&[0.0, 0.0]), v(&[0.1, 0.0]), v(&[2.0, 2.0]), v(&[-2.0, 1.0])],
            None,
        )
    }

    #[test]
    fn models_are_built_once_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let landmarks = [
            Landmark::new(1, v(&[5.0, 0.0])),
            Landmark::new(2, v(&[0.0, 5.0])),
        ];
        let table = landmarks.clone();
        let mut updater = MultiModalParticleUpdater::new(0.5, EvaluationModel::default(), move |id: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            let landmark = table
                .iter()
                .find(|l| l.identifier == *id)
                .map(|l| l.location.clone())
                .unwrap_or_else(|| DVector::zeros(2));
            RangeObservationModel::new(landmark, vec![0, 1])
        });
        let observations = vec![
            MultiModal::new(1, v(&[5.0])),
            MultiModal::new(2, v(&[5.0])),
            MultiModal::new(1, v(&[5.0])),
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let _ = updater.batch_update(&prediction(), &observations, &mut rng);
        let _ = updater.batch_update(&prediction(), &observations, &mut rng);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(updater.cached_models(), 2);
        assert!(updater.model(&1).is_some());
    }

    #[test]
    fn single_update_equals_batch_of_one() {
        let z = v(&[0.05, 0.0]);
        let mut a = ParticleUpdater::new(TransparentObservationModel, 0.5, EvaluationModel::new(0.01));
        let mut b = ParticleUpdater::new(TransparentObservationModel, 0.5, EvaluationModel::new(0.01));
        let (single, _) = a.update(&prediction(), &z, &mut StdRng::seed_from_u64(1));
        let (batch, _) = b.batch_update(&prediction(), &[z.clone()], &mut StdRng::seed_from_u64(1));
        assert_eq!(single, batch);
    }

    #[test]
    fn healthy_cloud_keeps_weights() {
        let mut updater =
            ParticleUpdater::new(TransparentObservationModel, 0.5, EvaluationModel::new(0.01));
        let (out, evaluation) =
            updater.update(&prediction(), &v(&[0.05, 0.0]), &mut StdRng::seed_from_u64(1));
        assert_eq!(evaluation, Evaluation::Healthy);
        assert_eq!(out.states(), prediction().states());
        assert_approx_eq!(out.total_weight(), 1.0, 1e-5);
        assert!(out.weights()[0] > out.weights()[2]);
    }

    #[test]
    fn impoverished_cloud_is_resampled() {
        let mut updater =
            ParticleUpdater::new(TransparentObservationModel, 0.1, EvaluationModel::new(0.9));
        let (out, evaluation) =
            updater.update(&prediction(), &v(&[0.05, 0.0]), &mut FixedUniform::new(0.5));
        assert_eq!(evaluation, Evaluation::Impoverished);
        assert_eq!(out.len(), 4);
        assert!(out.weights().iter().all(|w| *w == 0.25));
        assert!(out.states().iter().all(|s| s[0].abs() <= 0.1 && s[1] == 0.0));
    }

    #[test]
    #[should_panic(expected = "No observation model registered")]
    fn unknown_key_without_factory_panics() {
        let mut updater: MultiModalParticleUpdater<u64, TransparentObservationModel> =
            MultiModalParticleUpdater::from_models(0.5, EvaluationModel::default(), HashMap::new());
        let _ = updater.update(
            &prediction(),
            &MultiModal::new(3, v(&[0.0, 0.0])),
            &mut StdRng::seed_from_u64(0),
        );
    }
}
