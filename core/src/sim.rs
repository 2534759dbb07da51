//! Simulation utilities for exercising the filter against synthetic ground truth.
//!
//! This module generates noisy trajectories, scores an estimated trajectory
//! against the truth, and runs three canned tracking scenarios on a planar
//! constant-velocity state `[p_x, p_y, v_x, v_y]`:
//!
//! - [`Scenario::ConstantVelocity`]: fixed velocity command, position fixes.
//! - [`Scenario::VariableVelocity`]: slowly rotating velocity command, position fixes.
//! - [`Scenario::Landmarks`]: curved path, range measurements to four fixed landmarks
//!   fused through a [`MultiModalParticleUpdater`].
use std::io;
use std::path::Path;

use log::info;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::evaluator::{Evaluation, ParticleEvaluator};
use crate::filter::ParticleFilter;
use crate::linalg::distance;
use crate::models::{
    BrownianMotionModel, ControllableLinearMotionModel, Landmark, LinearObservationModel,
    MotionModel, ObservationModel, ProcessNoise, RangeObservationModel,
};
use crate::particle::ParticleEstimate;
use crate::sampling::BoxMuller;
use crate::updater::{MultiModal, MultiModalParticleUpdater, ParticleUpdate, ParticleUpdater};

/// Time step of every scenario in seconds.
pub const DT: f64 = 0.1;
/// Standard deviation of the noise driving the true trajectory.
pub const TRUTH_NOISE_STD: f64 = 0.01;
/// Standard deviation of simulated sensor noise (positions and ranges).
pub const SENSOR_NOISE_STD: f64 = 0.1;

/// Generate a trajectory by applying `controls` to `initial` and adding `process_noise`.
///
/// The first sample is `initial` and the final propagated state is dropped,
/// so `signal[k]` is the state on which `controls[k]` acts.
pub fn make_signal<M, R>(
    initial: &DVector<f64>,
    controls: &[DVector<f64>],
    model: &M,
    process_noise: &ProcessNoise,
    rng: &mut R,
) -> Vec<DVector<f64>>
where
    M: MotionModel,
    R: Rng + ?Sized,
{
    let mut signal = Vec::with_capacity(controls.len() + 1);
    signal.push(initial.clone());
    let mut state = initial.clone();
    for control in controls {
        let control = (model.control_dimension() > 0).then_some(control);
        state = model.apply(&state, control) + process_noise.sample(rng);
        signal.push(state.clone());
    }
    if signal.len() > 1 {
        signal.pop();
    }
    signal
}

/// Best alignment score between two trajectories.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Similarity {
    /// Mean squared distance over the overlapping samples.
    pub score: f64,
    /// Number of leading samples skipped in `(lhs, rhs)`.
    pub offsets: (usize, usize),
}

/// Minimum mean squared distance between `lhs` and `rhs` over the offsets
/// `(0, 0)`, `(0, k)` and `(k, 0)` for `k` in `1..=window`.
///
/// # Panics
/// When `window` is not smaller than both trajectory lengths.
pub fn aligned_similarity(lhs: &[DVector<f64>], rhs: &[DVector<f64>], window: usize) -> Similarity {
    assert!(window < lhs.len(), "window must be smaller than the left trajectory");
    assert!(window < rhs.len(), "window must be smaller than the right trajectory");
    let mut offsets = vec![(0, 0)];
    for k in 1..=window {
        offsets.push((0, k));
        offsets.push((k, 0));
    }
    let mut best = Similarity {
        score: f64::MAX,
        offsets: (0, 0),
    };
    for (l, r) in offsets {
        let (lhs, rhs) = (&lhs[l..], &rhs[r..]);
        let count = lhs.len().min(rhs.len());
        let score = lhs
            .iter()
            .zip(rhs.iter())
            .map(|(a, b)| distance(a, b).powi(2))
            .sum::<f64>()
            / count as f64;
        if score < best.score {
            best = Similarity {
                score,
                offsets: (l, r),
            };
        }
    }
    best
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    ConstantVelocity,
    VariableVelocity,
    Landmarks,
}

/// One row of a tracking run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub step: usize,
    pub time: f64,
    pub true_x: f64,
    pub true_y: f64,
    pub estimate_x: f64,
    pub estimate_y: f64,
    pub variance_x: f64,
    pub variance_y: f64,
    /// Euclidean position error.
    pub error: f64,
    /// Normalised effective sample size of the updated cloud; one after resampling.
    pub effective_sample_size: f64,
    pub resampled: bool,
}

impl TrackingRecord {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> io::Result<Vec<Self>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ScenarioResult {
    pub truth: Vec<DVector<f64>>,
    pub estimates: Vec<DVector<f64>>,
    pub records: Vec<TrackingRecord>,
    /// Alignment of estimated and true positions within a ten-sample window.
    pub similarity: Similarity,
}

/// `[p, v]` planar model: position integrates the commanded velocity.
pub fn constant_velocity_model(dt: f64) -> ControllableLinearMotionModel {
    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(4, 4, &[
        1.0, 0.0, dt,  0.0,
        0.0, 1.0, 0.0, dt,
        0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0,
    ]);
    #[rustfmt::skip]
    let b = DMatrix::from_row_slice(4, 2, &[
        0.0, 0.0,
        0.0, 0.0,
        1.0, 0.0,
        0.0, 1.0,
    ]);
    ControllableLinearMotionModel::new(a, b)
}

/// Observes `[p_x, p_y]`.
pub fn position_observation_model() -> LinearObservationModel {
    #[rustfmt::skip]
    let h = DMatrix::from_row_slice(2, 4, &[
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
    ]);
    LinearObservationModel::new(h)
}

/// Four landmarks on the corners of a 20 m square centred on the origin.
pub fn square_landmarks() -> Vec<Landmark> {
    [(10.0, 10.0), (-10.0, 10.0), (-10.0, -10.0), (10.0, -10.0)]
        .iter()
        .enumerate()
        .map(|(i, (x, y))| Landmark::new(i as u64, DVector::from_vec(vec![*x, *y])))
        .collect()
}

impl Scenario {
    pub fn controls(&self, steps: usize) -> Vec<DVector<f64>> {
        (0..steps)
            .map(|k| {
                let t = k as f64 * DT;
                match self {
                    Scenario::ConstantVelocity => DVector::from_vec(vec![1.0, 0.5]),
                    Scenario::VariableVelocity => {
                        DVector::from_vec(vec![(0.2 * t).cos(), (0.2 * t).sin()])
                    }
                    Scenario::Landmarks => {
                        DVector::from_vec(vec![0.5 * (0.1 * t).cos(), 0.5 * (0.1 * t).sin()])
                    }
                }
            })
            .collect()
    }
}

fn sensor_noise<R: Rng + ?Sized>(rng: &mut R, n: usize) -> DVector<f64> {
    let normal = BoxMuller::new(0.0, SENSOR_NOISE_STD);
    DVector::from_fn(n, |_, _| normal.sample(rng))
}

/// Run `scenario` for `steps` samples with the parameters in `config`.
///
/// # Panics
/// When `config` fails [`FilterConfig::validate`] or `steps` is not larger than the
/// ten-sample alignment window.
pub fn run_scenario(scenario: Scenario, config: &FilterConfig, steps: usize) -> ScenarioResult {
    if let Err(message) = config.validate() {
        panic!("invalid filter configuration: {message}");
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let initial = DVector::zeros(4);
    let controls = scenario.controls(steps);
    let motion = constant_velocity_model(DT);
    let truth = make_signal(
        &initial,
        &controls,
        &motion,
        &ProcessNoise::isotropic(4, TRUTH_NOISE_STD),
        &mut rng,
    );
    let prior = ParticleEstimate::from_prior(
        &initial,
        &ProcessNoise::isotropic(4, config.prior_std),
        config.num_particles,
        &mut rng,
    );
    let noisy_motion = BrownianMotionModel::new(motion, config.process_noise(4));
    let filter_seed = config.seed.wrapping_add(1);
    info!(
        "running {:?} for {} steps with {} particles",
        scenario, steps, config.num_particles
    );

    let (estimates, records) = match scenario {
        Scenario::ConstantVelocity | Scenario::VariableVelocity => {
            let observation = position_observation_model();
            let observations: Vec<Vec<DVector<f64>>> = truth
                .iter()
                .map(|state| vec![observation.apply(state) + sensor_noise(&mut rng, 2)])
                .collect();
            let updater = ParticleUpdater::new(
                observation,
                config.observation_std,
                config.evaluation_model(),
            )
            .with_resampling(config.resampling_strategy);
            let filter = ParticleFilter::new_with_seed(prior, noisy_motion, updater, filter_seed)
                .with_averaging(config.averaging_strategy);
            track(filter, &controls, &truth, &observations)
        }
        Scenario::Landmarks => {
            let landmarks = square_landmarks();
            let observations: Vec<Vec<MultiModal<u64>>> = truth
                .iter()
                .map(|state| {
                    landmarks
                        .iter()
                        .map(|l| {
                            let range = l.range_model().apply(state) + sensor_noise(&mut rng, 1);
                            MultiModal::new(l.identifier, range)
                        })
                        .collect()
                })
                .collect();
            let table = landmarks.clone();
            let updater = MultiModalParticleUpdater::new(
                config.observation_std,
                config.evaluation_model(),
                move |id: &u64| {
                    let location = table
                        .iter()
                        .find(|l| l.identifier == *id)
                        .map(|l| l.location.clone())
                        .unwrap_or_else(|| panic!("unknown landmark {id}"));
                    RangeObservationModel::new(location, vec![0, 1])
                },
            )
            .with_resampling(config.resampling_strategy);
            let filter = ParticleFilter::new_with_seed(prior, noisy_motion, updater, filter_seed)
                .with_averaging(config.averaging_strategy);
            track(filter, &controls, &truth, &observations)
        }
    };

    let positions = |states: &[DVector<f64>]| -> Vec<DVector<f64>> {
        states.iter().map(|s| s.rows(0, 2).clone_owned()).collect()
    };
    let similarity = aligned_similarity(&positions(&truth), &positions(&estimates), 10);
    info!(
        "{:?}: aligned similarity {:.5} at offsets {:?}",
        scenario, similarity.score, similarity.offsets
    );
    ScenarioResult {
        truth,
        estimates,
        records,
        similarity,
    }
}

fn track<M, U>(
    mut filter: ParticleFilter<M, U>,
    controls: &[DVector<f64>],
    truth: &[DVector<f64>],
    observations: &[Vec<U::Observation>],
) -> (Vec<DVector<f64>>, Vec<TrackingRecord>)
where
    M: MotionModel,
    U: ParticleUpdate,
{
    let mut estimates = Vec::with_capacity(truth.len());
    let mut records = Vec::with_capacity(truth.len());
    for (step, ((control, state), batch)) in controls
        .iter()
        .zip(truth.iter())
        .zip(observations.iter())
        .enumerate()
    {
        let output = filter.filter(Some(control), batch);
        let resampled = output.evaluation == Evaluation::Impoverished;
        let mean = &output.state.mean;
        records.push(TrackingRecord {
            step,
            time: step as f64 * DT,
            true_x: state[0],
            true_y: state[1],
            estimate_x: mean[0],
            estimate_y: mean[1],
            variance_x: output.state.variance[0],
            variance_y: output.state.variance[1],
            error: ((state[0] - mean[0]).powi(2) + (state[1] - mean[1]).powi(2)).sqrt(),
            effective_sample_size: if resampled {
                1.0
            } else {
                ParticleEvaluator::normalized_effective_sample_size(&output.particles)
            },
            resampled,
        });
        estimates.push(output.state.mean);
    }
    (estimates, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TranslationMotionModel, ZeroMotionModel};
    use assert_approx_eq::assert_approx_eq;

    fn v(values: &[f64]) -> DVector<f64> {
        DVector::from_column_slice(values)
    }

    #[test]
    fn signal_drops_the_final_sample() {
        let controls = vec![v(&[1.0]); 5];
        let mut rng = StdRng::seed_from_u64(0);
        let signal = make_signal(
            &v(&[0.0]),
            &controls,
            &TranslationMotionModel::new(1),
            &ProcessNoise::isotropic(1, 0.0),
            &mut rng,
        );
        assert_eq!(signal.len(), 5);
        for (k, s) in signal.iter().enumerate() {
            assert_approx_eq!(s[0], k as f64, 1e-12);
        }
    }

    #[test]
    fn signal_without_controls_is_the_initial_state() {
        let mut rng = StdRng::seed_from_u64(0);
        let signal = make_signal(
            &v(&[3.0, 4.0]),
            &[],
            &ZeroMotionModel,
            &ProcessNoise::isotropic(2, 1.0),
            &mut rng,
        );
        assert_eq!(signal, vec![v(&[3.0, 4.0])]);
    }

    #[test]
    fn similarity_finds_a_lag() {
        let lhs: Vec<_> = (0..50).map(|k| v(&[k as f64, 0.0])).collect();
        let rhs: Vec<_> = (0..50).map(|k| v(&[k as f64 - 2.0, 0.0])).collect();
        let similarity = aligned_similarity(&lhs, &rhs, 5);
        assert_approx_eq!(similarity.score, 0.0, 1e-12);
        assert_eq!(similarity.offsets, (0, 2));
        let identical = aligned_similarity(&lhs, &lhs, 5);
        assert_eq!(identical.offsets, (0, 0));
    }

    #[test]
    #[should_panic(expected = "window must be smaller")]
    fn similarity_window_too_large_panics() {
        let lhs = vec![v(&[0.0]); 3];
        let _ = aligned_similarity(&lhs, &lhs, 3);
    }

    #[test]
    fn constant_velocity_model_integrates_command() {
        let model = constant_velocity_model(DT);
        let next = model.apply(&v(&[0.0, 0.0, 0.0, 0.0]), Some(&v(&[1.0, 2.0])));
        assert_eq!(next, v(&[0.0, 0.0, 1.0, 2.0]));
        let next = model.apply(&next, Some(&v(&[1.0, 2.0])));
        assert_approx_eq!(next[0], 0.1, 1e-12);
        assert_approx_eq!(next[1], 0.2, 1e-12);
    }

    #[test]
    fn controls_have_the_requested_length() {
        for scenario in [Scenario::ConstantVelocity, Scenario::VariableVelocity, Scenario::Landmarks] {
            let controls = scenario.controls(17);
            assert_eq!(controls.len(), 17);
            assert!(controls.iter().all(|u| u.len() == 2));
        }
    }

    #[test]
    fn records_csv_roundtrip() {
        let config = FilterConfig {
            num_particles: 100,
            ..FilterConfig::default()
        };
        let result = run_scenario(Scenario::ConstantVelocity, &config, 30);
        assert_eq!(result.records.len(), 30);
        let path = std::env::temp_dir().join(format!("pf_records_{}.csv", std::process::id()));
        TrackingRecord::to_csv(&result.records, &path).unwrap();
        let loaded = TrackingRecord::from_csv(&path).unwrap();
        assert_eq!(loaded.len(), result.records.len());
        assert_eq!(loaded[0].step, 0);
        assert_eq!(loaded[29].resampled, result.records[29].resampled);
        assert_approx_eq!(loaded[29].estimate_x, result.records[29].estimate_x, 1e-9);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn scenario_runs_are_reproducible() {
        let config = FilterConfig {
            num_particles: 100,
            ..FilterConfig::default()
        };
        let a = run_scenario(Scenario::Landmarks, &config, 25);
        let b = run_scenario(Scenario::Landmarks, &config, 25);
        assert_eq!(a.estimates, b.estimates);
        assert_eq!(a.similarity, b.similarity);
    }
}
