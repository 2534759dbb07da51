//! Motion and observation models consumed by the particle filter.
//!
//! The filter never owns the physics of the tracked process. It only calls
//! into a [`MotionModel`] during prediction and an [`ObservationModel`]
//! during weighting. This module provides the two traits plus a small set of
//! concrete variants:
//!
//! | Model                              | Transition                   | Control |
//! |------------------------------------|------------------------------|---------|
//! | [`ZeroMotionModel`]                | $x' = x$                     | none    |
//! | [`TranslationMotionModel`]         | $x' = x + u$                 | $n$     |
//! | [`LinearMotionModel`]              | $x' = A x$                   | none    |
//! | [`ControllableLinearMotionModel`]  | $x' = A x + B u$             | $m$     |
//! | [`NonlinearMotionModel`]           | $x' = f(x)$                  | none    |
//! | [`ControllableNonlinearMotionModel`] | $x' = f(x, u)$             | $m$     |
//! | [`BrownianMotionModel`]            | $x' = g(x, u) + w$           | inner   |
//!
//! Models are statically dispatched; particle counts in the thousands make
//! this the hot loop of the filter.

use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::Distribution;

use crate::linalg::{checked_add, distance, matrix_square_root};
use crate::sampling::{BoxMuller, standard_normal_vector};

/// Generic state-transition model.
pub trait MotionModel {
    /// Number of control inputs the model expects. Zero for uncontrollable models.
    fn control_dimension(&self) -> usize {
        0
    }
    /// Deterministic transition of a single state.
    fn apply(&self, state: &DVector<f64>, control: Option<&DVector<f64>>) -> DVector<f64>;
    /// Draw a successor state. Deterministic models return [`MotionModel::apply`].
    fn sample<R: Rng + ?Sized>(
        &self,
        state: &DVector<f64>,
        control: Option<&DVector<f64>>,
        rng: &mut R,
    ) -> DVector<f64> {
        let _ = rng;
        self.apply(state, control)
    }
}

/// Generic measurement model mapping a state into observation space.
pub trait ObservationModel {
    /// Expected observation for `state`.
    fn apply(&self, state: &DVector<f64>) -> DVector<f64>;
}

impl<O: ObservationModel + ?Sized> ObservationModel for Box<O> {
    fn apply(&self, state: &DVector<f64>) -> DVector<f64> {
        (**self).apply(state)
    }
}

fn require_control<'a>(control: Option<&'a DVector<f64>>, expected: usize) -> &'a DVector<f64> {
    match control {
        Some(u) => {
            assert_eq!(
                u.len(),
                expected,
                "Control dimension mismatch: model expects {}, got {}",
                expected,
                u.len()
            );
            u
        }
        None => panic!("Control dimension mismatch: model expects {expected}, got none"),
    }
}

// ============= Motion models =====================================================================

/// Leaves the state untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroMotionModel;

impl MotionModel for ZeroMotionModel {
    fn apply(&self, state: &DVector<f64>, _control: Option<&DVector<f64>>) -> DVector<f64> {
        state.clone()
    }
}

/// Shifts the state by the control vector: $x' = x + u$.
#[derive(Clone, Copy, Debug)]
pub struct TranslationMotionModel {
    pub dimension: usize,
}

impl TranslationMotionModel {
    pub fn new(dimension: usize) -> Self {
        TranslationMotionModel { dimension }
    }
}

impl MotionModel for TranslationMotionModel {
    fn control_dimension(&self) -> usize {
        self.dimension
    }
    fn apply(&self, state: &DVector<f64>, control: Option<&DVector<f64>>) -> DVector<f64> {
        checked_add(state, require_control(control, self.dimension))
    }
}

/// Linear transition $x' = A x$.
#[derive(Clone, Debug)]
pub struct LinearMotionModel {
    pub a: DMatrix<f64>,
}

impl LinearMotionModel {
    pub fn new(a: DMatrix<f64>) -> Self {
        assert!(a.is_square(), "LinearMotionModel: A must be square");
        LinearMotionModel { a }
    }
}

impl MotionModel for LinearMotionModel {
    fn apply(&self, state: &DVector<f64>, _control: Option<&DVector<f64>>) -> DVector<f64> {
        assert_eq!(
            self.a.ncols(),
            state.len(),
            "LinearMotionModel: state dimension mismatch"
        );
        &self.a * state
    }
}

/// Linear transition with control input $x' = A x + B u$.
#[derive(Clone, Debug)]
pub struct ControllableLinearMotionModel {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
}

impl ControllableLinearMotionModel {
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> Self {
        assert!(a.is_square(), "ControllableLinearMotionModel: A must be square");
        assert_eq!(
            a.nrows(),
            b.nrows(),
            "ControllableLinearMotionModel: A and B must have the same number of rows"
        );
        ControllableLinearMotionModel { a, b }
    }
}

impl MotionModel for ControllableLinearMotionModel {
    fn control_dimension(&self) -> usize {
        self.b.ncols()
    }
    fn apply(&self, state: &DVector<f64>, control: Option<&DVector<f64>>) -> DVector<f64> {
        assert_eq!(
            self.a.ncols(),
            state.len(),
            "ControllableLinearMotionModel: state dimension mismatch"
        );
        let u = require_control(control, self.b.ncols());
        &self.a * state + &self.b * u
    }
}

type StateFunction = Box<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;
type ControlledStateFunction = Box<dyn Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync>;

/// Arbitrary transition $x' = f(x)$.
pub struct NonlinearMotionModel {
    function: StateFunction,
}

impl NonlinearMotionModel {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        NonlinearMotionModel {
            function: Box::new(function),
        }
    }
}

impl Debug for NonlinearMotionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearMotionModel").finish_non_exhaustive()
    }
}

impl MotionModel for NonlinearMotionModel {
    fn apply(&self, state: &DVector<f64>, _control: Option<&DVector<f64>>) -> DVector<f64> {
        (self.function)(state)
    }
}

/// Arbitrary controlled transition $x' = f(x, u)$.
pub struct ControllableNonlinearMotionModel {
    control_dimension: usize,
    function: ControlledStateFunction,
}

impl ControllableNonlinearMotionModel {
    pub fn new<F>(control_dimension: usize, function: F) -> Self
    where
        F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        ControllableNonlinearMotionModel {
            control_dimension,
            function: Box::new(function),
        }
    }
}

impl Debug for ControllableNonlinearMotionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllableNonlinearMotionModel")
            .field("control_dimension", &self.control_dimension)
            .finish_non_exhaustive()
    }
}

impl MotionModel for ControllableNonlinearMotionModel {
    fn control_dimension(&self) -> usize {
        self.control_dimension
    }
    fn apply(&self, state: &DVector<f64>, control: Option<&DVector<f64>>) -> DVector<f64> {
        (self.function)(state, require_control(control, self.control_dimension))
    }
}

// ============= Process noise =====================================================================

/// Additive zero-mean Gaussian process noise.
#[derive(Clone, Debug)]
pub enum ProcessNoise {
    /// Independent noise with the given standard deviation per dimension.
    StdDev(DVector<f64>),
    /// Correlated noise. `factor` satisfies `covariance ≈ factor * factorᵀ`.
    Correlated {
        covariance: DMatrix<f64>,
        factor: DMatrix<f64>,
    },
}

impl ProcessNoise {
    /// Same standard deviation on every one of `dimension` axes.
    pub fn isotropic(dimension: usize, std_dev: f64) -> Self {
        ProcessNoise::from_std(&vec![std_dev; dimension])
    }

    pub fn from_std(std_devs: &[f64]) -> Self {
        assert!(
            std_devs.iter().all(|s| *s >= 0.0 && s.is_finite()),
            "Process noise standard deviations must be finite and non-negative"
        );
        ProcessNoise::StdDev(DVector::from_column_slice(std_devs))
    }

    /// Full covariance specification. The square root is factored once here.
    pub fn covariance(covariance: DMatrix<f64>) -> Self {
        let factor = matrix_square_root(&covariance);
        ProcessNoise::Correlated { covariance, factor }
    }

    pub fn dimension(&self) -> usize {
        match self {
            ProcessNoise::StdDev(std) => std.len(),
            ProcessNoise::Correlated { covariance, .. } => covariance.nrows(),
        }
    }

    /// Draw one noise vector.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        match self {
            ProcessNoise::StdDev(std) => {
                DVector::from_fn(std.len(), |i, _| BoxMuller::new(0.0, std[i]).sample(rng))
            }
            ProcessNoise::Correlated { factor, .. } => {
                factor * standard_normal_vector(rng, factor.ncols())
            }
        }
    }
}

/// Wraps any motion model with additive Brownian noise.
///
/// [`MotionModel::apply`] forwards to the inner model so the wrapper still
/// describes the mean transition; [`MotionModel::sample`] adds a fresh noise
/// draw to the inner model's sample.
#[derive(Clone, Debug)]
pub struct BrownianMotionModel<M> {
    pub model: M,
    pub noise: ProcessNoise,
}

impl<M: MotionModel> BrownianMotionModel<M> {
    pub fn new(model: M, noise: ProcessNoise) -> Self {
        BrownianMotionModel { model, noise }
    }
}

impl<M: MotionModel> MotionModel for BrownianMotionModel<M> {
    fn control_dimension(&self) -> usize {
        self.model.control_dimension()
    }
    fn apply(&self, state: &DVector<f64>, control: Option<&DVector<f64>>) -> DVector<f64> {
        self.model.apply(state, control)
    }
    fn sample<R: Rng + ?Sized>(
        &self,
        state: &DVector<f64>,
        control: Option<&DVector<f64>>,
        rng: &mut R,
    ) -> DVector<f64> {
        let mut next = self.model.sample(state, control, rng);
        assert_eq!(
            next.len(),
            self.noise.dimension(),
            "BrownianMotionModel: noise dimension {} does not match state dimension {}",
            self.noise.dimension(),
            next.len()
        );
        next += self.noise.sample(rng);
        next
    }
}

// ============= Observation models ================================================================

/// Observes the full state directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransparentObservationModel;

impl ObservationModel for TransparentObservationModel {
    fn apply(&self, state: &DVector<f64>) -> DVector<f64> {
        state.clone()
    }
}

/// Linear observation $z = H x$.
#[derive(Clone, Debug)]
pub struct LinearObservationModel {
    pub h: DMatrix<f64>,
}

impl LinearObservationModel {
    pub fn new(h: DMatrix<f64>) -> Self {
        LinearObservationModel { h }
    }
}

impl ObservationModel for LinearObservationModel {
    fn apply(&self, state: &DVector<f64>) -> DVector<f64> {
        assert_eq!(
            self.h.ncols(),
            state.len(),
            "LinearObservationModel: state dimension mismatch"
        );
        &self.h * state
    }
}

/// Arbitrary observation $z = h(x)$.
pub struct NonlinearObservationModel {
    function: StateFunction,
}

impl NonlinearObservationModel {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        NonlinearObservationModel {
            function: Box::new(function),
        }
    }
}

impl Debug for NonlinearObservationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearObservationModel")
            .finish_non_exhaustive()
    }
}

impl ObservationModel for NonlinearObservationModel {
    fn apply(&self, state: &DVector<f64>) -> DVector<f64> {
        (self.function)(state)
    }
}

/// Range to a fixed landmark, measured from selected state components.
#[derive(Clone, Debug)]
pub struct RangeObservationModel {
    pub landmark: DVector<f64>,
    /// Indices of the state components holding the position.
    pub position_indices: Vec<usize>,
}

impl RangeObservationModel {
    pub fn new(landmark: DVector<f64>, position_indices: Vec<usize>) -> Self {
        assert_eq!(
            landmark.len(),
            position_indices.len(),
            "RangeObservationModel: landmark and position dimensions differ"
        );
        RangeObservationModel {
            landmark,
            position_indices,
        }
    }
}

impl ObservationModel for RangeObservationModel {
    fn apply(&self, state: &DVector<f64>) -> DVector<f64> {
        let position = DVector::from_iterator(
            self.position_indices.len(),
            self.position_indices.iter().map(|&i| state[i]),
        );
        DVector::from_element(1, distance(&position, &self.landmark))
    }
}

// ============= Landmarks =========================================================================

/// A fixed reference point. Identity is the identifier alone.
#[derive(Clone, Debug)]
pub struct Landmark {
    pub identifier: u64,
    pub location: DVector<f64>,
}

impl Landmark {
    pub fn new(identifier: u64, location: DVector<f64>) -> Self {
        Landmark {
            identifier,
            location,
        }
    }

    /// Range model measuring the distance from the first `location.len()` state components.
    pub fn range_model(&self) -> RangeObservationModel {
        RangeObservationModel::new(
            self.location.clone(),
            (0..self.location.len()).collect(),
        )
    }
}

impl PartialEq for Landmark {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Landmark {}

impl Hash for Landmark {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Landmark(id: {}, location: {:?})",
            self.identifier,
            self.location.as_slice()
        )
    }
}

/// A scalar range measurement to a landmark.
#[derive(Clone, Debug)]
pub struct LandmarkObservation {
    pub landmark: Landmark,
    pub measurement: f64,
}

impl LandmarkObservation {
    pub fn new(landmark: Landmark, measurement: f64) -> Self {
        LandmarkObservation {
            landmark,
            measurement,
        }
    }
}
