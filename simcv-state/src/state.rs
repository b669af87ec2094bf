//! Continuous-variable state with Gaussian and Fock representations
//!
//! A [`State`] holds exactly one native representation. The other one is
//! computed on first access and cached for the lifetime of the value; caches
//! are compute-once cells and are never invalidated, so every operation that
//! changes a state returns a new `State`.

use crate::context::Context;
use crate::fock::{self, Contracted, FockTensor};
use crate::gaussian;
use crate::transformation::Transformation;
use crate::validation;
use nalgebra::{DMatrix, DVector};
use ndarray::ArrayD;
use num_complex::Complex64;
use once_cell::sync::OnceCell;
use simcv_core::{CvError, Result};
use std::fmt;
use std::ops::{BitAnd, Shr};
use tracing::{debug, warn};

/// Native representation of a state
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    /// Covariance matrix and means in xxpp ordering
    Gaussian {
        cov: DMatrix<f64>,
        means: DVector<f64>,
    },
    /// Ket or density matrix in the truncated number basis
    Fock(FockTensor),
}

/// Right-hand side of `primal` and `then`
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    State(&'a State),
    Transformation(&'a dyn Transformation),
}

impl<'a> From<&'a State> for Operand<'a> {
    fn from(state: &'a State) -> Self {
        Operand::State(state)
    }
}

impl Operand<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Operand::State(_) => "State",
            Operand::Transformation(_) => "Transformation",
        }
    }
}

/// Outcome of projecting one state onto another
#[derive(Debug, Clone)]
pub enum Projection {
    /// Some modes remain unmeasured
    State(State),
    /// Every mode was measured
    Probability(f64),
}

impl Projection {
    pub fn probability(&self) -> Option<f64> {
        match self {
            Projection::Probability(p) => Some(*p),
            Projection::State(_) => None,
        }
    }

    pub fn into_state(self) -> Option<State> {
        match self {
            Projection::State(state) => Some(state),
            Projection::Probability(_) => None,
        }
    }
}

/// Non-fatal notice returned next to a result
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    /// A Gaussian operand was converted to Fock to complete the operation
    FockConversion { operation: &'static str, modes: Vec<usize> },
}

impl Advisory {
    fn fock_conversion(operation: &'static str, modes: &[usize]) -> Self {
        let advisory = Advisory::FockConversion {
            operation,
            modes: modes.to_vec(),
        };
        warn!("{}", advisory);
        advisory
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::FockConversion { operation, modes } => write!(
                f,
                "{} on modes {:?} converted a Gaussian state to Fock; the result is truncated",
                operation, modes
            ),
        }
    }
}

/// Builder enforcing that exactly one representation is supplied
///
/// # Example
///
/// ```
/// use simcv_state::State;
/// use nalgebra::{DMatrix, DVector};
///
/// let state = State::builder()
///     .gaussian(DMatrix::identity(2, 2), DVector::zeros(2))
///     .build()
///     .unwrap();
/// assert!(state.is_gaussian());
/// assert!(State::builder().build().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateBuilder {
    modes: Option<Vec<usize>>,
    gaussian: Option<(DMatrix<f64>, DVector<f64>)>,
    symplectic: Option<(DVector<f64>, DMatrix<f64>)>,
    ket: Option<ArrayD<Complex64>>,
    dm: Option<ArrayD<Complex64>>,
    cutoffs: Option<Vec<usize>>,
    norm: Option<f64>,
    normalize_projection: bool,
    context: Option<Context>,
}

impl StateBuilder {
    pub fn modes(mut self, modes: Vec<usize>) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Covariance matrix and means
    pub fn gaussian(mut self, cov: DMatrix<f64>, means: DVector<f64>) -> Self {
        self.gaussian = Some((cov, means));
        self
    }

    /// Symplectic eigenvalues and the symplectic matrix diagonalizing the state
    pub fn symplectic(mut self, eigenvalues: DVector<f64>, symplectic: DMatrix<f64>) -> Self {
        self.symplectic = Some((eigenvalues, symplectic));
        self
    }

    pub fn ket(mut self, ket: ArrayD<Complex64>) -> Self {
        self.ket = Some(ket);
        self
    }

    pub fn dm(mut self, dm: ArrayD<Complex64>) -> Self {
        self.dm = Some(dm);
        self
    }

    /// Fock cutoffs to use instead of the automatic choice
    pub fn cutoffs(mut self, cutoffs: Vec<usize>) -> Self {
        self.cutoffs = Some(cutoffs);
        self
    }

    /// Weight of a Gaussian state (Fock tensors carry their own norm)
    pub fn norm(mut self, norm: f64) -> Self {
        self.norm = Some(norm);
        self
    }

    /// Normalize the remaining state when this state is used as a measurement
    pub fn normalize_projection(mut self, normalize: bool) -> Self {
        self.normalize_projection = normalize;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> Result<State> {
        let supplied = [
            self.gaussian.is_some(),
            self.symplectic.is_some(),
            self.ket.is_some(),
            self.dm.is_some(),
        ]
        .iter()
        .filter(|&&s| s)
        .count();

        let context = self.context.unwrap_or_default();
        let settings = context.settings();

        let representation = match (self.gaussian, self.symplectic, self.ket, self.dm) {
            (Some((cov, means)), None, None, None) => {
                let n = gaussian::num_modes(&cov)?;
                if means.len() != 2 * n {
                    return Err(CvError::InvalidState(format!(
                        "means must have length {} for {} modes, got {}",
                        2 * n,
                        n,
                        means.len()
                    )));
                }
                validation::check_covariance(&cov, settings.hbar, settings.tolerance, context.backend())?;
                Representation::Gaussian { cov, means }
            }
            (None, Some((eigenvalues, symplectic)), None, None) => {
                let cov = gaussian::symplectic_to_cov(&eigenvalues, &symplectic)
                    .map_err(|e| CvError::InvalidState(e.to_string()))?;
                validation::check_covariance(&cov, settings.hbar, settings.tolerance, context.backend())?;
                let means = DVector::zeros(cov.nrows());
                Representation::Gaussian { cov, means }
            }
            (None, None, Some(ket), None) => Representation::Fock(FockTensor::Ket(ket)),
            (None, None, None, Some(dm)) => Representation::Fock(FockTensor::Dm(dm)),
            _ => {
                return Err(CvError::InvalidState(format!(
                    "exactly one of (cov, means), (eigenvalues, symplectic), ket or dm is required, got {}",
                    supplied
                )))
            }
        };

        let representation = match representation {
            Representation::Fock(tensor) => {
                tensor.validate()?;
                if self.norm.is_some() {
                    return Err(CvError::InvalidState(
                        "Fock states carry their norm in the tensor".to_string(),
                    ));
                }
                let tensor = match &self.cutoffs {
                    Some(cutoffs) if cutoffs.len() == tensor.num_modes() => {
                        let is_dm = !tensor.is_ket();
                        let padded = fock::pad_or_slice(tensor.array(), cutoffs, is_dm)?;
                        if is_dm {
                            FockTensor::Dm(padded)
                        } else {
                            FockTensor::Ket(padded)
                        }
                    }
                    _ => tensor,
                };
                Representation::Fock(tensor)
            }
            gaussian => gaussian,
        };

        let num_modes = match &representation {
            Representation::Gaussian { cov, .. } => cov.nrows() / 2,
            Representation::Fock(tensor) => tensor.num_modes(),
        };

        let modes = self.modes.unwrap_or_else(|| (0..num_modes).collect());
        if modes.len() != num_modes {
            return Err(CvError::InvalidState(format!(
                "{} mode labels given for a {}-mode state",
                modes.len(),
                num_modes
            )));
        }
        check_unique(&modes)?;

        if let Some(cutoffs) = &self.cutoffs {
            if cutoffs.len() != num_modes || cutoffs.iter().any(|&c| c == 0) {
                return Err(CvError::InvalidState(format!(
                    "cutoffs {:?} do not describe a {}-mode state",
                    cutoffs, num_modes
                )));
            }
        }

        let norm = self.norm.unwrap_or(1.0);
        if !norm.is_finite() || norm < 0.0 {
            return Err(CvError::InvalidState(format!("invalid norm {}", norm)));
        }

        Ok(State {
            modes,
            representation,
            cutoffs_override: self.cutoffs,
            weight: norm,
            normalize_projection: self.normalize_projection,
            context,
            purity: OnceCell::new(),
            fock: OnceCell::new(),
            probabilities: OnceCell::new(),
            cutoffs: OnceCell::new(),
        })
    }
}

fn check_unique(modes: &[usize]) -> Result<()> {
    for (k, m) in modes.iter().enumerate() {
        if modes[..k].contains(m) {
            return Err(CvError::InvalidState(format!("duplicate mode label {}", m)));
        }
    }
    Ok(())
}

fn scale_tensor(tensor: FockTensor, weight: f64) -> FockTensor {
    if weight == 1.0 {
        return tensor;
    }
    match tensor {
        FockTensor::Ket(ket) => FockTensor::Ket(ket.mapv(|z| z * weight.sqrt())),
        FockTensor::Dm(dm) => FockTensor::Dm(dm.mapv(|z| z * weight)),
    }
}

fn doubled(cutoffs: &[usize]) -> Vec<usize> {
    cutoffs.iter().chain(cutoffs.iter()).copied().collect()
}

/// A multi-mode continuous-variable state
///
/// # Example
///
/// ```
/// use simcv_state::preparations;
/// use simcv_state::Context;
///
/// let ctx = Context::default();
/// let a = preparations::coherent(&ctx, &[0.3], &[0.0]).unwrap();
/// let b = preparations::vacuum(&ctx, 1).unwrap();
/// let joint = (&a & &b).unwrap();
/// assert_eq!(joint.modes(), &[0, 1]);
/// assert_eq!(joint.get_modes(&[0]).unwrap(), a);
/// ```
#[derive(Clone)]
pub struct State {
    modes: Vec<usize>,
    representation: Representation,
    cutoffs_override: Option<Vec<usize>>,
    weight: f64,
    normalize_projection: bool,
    context: Context,
    purity: OnceCell<f64>,
    fock: OnceCell<FockTensor>,
    probabilities: OnceCell<ArrayD<f64>>,
    cutoffs: OnceCell<Vec<usize>>,
}

impl State {
    pub fn builder() -> StateBuilder {
        StateBuilder::default()
    }

    /// Gaussian state derived by the engines (no physicality check)
    pub(crate) fn derived_gaussian(&self, modes: Vec<usize>, cov: DMatrix<f64>, means: DVector<f64>, weight: f64) -> State {
        State {
            modes,
            representation: Representation::Gaussian { cov, means },
            cutoffs_override: None,
            weight,
            normalize_projection: false,
            context: self.context.clone(),
            purity: OnceCell::new(),
            fock: OnceCell::new(),
            probabilities: OnceCell::new(),
            cutoffs: OnceCell::new(),
        }
    }

    pub(crate) fn derived_fock(&self, modes: Vec<usize>, tensor: FockTensor) -> State {
        State {
            modes,
            representation: Representation::Fock(tensor),
            cutoffs_override: None,
            weight: 1.0,
            normalize_projection: false,
            context: self.context.clone(),
            purity: OnceCell::new(),
            fock: OnceCell::new(),
            probabilities: OnceCell::new(),
            cutoffs: OnceCell::new(),
        }
    }

    /// Seed the purity cache with a value known from the inputs
    pub(crate) fn with_purity(self, purity: f64) -> State {
        // A fresh state has an empty cell, so the value is always stored
        let _ = self.purity.set(purity);
        self
    }

    #[inline]
    pub fn modes(&self) -> &[usize] {
        &self.modes
    }

    #[inline]
    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[inline]
    pub fn hbar(&self) -> f64 {
        self.context.hbar()
    }

    #[inline]
    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    #[inline]
    pub fn is_gaussian(&self) -> bool {
        matches!(self.representation, Representation::Gaussian { .. })
    }

    #[inline]
    pub fn normalize_projection(&self) -> bool {
        self.normalize_projection
    }

    /// Copy of this state with the projection normalization flag set
    pub fn with_normalize_projection(&self, normalize: bool) -> State {
        let mut state = self.clone();
        state.normalize_projection = normalize;
        state
    }

    /// Positions of the given labels within this state
    pub fn indices(&self, labels: &[usize]) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(labels.len());
        for (k, label) in labels.iter().enumerate() {
            let position = self
                .modes
                .iter()
                .position(|m| m == label)
                .filter(|_| !labels[..k].contains(label))
                .ok_or_else(|| CvError::invalid_mode(*label, &self.modes))?;
            indices.push(position);
        }
        Ok(indices)
    }

    pub fn cov(&self) -> Option<&DMatrix<f64>> {
        match &self.representation {
            Representation::Gaussian { cov, .. } => Some(cov),
            Representation::Fock(_) => None,
        }
    }

    pub fn means(&self) -> Option<&DVector<f64>> {
        match &self.representation {
            Representation::Gaussian { means, .. } => Some(means),
            Representation::Fock(_) => None,
        }
    }

    pub(crate) fn gaussian_parts(&self) -> Option<(&DMatrix<f64>, &DVector<f64>)> {
        match &self.representation {
            Representation::Gaussian { cov, means } => Some((cov, means)),
            Representation::Fock(_) => None,
        }
    }

    /// Purity `Tr(ρ²)`, in (0, 1]
    pub fn purity(&self) -> Result<f64> {
        self.purity
            .get_or_try_init(|| match &self.representation {
                Representation::Gaussian { cov, .. } => {
                    gaussian::purity(cov, self.hbar(), self.context.backend())
                }
                Representation::Fock(tensor) => fock::purity(tensor),
            })
            .copied()
    }

    pub fn is_pure(&self) -> Result<bool> {
        Ok((self.purity()? - 1.0).abs() < self.context.tolerance())
    }

    pub fn is_mixed(&self) -> Result<bool> {
        Ok(!self.is_pure()?)
    }

    /// Stored weight for Gaussian states, `Σ|ψ|²` or `Re Tr ρ` for Fock states
    pub fn norm(&self) -> f64 {
        match &self.representation {
            Representation::Gaussian { .. } => self.weight,
            Representation::Fock(tensor) => fock::norm(tensor),
        }
    }

    /// Mean photon number of each mode
    pub fn number_means(&self) -> Result<DVector<f64>> {
        match &self.representation {
            Representation::Gaussian { cov, means } => gaussian::number_means(cov, means, self.hbar()),
            Representation::Fock(tensor) => Ok(fock::number_moments(tensor)?.0),
        }
    }

    /// Photon-number covariance between modes (Gaussian states only)
    pub fn number_cov(&self) -> Result<DMatrix<f64>> {
        match &self.representation {
            Representation::Gaussian { cov, means } => gaussian::number_cov(cov, means, self.hbar()),
            Representation::Fock(_) => Err(CvError::Unsupported(
                "number covariance of a Fock state".to_string(),
            )),
        }
    }

    /// Photon-number standard deviation of each mode
    pub fn number_stdev(&self) -> Result<DVector<f64>> {
        match &self.representation {
            Representation::Gaussian { .. } => {
                Ok(self.number_cov()?.diagonal().map(|v| v.max(0.0).sqrt()))
            }
            Representation::Fock(tensor) => Ok(fock::number_moments(tensor)?.1.map(f64::sqrt)),
        }
    }

    /// Per-mode Fock cutoffs: the override, the tensor's extents, or the
    /// automatic choice from photon-number moments
    pub fn cutoffs(&self) -> Result<&[usize]> {
        self.cutoffs
            .get_or_try_init(|| {
                if let Some(cutoffs) = &self.cutoffs_override {
                    return Ok(cutoffs.clone());
                }
                match &self.representation {
                    Representation::Fock(tensor) => Ok(tensor.cutoffs()),
                    Representation::Gaussian { .. } => Ok(fock::autocutoffs(
                        &self.number_stdev()?,
                        &self.number_means()?,
                        &self.context.settings().autocutoff,
                    )),
                }
            })
            .map(Vec::as_slice)
    }

    /// Shape of the Fock tensor: cutoffs for a ket, cutoffs twice for a dm
    pub fn shape(&self) -> Result<Vec<usize>> {
        let cutoffs = self.cutoffs()?;
        let ket = match &self.representation {
            Representation::Fock(tensor) => tensor.is_ket(),
            Representation::Gaussian { .. } => self.is_pure()?,
        };
        Ok(if ket { cutoffs.to_vec() } else { doubled(cutoffs) })
    }

    fn gaussian_fock(&self, cov: &DMatrix<f64>, means: &DVector<f64>, cutoffs: &[usize]) -> Result<FockTensor> {
        let pure = self.is_pure()?;
        let tensor = fock::fock_representation(cov, means, cutoffs, pure, self.hbar(), self.context.backend())?;
        debug!(modes = ?self.modes, cutoffs = ?cutoffs, ket = pure, "materialized Fock representation");
        Ok(scale_tensor(tensor, self.weight))
    }

    /// Fock tensor at the state's cutoffs (computed once for Gaussian states)
    pub fn fock(&self) -> Result<&FockTensor> {
        match &self.representation {
            Representation::Fock(tensor) => Ok(tensor),
            Representation::Gaussian { cov, means } => self.fock.get_or_try_init(|| {
                let cutoffs = self.cutoffs()?.to_vec();
                self.gaussian_fock(cov, means, &cutoffs)
            }),
        }
    }

    /// Fock tensor at explicit cutoffs
    fn fock_at(&self, cutoffs: &[usize]) -> Result<FockTensor> {
        if cutoffs.len() != self.num_modes() {
            return Err(CvError::dimension_mismatch("cutoffs", self.num_modes(), cutoffs.len()));
        }
        if cutoffs == self.cutoffs()? {
            return Ok(self.fock()?.clone());
        }
        match &self.representation {
            Representation::Gaussian { cov, means } => self.gaussian_fock(cov, means, cutoffs),
            Representation::Fock(FockTensor::Ket(ket)) => {
                Ok(FockTensor::Ket(fock::pad_or_slice(ket, cutoffs, false)?))
            }
            Representation::Fock(FockTensor::Dm(dm)) => {
                Ok(FockTensor::Dm(fock::pad_or_slice(dm, cutoffs, true)?))
            }
        }
    }

    /// State vector, at the given cutoffs or the state's own
    ///
    /// Fails with `Unsupported` for mixed states.
    pub fn ket(&self, cutoffs: Option<&[usize]>) -> Result<ArrayD<Complex64>> {
        if self.is_mixed()? {
            return Err(CvError::Unsupported("ket of a mixed state".to_string()));
        }
        let tensor = match cutoffs {
            Some(cutoffs) => self.fock_at(cutoffs)?,
            None => self.fock()?.clone(),
        };
        match tensor {
            FockTensor::Ket(ket) => Ok(ket),
            FockTensor::Dm(dm) => fock::dm_to_ket(&dm, self.context.backend()),
        }
    }

    /// Density matrix, at the given cutoffs or the state's own
    pub fn dm(&self, cutoffs: Option<&[usize]>) -> Result<ArrayD<Complex64>> {
        let tensor = match cutoffs {
            Some(cutoffs) => self.fock_at(cutoffs)?,
            None => self.fock()?.clone(),
        };
        Ok(tensor.to_dm())
    }

    /// Photon-number distribution at the state's cutoffs
    pub fn fock_probabilities(&self) -> Result<&ArrayD<f64>> {
        self.probabilities.get_or_try_init(|| match self.fock()? {
            FockTensor::Ket(ket) => Ok(fock::ket_to_probs(ket)),
            FockTensor::Dm(dm) => fock::dm_to_probs(dm),
        })
    }

    /// Apply a transformation (`state >> transformation`)
    ///
    /// A `State` operand is rejected with `InvalidOperand`.
    pub fn then(&self, other: Operand<'_>) -> Result<State> {
        match other {
            Operand::Transformation(t) => t.apply(self),
            Operand::State(_) => Err(CvError::invalid_operand("State", other.kind())),
        }
    }

    /// Measure `other` with this state, or apply a transformation's dual
    ///
    /// This state's modes must be a subset of the measured state's modes.
    pub fn primal(&self, other: Operand<'_>) -> Result<Projection> {
        match other {
            Operand::Transformation(t) => Ok(Projection::State(t.dual(self)?)),
            Operand::State(measured) => self.project(measured),
        }
    }

    fn project(&self, measured: &State) -> Result<Projection> {
        let indices = measured.indices(&self.modes)?;
        let remaining: Vec<usize> = gaussian::complement(&indices, measured.num_modes())
            .iter()
            .map(|&i| measured.modes[i])
            .collect();

        if let (Some((cov, means)), Some((proj_cov, proj_means))) =
            (measured.gaussian_parts(), self.gaussian_parts())
        {
            let outcome = gaussian::general_dyne(
                cov,
                means,
                proj_cov,
                proj_means,
                &indices,
                measured.hbar(),
                measured.context.backend(),
            )?;
            let probability = outcome.probability * measured.weight * self.weight;
            if remaining.is_empty() {
                return Ok(Projection::Probability(probability));
            }
            let weight = if self.normalize_projection { 1.0 } else { probability };
            let state = measured.derived_gaussian(remaining, outcome.cov, outcome.means, weight);
            return Ok(Projection::State(state));
        }

        debug!(
            measured = ?measured.modes,
            projector = ?self.modes,
            "projection falls back to Fock contraction"
        );
        let target = measured.fock()?;
        let target_cutoffs = target.cutoffs();
        let aligned: Vec<usize> = indices.iter().map(|&i| target_cutoffs[i]).collect();
        let projector = self.fock_at(&aligned)?;

        match fock::contract_states(target, &projector, &indices, self.normalize_projection)? {
            Contracted::Scalar(value) => {
                let probability = if target.is_ket() && projector.is_ket() {
                    value.norm_sqr()
                } else {
                    value.re
                };
                Ok(Projection::Probability(probability))
            }
            Contracted::Tensor(tensor) => Ok(Projection::State(measured.derived_fock(remaining, tensor))),
        }
    }

    /// Tensor product with `other`, whose labels are shifted past this state's
    pub fn compose(&self, other: &State) -> Result<State> {
        let offset = self.modes.iter().max().map_or(0, |m| m + 1);
        let modes: Vec<usize> = self
            .modes
            .iter()
            .copied()
            .chain(other.modes.iter().map(|m| m + offset))
            .collect();

        if let (Some((cov_a, means_a)), Some((cov_b, means_b))) = (self.gaussian_parts(), other.gaussian_parts()) {
            let cov = gaussian::join_covs(&[cov_a, cov_b])?;
            let means = gaussian::join_means(&[means_a, means_b])?;
            return Ok(self.derived_gaussian(modes, cov, means, self.weight * other.weight));
        }

        let tensor = fock::tensor_product(self.fock()?, other.fock()?)?;
        Ok(self.derived_fock(modes, tensor))
    }

    /// Reduced state on the given labels, in the given order
    pub fn get_modes(&self, labels: &[usize]) -> Result<State> {
        let indices = self.indices(labels)?;
        if labels == self.modes.as_slice() {
            return Ok(self.clone());
        }
        match &self.representation {
            Representation::Gaussian { cov, means } => {
                let (cov, _, _) = gaussian::partition_cov(cov, &indices)?;
                let (means, _) = gaussian::partition_means(means, &indices)?;
                Ok(self.derived_gaussian(labels.to_vec(), cov, means, self.weight))
            }
            Representation::Fock(tensor) => {
                let dm = fock::trace(&tensor.to_dm(), &indices)?;
                Ok(self.derived_fock(labels.to_vec(), FockTensor::Dm(dm)))
            }
        }
    }

    /// One reduced state per mode, in label order
    pub fn single_mode_marginals(&self) -> impl Iterator<Item = Result<State>> + '_ {
        self.modes.iter().map(move |&m| self.get_modes(&[m]))
    }

    /// Same state under new labels; representation and caches are kept
    pub fn relabeled(&self, modes: Vec<usize>) -> Result<State> {
        if modes.len() != self.num_modes() {
            return Err(CvError::InvalidState(format!(
                "{} labels given for a {}-mode state",
                modes.len(),
                self.num_modes()
            )));
        }
        check_unique(&modes)?;
        let mut state = self.clone();
        state.modes = modes;
        Ok(state)
    }

    /// Equality within the context tolerance
    ///
    /// Two Gaussian states are compared through their purities and moments.
    /// Otherwise Fock data is compared at the element-wise larger cutoffs of
    /// the two states: kets up to a global phase, mixed states through the
    /// purities and entries of their truncated density matrices.
    pub fn approx_eq(&self, other: &State) -> bool {
        self.try_approx_eq(other).unwrap_or(false)
    }

    fn try_approx_eq(&self, other: &State) -> Result<bool> {
        if self.num_modes() != other.num_modes() {
            return Ok(false);
        }
        let tol = self.context.tolerance().max(other.context.tolerance());

        if let (Some((cov_a, means_a)), Some((cov_b, means_b))) = (self.gaussian_parts(), other.gaussian_parts()) {
            if (self.purity()? - other.purity()?).abs() > tol {
                return Ok(false);
            }
            let close = |a: f64, b: f64| (a - b).abs() <= tol;
            return Ok(means_a.iter().zip(means_b.iter()).all(|(&a, &b)| close(a, b))
                && cov_a.iter().zip(cov_b.iter()).all(|(&a, &b)| close(a, b)));
        }

        let cutoffs: Vec<usize> = self
            .cutoffs()?
            .iter()
            .zip(other.cutoffs()?)
            .map(|(&a, &b)| a.max(b))
            .collect();

        if self.is_pure()? && other.is_pure()? {
            let a = self.ket(Some(&cutoffs))?;
            let b = other.ket(Some(&cutoffs))?;
            let overlap: Complex64 = b.iter().zip(a.iter()).map(|(x, y)| x.conj() * y).sum();
            let phase = if overlap.norm() > 0.0 {
                overlap / overlap.norm()
            } else {
                Complex64::new(1.0, 0.0)
            };
            return Ok(a.iter().zip(b.iter()).all(|(x, y)| (x - y * phase).norm() <= tol));
        }

        let a = FockTensor::Dm(self.dm(Some(&cutoffs))?);
        let b = FockTensor::Dm(other.dm(Some(&cutoffs))?);
        if (fock::purity(&a)? - fock::purity(&b)?).abs() > tol {
            return Ok(false);
        }
        Ok(a.array().iter().zip(b.array().iter()).all(|(x, y)| (x - y).norm() <= tol))
    }

    /// Unnormalized mixture `ρ_self + ρ_other` at this state's cutoffs
    pub fn mix(&self, other: &State) -> Result<(State, Option<Advisory>)> {
        if self.num_modes() != other.num_modes() {
            return Err(CvError::dimension_mismatch("mixture modes", self.num_modes(), other.num_modes()));
        }
        let advisory = (self.is_gaussian() || other.is_gaussian())
            .then(|| Advisory::fock_conversion("mix", &self.modes));

        let cutoffs = self.cutoffs()?.to_vec();
        let sum = self.dm(None)? + other.dm(Some(&cutoffs))?;
        Ok((self.derived_fock(self.modes.clone(), FockTensor::Dm(sum)), advisory))
    }

    /// Multiply the Fock amplitudes by `factor`
    pub fn scale(&self, factor: f64) -> Result<(State, Option<Advisory>)> {
        if !factor.is_finite() {
            return Err(CvError::InvalidParameter(format!("scale factor {} is not finite", factor)));
        }
        let advisory = self
            .is_gaussian()
            .then(|| Advisory::fock_conversion("scale", &self.modes));
        let tensor = match self.fock()? {
            FockTensor::Ket(ket) => FockTensor::Ket(ket.mapv(|z| z * factor)),
            FockTensor::Dm(dm) => FockTensor::Dm(dm.mapv(|z| z * factor)),
        };
        Ok((self.derived_fock(self.modes.clone(), tensor), advisory))
    }

    /// Divide the Fock amplitudes by `divisor`
    pub fn divide(&self, divisor: f64) -> Result<(State, Option<Advisory>)> {
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(CvError::InvalidParameter(format!("cannot divide a state by {}", divisor)));
        }
        self.scale(1.0 / divisor)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("modes", &self.modes)
            .field("representation", &self.representation)
            .field("cutoffs_override", &self.cutoffs_override)
            .field("norm", &self.weight)
            .field("normalize_projection", &self.normalize_projection)
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let purity = self
            .purity()
            .map(|p| format!("{:.6}", p))
            .unwrap_or_else(|_| "n/a".to_string());
        let fock = match &self.representation {
            Representation::Fock(t) if t.is_ket() => "ket",
            Representation::Fock(_) => "dm",
            Representation::Gaussian { .. } if self.fock.get().is_some() => "cached",
            Representation::Gaussian { .. } => "lazy",
        };
        write!(
            f,
            "State(modes={:?}, purity={}, norm={:.6}, gaussian={}, fock={})",
            self.modes,
            purity,
            self.norm(),
            self.is_gaussian(),
            fock
        )?;
        if self.context.settings().debug {
            if let Some((cov, means)) = self.gaussian_parts() {
                write!(f, "\ncov ={}means ={}", cov, means.transpose())?;
            }
        }
        Ok(())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other)
    }
}

impl<'a> BitAnd<&'a State> for &'a State {
    type Output = Result<State>;

    fn bitand(self, other: &'a State) -> Result<State> {
        self.compose(other)
    }
}

impl<'a, T: Transformation + ?Sized> Shr<&'a T> for &'a State {
    type Output = Result<State>;

    fn shr(self, transformation: &'a T) -> Result<State> {
        transformation.apply(self)
    }
}
