use std::{convert::Infallible, sync::Arc};

use ganesh::{
    algorithms::{
        nelder_mead::{NelderMeadFTerminator, SimplexConstructionMethod},
        NelderMead, LBFGSB,
    },
    Algorithm, Function, Minimizer, Observer, Status,
};
use nalgebra::DMatrix;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{AngfitError, AngfitResult, Float};

/// The value handed to the minimizer in place of a non-finite objective value.
pub const PENALTY: Float = 1e30;

/// The change in the objective which defines a one-sigma error. Both the $`\chi^2`$ and the
/// $`-2\ln\mathcal{L}`$ objectives use 1.
pub const ERROR_DEF: Float = 1.0;

/// A scalar objective of a fixed number of parameters.
///
/// Implementations may return non-finite values for points outside of their domain; the
/// minimizer treats those points as rejected rather than failing.
pub trait Objective: Sync {
    /// Evaluate the objective at `parameters`.
    fn evaluate(&self, parameters: &[Float]) -> Float;
}

impl<F: Fn(&[Float]) -> Float + Sync> Objective for F {
    fn evaluate(&self, parameters: &[Float]) -> Float {
        self(parameters)
    }
}

/// A single declared parameter of a [`ParameterFitter`].
///
/// Infinite limits mean the parameter is unbounded on that side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    /// The parameter name.
    pub name: String,
    /// The starting value (or the held value, if fixed).
    pub value: Float,
    /// The initial step size.
    pub step: Float,
    /// The lower limit.
    pub lower: Float,
    /// The upper limit.
    pub upper: Float,
    /// Whether the parameter is held at [`FitParameter::value`].
    pub fixed: bool,
}

impl FitParameter {
    /// Create a free, unbounded parameter.
    pub fn new<T: Into<String>>(name: T, value: Float, step: Float) -> Self {
        Self {
            name: name.into(),
            value,
            step,
            lower: Float::NEG_INFINITY,
            upper: Float::INFINITY,
            fixed: false,
        }
    }
    /// Set the limits of the parameter.
    pub fn with_limits(mut self, lower: Float, upper: Float) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }
    /// Hold the parameter at its value.
    pub fn as_fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
    fn validate(&self) -> AngfitResult<()> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(AngfitError::InvalidStep {
                name: self.name.clone(),
                step: self.step,
            });
        }
        if self.lower.is_nan()
            || self.upper.is_nan()
            || self.lower >= self.upper
            || self.lower == Float::INFINITY
            || self.upper == Float::NEG_INFINITY
        {
            return Err(AngfitError::InvalidLimits {
                name: self.name.clone(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
    fn clamp(&self, value: Float) -> Float {
        value.max(self.lower).min(self.upper)
    }
    /// The first simplex vertex along this parameter: one step up, or one step down when that
    /// would leave the limits.
    fn stepped(&self) -> Float {
        let up = self.clamp(self.value + self.step);
        if up != self.value {
            up
        } else {
            self.clamp(self.value - self.step)
        }
    }
}

/// The [`ganesh`] algorithm run by a [`ParameterFitter`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitAlgorithm {
    /// The Nelder-Mead simplex, started from one step along every free parameter. Limits are
    /// applied by [`ganesh`]'s MINUIT-style change of variables.
    #[default]
    NelderMead,
    /// L-BFGS-B with finite-difference gradients and native limits.
    LBFGSB,
}

impl FitAlgorithm {
    /// The algorithm actually run for `n_free` free parameters. A simplex needs at least two
    /// dimensions, so smaller problems always run [`FitAlgorithm::LBFGSB`].
    pub fn for_dimension(self, n_free: usize) -> Self {
        if n_free < 2 {
            Self::LBFGSB
        } else {
            self
        }
    }

    fn build(self, free: &[&FitParameter]) -> Box<dyn Algorithm<(), Infallible>> {
        match self {
            Self::NelderMead => {
                let origin: Vec<Float> = free.iter().map(|p| p.value).collect();
                let mut simplex = vec![origin.clone()];
                for (i, parameter) in free.iter().enumerate() {
                    let mut vertex = origin.clone();
                    vertex[i] = parameter.stepped();
                    simplex.push(vertex);
                }
                Box::new(
                    NelderMead::default()
                        .with_construction_method(SimplexConstructionMethod::Custom { simplex })
                        .with_terminator_f(NelderMeadFTerminator::StdDev {
                            tol_f_abs: Float::EPSILON.sqrt(),
                        })
                        .with_no_error_calculation(),
                )
            }
            Self::LBFGSB => Box::new(LBFGSB::<(), Infallible>::default()),
        }
    }
}

/// Logs every step of a minimization: the objective, and at higher verbosity the current best
/// value of every free parameter.
struct ProgressObserver {
    names: Vec<String>,
    show_values: bool,
}

impl Observer<()> for ProgressObserver {
    fn callback(&mut self, step: usize, status: &mut Status, _user_data: &mut ()) -> bool {
        if self.show_values {
            let values = self
                .names
                .iter()
                .zip(status.x.iter())
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(" ");
            info!(step, fx = status.fx, %values, "minimizer step");
        } else {
            info!(step, fx = status.fx, "minimizer step");
        }
        false
    }
}

/// The outcome of [`ParameterFitter::minimize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Minimum {
    /// Best values of every declared parameter, fixed ones included.
    pub values: Vec<Float>,
    /// Errors of every declared parameter: zero for fixed ones, infinite for free ones the
    /// objective does not constrain, `NaN` if the curvature could not be evaluated.
    pub errors: Vec<Float>,
    /// The objective at [`Minimum::values`].
    pub fx: Float,
    /// Whether the algorithm reported convergence.
    pub converged: bool,
    /// The algorithm's final status message.
    pub message: String,
}

/// Drives an [`Objective`] through a [`ganesh`] minimizer.
///
/// Parameters are declared up front with a starting value, a step size and optional limits.
/// Fixed parameters are excluded from the free set but still passed to the objective, and
/// limits are handed to the [`Minimizer`] as bounds.
///
/// After minimization, errors are read from the finite-difference Hessian of the objective
/// at the minimum as $`\sigma_i = \sqrt{2\,\mathrm{UP}\,C_{ii}}`$ with $`\mathrm{UP} = 1`$,
/// where $`C`$ is the covariance [`Status::set_hess`] derives from it.
#[derive(Clone, Debug)]
pub struct ParameterFitter {
    parameters: Vec<FitParameter>,
    algorithm: FitAlgorithm,
    verbosity: i32,
    max_steps: usize,
    minimum: Option<Minimum>,
}

impl Default for ParameterFitter {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            algorithm: FitAlgorithm::default(),
            verbosity: 0,
            max_steps: 4000,
            minimum: None,
        }
    }
}

/// The objective seen by the algorithm: free values in, penalized objective out.
struct Problem<'a> {
    objective: &'a dyn Objective,
    parameters: &'a [FitParameter],
    free: &'a [usize],
}

impl Problem<'_> {
    fn point(&self, free_values: &[Float]) -> Vec<Float> {
        let mut x: Vec<Float> = self.parameters.iter().map(|p| p.value).collect();
        for (&i, &value) in self.free.iter().zip(free_values) {
            x[i] = value;
        }
        x
    }
}

impl Function<(), Infallible> for Problem<'_> {
    fn evaluate(&self, x: &[Float], _user_data: &mut ()) -> Result<Float, Infallible> {
        let fx = self.objective.evaluate(&self.point(x));
        Ok(if fx.is_finite() { fx } else { PENALTY })
    }
}

struct NonFiniteObjective;

/// The unpenalized objective, used for the curvature at the minimum.
struct Curvature<'a, 'b>(&'a Problem<'b>);

impl Function<(), NonFiniteObjective> for Curvature<'_, '_> {
    fn evaluate(&self, x: &[Float], _user_data: &mut ()) -> Result<Float, NonFiniteObjective> {
        let fx = self.0.objective.evaluate(&self.0.point(x));
        if fx.is_finite() {
            Ok(fx)
        } else {
            Err(NonFiniteObjective)
        }
    }
}

impl ParameterFitter {
    /// Create a fitter with no parameters.
    pub fn new() -> Self {
        Self::default()
    }
    /// Declare the next parameter and return its index.
    pub fn define_parameter(&mut self, parameter: FitParameter) -> AngfitResult<usize> {
        parameter.validate()?;
        let mut parameter = parameter;
        parameter.value = parameter.clamp(parameter.value);
        self.parameters.push(parameter);
        self.minimum = None;
        Ok(self.parameters.len() - 1)
    }
    /// The declared parameters.
    pub fn parameters(&self) -> &[FitParameter] {
        &self.parameters
    }
    fn parameter_mut(&mut self, index: usize) -> AngfitResult<&mut FitParameter> {
        let count = self.parameters.len();
        self.parameters
            .get_mut(index)
            .ok_or(AngfitError::ParameterIndexError { index, count })
    }
    /// Hold a parameter at its current value.
    pub fn fix_parameter(&mut self, index: usize) -> AngfitResult<()> {
        self.parameter_mut(index)?.fixed = true;
        Ok(())
    }
    /// Let a fixed parameter float again.
    pub fn release_parameter(&mut self, index: usize) -> AngfitResult<()> {
        self.parameter_mut(index)?.fixed = false;
        Ok(())
    }
    /// Set the starting (or held) value of a parameter. The value is clamped to its limits.
    pub fn set_value(&mut self, index: usize, value: Float) -> AngfitResult<()> {
        let parameter = self.parameter_mut(index)?;
        parameter.value = parameter.clamp(value);
        Ok(())
    }
    /// Set the diagnostic level: `1` logs the objective at every step and `2` and above also
    /// the free parameter values. This has no effect on the numbers produced.
    pub fn set_verbosity(&mut self, verbosity: i32) {
        self.verbosity = verbosity;
    }
    /// Set the maximum number of algorithm steps (default: 4000).
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
    /// Set the algorithm (default: [`FitAlgorithm::NelderMead`]).
    pub fn with_algorithm(mut self, algorithm: FitAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
    /// The indices of the parameters which are not fixed.
    pub fn free_indices(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter_map(|(i, p)| (!p.fixed).then_some(i))
            .collect()
    }

    /// Minimize `objective` over the free parameters.
    pub fn minimize(&mut self, objective: &dyn Objective) -> &Minimum {
        let free = self.free_indices();
        let problem = Problem {
            objective,
            parameters: &self.parameters,
            free: &free,
        };
        let mut errors = vec![0.0; self.parameters.len()];
        let (values, converged, message) = if free.is_empty() {
            (problem.point(&[]), true, "no free parameters".to_string())
        } else {
            let declared: Vec<&FitParameter> = free.iter().map(|&i| &self.parameters[i]).collect();
            let x0: Vec<Float> = declared.iter().map(|p| p.value).collect();
            let bounds = declared.iter().map(|p| (p.lower, p.upper)).collect();
            let algorithm = self.algorithm.for_dimension(free.len());
            let mut m = Minimizer::new(algorithm.build(&declared), free.len())
                .with_bounds(Some(bounds))
                .with_max_steps(self.max_steps);
            if self.verbosity > 0 {
                m = m.with_observer(Arc::new(RwLock::new(ProgressObserver {
                    names: declared.iter().map(|p| p.name.clone()).collect(),
                    show_values: self.verbosity > 1,
                })));
            }
            m.minimize(&problem, &x0, &mut ())
                .unwrap_or_else(|never| match never {});
            for (&i, sigma) in free.iter().zip(free_errors(&problem, &mut m.status)) {
                errors[i] = sigma;
            }
            let best: Vec<Float> = m.status.x.iter().copied().collect();
            (problem.point(&best), m.status.converged, m.status.message.clone())
        };
        let fx = objective.evaluate(&values);
        debug!(fx, converged, %message, "minimization finished");
        if !converged {
            warn!(%message, "minimization did not converge");
        }
        self.minimum.insert(Minimum {
            values,
            errors,
            fx,
            converged,
            message,
        })
    }

    /// The `(value, error)` of a parameter: the fitted values after [`ParameterFitter::minimize`],
    /// or the starting value with zero error before.
    pub fn parameter(&self, index: usize) -> AngfitResult<(Float, Float)> {
        let count = self.parameters.len();
        if index >= count {
            return Err(AngfitError::ParameterIndexError { index, count });
        }
        Ok(match &self.minimum {
            Some(minimum) => (minimum.values[index], minimum.errors[index]),
            None => (self.parameters[index].value, 0.0),
        })
    }

    /// The result of the last minimization, if any.
    pub fn minimum(&self) -> Option<&Minimum> {
        self.minimum.as_ref()
    }
}

/// Errors of the free parameters at `status.x`. The Hessian and covariance are stored in
/// `status`; parameters with weight along a flat or non-convex direction get an infinite error.
fn free_errors(problem: &Problem, status: &mut Status) -> Vec<Float> {
    let n = status.x.len();
    let Ok(hessian) = Curvature(problem).hessian(status.x.as_slice(), &mut ()) else {
        warn!("objective is not finite around the minimum, errors are undefined");
        return vec![Float::NAN; n];
    };
    let (unconstrained, threshold) = unconstrained_parameters(&hessian);
    if unconstrained.contains(&true) {
        warn!("Hessian is singular, unconstrained parameters get infinite errors");
        status.hess = Some(hessian.clone());
        status.set_cov(hessian.pseudo_inverse(threshold).ok());
    } else {
        status.set_hess(&hessian);
    }
    let Some(covariance) = &status.cov else {
        return vec![Float::NAN; n];
    };
    unconstrained
        .iter()
        .enumerate()
        .map(|(i, &flat)| {
            if flat {
                Float::INFINITY
            } else {
                (2.0 * ERROR_DEF * covariance[(i, i)]).sqrt()
            }
        })
        .collect()
}

/// Flags the parameters which have weight in an eigen-direction of `hessian` whose eigenvalue
/// is not clearly positive, and returns the eigenvalue threshold used.
fn unconstrained_parameters(hessian: &DMatrix<Float>) -> (Vec<bool>, Float) {
    let tolerance = Float::cbrt(Float::EPSILON);
    let eigen = hessian.clone().symmetric_eigen();
    let threshold = eigen.eigenvalues.amax() * tolerance;
    let mut flags = vec![false; hessian.nrows()];
    for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda <= threshold {
            for (i, flag) in flags.iter_mut().enumerate() {
                *flag |= eigen.eigenvectors[(i, k)].powi(2) > tolerance;
            }
        }
    }
    (flags, threshold)
}
