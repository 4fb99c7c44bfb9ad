//! Fit configuration.
//!
//! A [`FitConfig`] can be built in code or parsed from a small line-oriented text format:
//!
//! ```text
//! # comment
//! M   20 100 1100          # <axis name> <nbins> <lower> <upper>
//! cos 50 0 1
//! p c2   0 0.1 -1 1        # p <name> <init> <step> <lower> <upper>, exactly 4 times
//! p c4   0 0.1 -1 1
//! p c6   0 0.1 -1 1
//! p phi2 0 0.1 -3.14159 3.14159
//! npar 4                   # number of free coefficients, 0..=4
//! use_chi2_pars true       # seed the likelihood fit with the chi-square result
//! range 1                  # |x| fit range of the likelihood, in (0, 1]
//! verbosity 0              # -1 quiet, 0 normal, 1 verbose, 2 debug
//! threads 0                # 0 global pool, 1 single thread, n dedicated pool
//! ```
use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    basis::{COEFFICIENT_NAMES, N_COEFFICIENTS},
    binning::axis::UniformAxis,
    execution_context::{ExecutionContext, ThreadPolicy},
    minimizer::FitParameter,
    AngfitError, AngfitResult, Float, PI,
};

/// The default name of the auxiliary (binning) axis.
pub const AUX_AXIS: &str = "M";
/// The default name of the angular histogram axis.
pub const ANGULAR_AXIS: &str = "cos";

/// The declaration of one coefficient of the expansion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// The parameter name.
    pub name: String,
    /// The starting value.
    pub init: Float,
    /// The initial step size.
    pub step: Float,
    /// The lower limit.
    pub lower: Float,
    /// The upper limit.
    pub upper: Float,
}

impl ParameterSpec {
    /// Construct a [`ParameterSpec`].
    pub fn new<T: Into<String>>(
        name: T,
        init: Float,
        step: Float,
        lower: Float,
        upper: Float,
    ) -> Self {
        Self {
            name: name.into(),
            init,
            step,
            lower,
            upper,
        }
    }
    /// Validate the step and limits.
    pub fn validate(&self) -> AngfitResult<()> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(AngfitError::InvalidStep {
                name: self.name.clone(),
                step: self.step,
            });
        }
        if !(self.lower < self.upper) {
            return Err(AngfitError::InvalidLimits {
                name: self.name.clone(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
    /// A minimizer parameter starting at `value` (instead of [`ParameterSpec::init`]).
    pub fn to_parameter(&self, value: Float) -> FitParameter {
        FitParameter::new(self.name.clone(), value, self.step).with_limits(self.lower, self.upper)
    }
}

/// The default declarations: `c2`, `c4`, `c6` in $`[-1, 1]`$ and `phi2` in $`[-\pi, \pi]`$,
/// all starting at 0 with step 0.1.
pub fn default_parameters() -> Vec<ParameterSpec> {
    COEFFICIENT_NAMES
        .iter()
        .map(|name| {
            let limit = if *name == "phi2" { PI } else { 1.0 };
            ParameterSpec::new(*name, 0.0, 0.1, -limit, limit)
        })
        .collect()
}

/// Everything needed to bin events and fit every bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Named axes. The auxiliary and the angular axis must be among them.
    pub axes: BTreeMap<String, UniformAxis>,
    /// The coefficient declarations, exactly [`N_COEFFICIENTS`] of them.
    pub parameters: Vec<ParameterSpec>,
    /// The number of free coefficients; coefficients `npar..4` are held at their initial values.
    pub npar: usize,
    /// Whether the likelihood fit starts from the chi-square result.
    pub use_chi2_pars: bool,
    /// The $`|x|`$ range of the likelihood fit.
    pub range: Float,
    /// The minimizer diagnostic level.
    pub verbosity: i32,
    /// The thread count of the likelihood reduction (see [`ThreadPolicy::from_threads`]).
    pub threads: usize,
    /// The name of the axis events are binned in.
    pub aux_axis: String,
    /// The name of the axis of the per-bin angular histograms.
    pub angular_axis: String,
}

impl FitConfig {
    /// A configuration with the given auxiliary and angular axes and default settings.
    pub fn new(aux: UniformAxis, angular: UniformAxis) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(AUX_AXIS.to_string(), aux);
        axes.insert(ANGULAR_AXIS.to_string(), angular);
        Self {
            axes,
            ..Self::empty()
        }
    }
    fn empty() -> Self {
        Self {
            axes: BTreeMap::new(),
            parameters: default_parameters(),
            npar: N_COEFFICIENTS,
            use_chi2_pars: false,
            range: 1.0,
            verbosity: 0,
            threads: 0,
            aux_axis: AUX_AXIS.to_string(),
            angular_axis: ANGULAR_AXIS.to_string(),
        }
    }
    /// Add (or replace) a named axis.
    pub fn with_axis<T: Into<String>>(mut self, name: T, axis: UniformAxis) -> Self {
        self.axes.insert(name.into(), axis);
        self
    }
    /// Replace the declaration of the coefficient at `index`.
    pub fn with_parameter(mut self, index: usize, spec: ParameterSpec) -> AngfitResult<Self> {
        let count = self.parameters.len();
        let slot = self
            .parameters
            .get_mut(index)
            .ok_or(AngfitError::ParameterIndexError { index, count })?;
        *slot = spec;
        Ok(self)
    }
    /// Set the number of free coefficients.
    pub fn with_npar(mut self, npar: usize) -> Self {
        self.npar = npar;
        self
    }
    /// Seed the likelihood fit with the chi-square result.
    pub fn with_chi2_seeding(mut self, use_chi2_pars: bool) -> Self {
        self.use_chi2_pars = use_chi2_pars;
        self
    }
    /// Set the likelihood fit range.
    pub fn with_range(mut self, range: Float) -> Self {
        self.range = range;
        self
    }
    /// Set the minimizer diagnostic level.
    pub fn with_verbosity(mut self, verbosity: i32) -> Self {
        self.verbosity = verbosity;
        self
    }
    /// Set the thread count of the likelihood reduction.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
    /// Use differently named auxiliary and angular axes.
    pub fn with_axis_names<A: Into<String>, B: Into<String>>(
        mut self,
        aux: A,
        angular: B,
    ) -> Self {
        self.aux_axis = aux.into();
        self.angular_axis = angular.into();
        self
    }

    /// Check every setting which could otherwise only fail once events are being fit.
    pub fn validate(&self) -> AngfitResult<()> {
        self.aux()?;
        self.angular()?;
        match self.parameters.len() {
            n if n < N_COEFFICIENTS => {
                return Err(AngfitError::MissingParameters {
                    expected: N_COEFFICIENTS,
                    found: n,
                })
            }
            n if n > N_COEFFICIENTS => {
                return Err(AngfitError::ExtraParameter {
                    name: self.parameters[N_COEFFICIENTS].name.clone(),
                })
            }
            _ => {}
        }
        for parameter in &self.parameters {
            parameter.validate()?;
        }
        if self.npar > N_COEFFICIENTS {
            return Err(AngfitError::TooManyParameters {
                requested: self.npar,
                max: N_COEFFICIENTS,
            });
        }
        if !(self.range > 0.0 && self.range <= 1.0) {
            return Err(AngfitError::InvalidFitRange { range: self.range });
        }
        Ok(())
    }

    fn axis(&self, name: &str) -> AngfitResult<&UniformAxis> {
        self.axes.get(name).ok_or_else(|| AngfitError::MissingEntry {
            key: name.to_string(),
        })
    }
    /// The auxiliary axis.
    pub fn aux(&self) -> AngfitResult<&UniformAxis> {
        self.axis(&self.aux_axis)
    }
    /// The angular axis.
    pub fn angular(&self) -> AngfitResult<&UniformAxis> {
        self.axis(&self.angular_axis)
    }
    /// The [`ExecutionContext`] matching [`FitConfig::threads`].
    pub fn execution_context(&self) -> AngfitResult<ExecutionContext> {
        let policy = if cfg!(feature = "rayon") {
            ThreadPolicy::from_threads(self.threads)
        } else {
            ThreadPolicy::Single
        };
        ExecutionContext::new(policy)
    }
}

fn parse_token<T: FromStr>(token: Option<&str>, key: &str) -> AngfitResult<T> {
    let token = token.ok_or_else(|| AngfitError::MissingEntry {
        key: key.to_string(),
    })?;
    token.parse().map_err(|_| AngfitError::ParseError {
        name: token.to_string(),
        object: key.to_string(),
    })
}

fn parse_bool(token: Option<&str>, key: &str) -> AngfitResult<bool> {
    match token {
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        other => parse_token(other, key),
    }
}

impl FromStr for FitConfig {
    type Err = AngfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = Self::empty();
        config.parameters.clear();
        for line in s.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            match key {
                "p" => {
                    let name: String = parse_token(tokens.next(), "parameter name")?;
                    if config.parameters.len() == N_COEFFICIENTS {
                        return Err(AngfitError::ExtraParameter { name });
                    }
                    let init = parse_token(tokens.next(), &format!("{} init", name))?;
                    let step = parse_token(tokens.next(), &format!("{} step", name))?;
                    let lower = parse_token(tokens.next(), &format!("{} lower", name))?;
                    let upper = parse_token(tokens.next(), &format!("{} upper", name))?;
                    config
                        .parameters
                        .push(ParameterSpec::new(name, init, step, lower, upper));
                }
                "npar" => config.npar = parse_token(tokens.next(), key)?,
                "use_chi2_pars" => config.use_chi2_pars = parse_bool(tokens.next(), key)?,
                "range" => config.range = parse_token(tokens.next(), key)?,
                "verbosity" => config.verbosity = parse_token(tokens.next(), key)?,
                "threads" => config.threads = parse_token(tokens.next(), key)?,
                name => {
                    let nbins = parse_token(tokens.next(), &format!("{} nbins", name))?;
                    let lower = parse_token(tokens.next(), &format!("{} lower", name))?;
                    let upper = parse_token(tokens.next(), &format!("{} upper", name))?;
                    config
                        .axes
                        .insert(name.to_string(), UniformAxis::new(nbins, lower, upper)?);
                }
            }
            if let Some(extra) = tokens.next() {
                return Err(AngfitError::ParseError {
                    name: extra.to_string(),
                    object: format!("end of \"{}\" line", key),
                });
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::axis::Axis;

    const CONFIG: &str = "
        # test configuration
        M 4 100 500
        cos 20 0 1   # angular histogram
        p c2   0.1 0.1 -1 1
        p c4   0   0.1 -1 1
        p c6   0   0.1 -1 1
        p phi2 0   0.1 -3.2 3.2
        npar 2
        use_chi2_pars true
        range 0.8
        verbosity -1
        threads 2
    ";

    #[test]
    fn test_parse() {
        let config: FitConfig = CONFIG.parse().unwrap();
        assert_eq!(config.aux().unwrap().nbins(), 4);
        assert_eq!(config.angular().unwrap().nbins(), 20);
        assert_eq!(config.parameters.len(), 4);
        assert_eq!(config.parameters[0].name, "c2");
        assert_eq!(config.parameters[0].init, 0.1);
        assert_eq!(config.parameters[3].upper, 3.2);
        assert_eq!(config.npar, 2);
        assert!(config.use_chi2_pars);
        assert_eq!(config.range, 0.8);
        assert_eq!(config.verbosity, -1);
        assert_eq!(config.threads, 2);
        assert_eq!(
            serde_json::to_string(&config.axes).unwrap(),
            r#"{"M":[4,100.0,500.0],"cos":[20,0.0,1.0]}"#
        );
    }

    #[test]
    fn test_parameter_count_errors() {
        let missing = "M 4 100 500\ncos 20 0 1\np c2 0 0.1 -1 1\n";
        assert!(matches!(
            missing.parse::<FitConfig>(),
            Err(AngfitError::MissingParameters {
                expected: 4,
                found: 1
            })
        ));
        let extra = format!("{}p c8 0 0.1 -1 1\n", CONFIG);
        assert!(matches!(
            extra.parse::<FitConfig>(),
            Err(AngfitError::ExtraParameter { name }) if name == "c8"
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let bad_axis = CONFIG.replace("M 4 100 500", "M 0 100 500");
        assert!(matches!(
            bad_axis.parse::<FitConfig>(),
            Err(AngfitError::InvalidAxis { .. })
        ));
        let bad_npar = CONFIG.replace("npar 2", "npar 5");
        assert!(matches!(
            bad_npar.parse::<FitConfig>(),
            Err(AngfitError::TooManyParameters {
                requested: 5,
                max: 4
            })
        ));
        let bad_range = CONFIG.replace("range 0.8", "range 1.5");
        assert!(matches!(
            bad_range.parse::<FitConfig>(),
            Err(AngfitError::InvalidFitRange { .. })
        ));
        let bad_limits = CONFIG.replace("p c4   0   0.1 -1 1", "p c4 0 0.1 1 -1");
        assert!(matches!(
            bad_limits.parse::<FitConfig>(),
            Err(AngfitError::InvalidLimits { .. })
        ));
        let no_aux = CONFIG.replace("M 4 100 500", "");
        assert!(matches!(
            no_aux.parse::<FitConfig>(),
            Err(AngfitError::MissingEntry { key }) if key == "M"
        ));
        let trailing = CONFIG.replace("npar 2", "npar 2 3");
        assert!(matches!(
            trailing.parse::<FitConfig>(),
            Err(AngfitError::ParseError { .. })
        ));
        let not_a_number = CONFIG.replace("range 0.8", "range wide");
        assert!(matches!(
            not_a_number.parse::<FitConfig>(),
            Err(AngfitError::ParseError { .. })
        ));
    }

    #[test]
    fn test_builder() {
        let config = FitConfig::new(
            UniformAxis::new(2, 0.0, 10.0).unwrap(),
            UniformAxis::new(10, -1.0, 1.0).unwrap(),
        )
        .with_npar(3)
        .with_range(0.9)
        .with_parameter(0, ParameterSpec::new("a2", 0.2, 0.05, -2.0, 2.0))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.parameters[0].name, "a2");
        assert_eq!(config.parameters[3].name, "phi2");
        assert_eq!(config.parameters[3].upper, PI);
        assert!(config.clone().with_parameter(4, config.parameters[0].clone()).is_err());
        assert!(config.with_npar(7).validate().is_err());
    }
}
