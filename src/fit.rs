use std::{fmt::Display, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    basis::{canonical_phase, N_COEFFICIENTS, PHASE_INDEX},
    binning::{
        accumulators::{Accumulator, Category, CategoryBin, RawSample, Uncategorized},
        axis::{Axis, AxisSpec, UniformAxis},
        histogram::Histogram,
        Binner,
    },
    config::{FitConfig, ParameterSpec},
    data::{Event, RunTotals, WeightedValue},
    execution_context::ExecutionContext,
    likelihoods::{ChiSquare, LogLikelihood},
    minimizer::{FitParameter, Minimum, ParameterFitter},
    output::{FitRecord, FitSink},
    AngfitError, AngfitResult, Float,
};

/// The name of the overall scale parameter of the chi-square fit.
pub const SCALE_NAME: &str = "A";

/// The two fits run in every bin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitKind {
    /// Least-squares fit to the bin's angular histogram.
    #[serde(rename = "chi2")]
    Chi2,
    /// Unbinned maximum-likelihood fit to the bin's raw sample.
    #[serde(rename = "logl")]
    LogL,
}

impl FitKind {
    /// The title of a fit record with the given objective value, `"chi2 = v"` or
    /// `"-2LogL = v"`.
    pub fn title(&self, objective: Float) -> String {
        match self {
            FitKind::Chi2 => format!("chi2 = {}", objective),
            FitKind::LogL => format!("-2LogL = {}", objective),
        }
    }
}

impl Display for FitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitKind::Chi2 => write!(f, "chi2"),
            FitKind::LogL => write!(f, "logl"),
        }
    }
}

impl FromStr for FitKind {
    type Err = AngfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chi2" | "chisq" | "chi-square" => Ok(Self::Chi2),
            "logl" | "nll" | "likelihood" => Ok(Self::LogL),
            _ => Err(AngfitError::ParseError {
                name: s.to_string(),
                object: "FitKind".to_string(),
            }),
        }
    }
}

/// The outcome of one fit of one bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Which fit produced this result.
    pub kind: FitKind,
    /// Parameter name to `(value, error)`, in declaration order.
    pub parameters: IndexMap<String, (Float, Float)>,
    /// The objective at the best point (`NaN` if the bin was not fit).
    pub objective: Float,
    /// Whether the minimizer converged.
    pub converged: bool,
}

impl FitResult {
    fn from_minimum(kind: FitKind, parameters: &[FitParameter], minimum: &Minimum) -> Self {
        Self {
            kind,
            parameters: parameters
                .iter()
                .zip(minimum.values.iter().zip(&minimum.errors))
                .map(|(p, (&v, &e))| (p.name.clone(), (v, e)))
                .collect(),
            objective: minimum.fx,
            converged: minimum.converged,
        }
    }
    /// A placeholder for a bin which could not be fit: starting values, zero errors, no
    /// objective.
    pub fn unfitted(kind: FitKind, parameters: &[FitParameter]) -> Self {
        Self {
            kind,
            parameters: parameters
                .iter()
                .map(|p| (p.name.clone(), (p.value, 0.0)))
                .collect(),
            objective: Float::NAN,
            converged: false,
        }
    }
    /// The fitted values, in declaration order.
    pub fn values(&self) -> Vec<Float> {
        self.parameters.values().map(|(v, _)| *v).collect()
    }
    /// The errors, in declaration order.
    pub fn errors(&self) -> Vec<Float> {
        self.parameters.values().map(|(_, e)| *e).collect()
    }
    /// The `(value, error)` of a named parameter.
    pub fn get(&self, name: &str) -> Option<(Float, Float)> {
        self.parameters.get(name).copied()
    }
}

/// Settings of the per-bin fit pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// The coefficient declarations.
    pub parameters: Vec<ParameterSpec>,
    /// The number of free coefficients.
    pub npar: usize,
    /// Whether the likelihood fit starts from the chi-square result.
    pub use_chi2_pars: bool,
    /// The $`|x|`$ range of the likelihood fit.
    pub range: Float,
    /// The minimizer diagnostic level.
    pub verbosity: i32,
    /// The maximum number of minimizer steps per fit.
    pub max_steps: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            parameters: crate::config::default_parameters(),
            npar: N_COEFFICIENTS,
            use_chi2_pars: false,
            range: 1.0,
            verbosity: 0,
            max_steps: 4000,
        }
    }
}

impl FitOptions {
    /// Options taken from a [`FitConfig`].
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            parameters: config.parameters.clone(),
            npar: config.npar,
            use_chi2_pars: config.use_chi2_pars,
            range: config.range,
            verbosity: config.verbosity,
            ..Default::default()
        }
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
    /// Set the maximum number of minimizer steps per fit.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
    /// Check the options before any bin is fit.
    pub fn validate(&self) -> AngfitResult<()> {
        if self.parameters.len() != N_COEFFICIENTS {
            return Err(AngfitError::MissingParameters {
                expected: N_COEFFICIENTS,
                found: self.parameters.len(),
            });
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
}

/// Everything produced for one bin of the auxiliary axis.
#[derive(Clone, Debug)]
pub struct BinFit {
    /// The auxiliary axis bin index (1-based).
    pub index: usize,
    /// The lower edge of the bin.
    pub lower: Float,
    /// The upper edge of the bin.
    pub upper: Float,
    /// The bin label, `"<aux>[lower,upper)"`.
    pub label: String,
    /// The name of the angular histogram, `"<angular>-<label>"`.
    pub histogram_name: String,
    /// The angular histogram of the bin.
    pub histogram: Histogram,
    /// The number of events in the bin.
    pub events: usize,
    /// The chi-square fit.
    pub chi2: FitResult,
    /// The likelihood fit.
    pub logl: FitResult,
}

impl BinFit {
    /// The result of the given fit.
    pub fn result(&self, kind: FitKind) -> &FitResult {
        match kind {
            FitKind::Chi2 => &self.chi2,
            FitKind::LogL => &self.logl,
        }
    }
    /// The persistable records of both fits.
    pub fn records(&self) -> [FitRecord; 2] {
        [
            FitRecord::new(&self.label, &self.chi2),
            FitRecord::new(&self.label, &self.logl),
        ]
    }
}

/// Runs the chi-square and the likelihood fit of a single bin.
#[derive(Debug)]
pub struct BinFitter {
    options: FitOptions,
    angular: UniformAxis,
    ctx: ExecutionContext,
}

impl BinFitter {
    /// Create a [`BinFitter`] for angular histograms over `angular`.
    pub fn new(options: FitOptions, angular: UniformAxis) -> AngfitResult<Self> {
        Self::with_context(options, angular, ExecutionContext::default())
    }
    /// Create a [`BinFitter`] which reduces likelihoods under `ctx`.
    pub fn with_context(
        options: FitOptions,
        angular: UniformAxis,
        ctx: ExecutionContext,
    ) -> AngfitResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            angular,
            ctx,
        })
    }
    /// The pipeline settings.
    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    fn coefficient_fitter(&self, values: &[Float]) -> AngfitResult<ParameterFitter> {
        let mut fitter = ParameterFitter::new().with_max_steps(self.options.max_steps);
        fitter.set_verbosity(self.options.verbosity);
        for (spec, &value) in self.options.parameters.iter().zip(values) {
            fitter.define_parameter(spec.to_parameter(value))?;
        }
        for i in self.options.npar..N_COEFFICIENTS {
            fitter.fix_parameter(i)?;
        }
        Ok(fitter)
    }

    fn canonicalize(&self, result: &mut FitResult, fitter: &ParameterFitter) {
        if !fitter.parameters()[PHASE_INDEX].fixed {
            if let Some((_, (value, _))) = result.parameters.get_index_mut(PHASE_INDEX) {
                *value = canonical_phase(*value);
            }
        }
    }

    /// Fit the histogram of `sample` by least squares, then `sample` itself by maximum
    /// likelihood. Returns the histogram and both results.
    ///
    /// The chi-square fit needs positive weight in the histogram and the likelihood fit needs
    /// positive weight inside the fit range. A fit without it is not run and its result is
    /// [`FitResult::unfitted`].
    pub fn fit_sample(
        &self,
        sample: &[WeightedValue],
    ) -> AngfitResult<(Histogram, FitResult, FitResult)> {
        let mut histogram = Histogram::new(self.angular);
        for value in sample {
            histogram.observe(*value);
        }
        let inits: Vec<Float> = self.options.parameters.iter().map(|p| p.init).collect();

        let total_w = histogram.total_weight();
        let mut chi2_fitter = self.coefficient_fitter(&inits)?;
        let chi2 = if total_w > 0.0 {
            let scale = total_w / self.angular.nbins() as Float;
            chi2_fitter.define_parameter(self.scale_parameter(scale))?;
            let minimum = chi2_fitter.minimize(&ChiSquare::new(&histogram)).clone();
            let mut chi2 =
                FitResult::from_minimum(FitKind::Chi2, chi2_fitter.parameters(), &minimum);
            self.canonicalize(&mut chi2, &chi2_fitter);
            info!(kind = %FitKind::Chi2, objective = chi2.objective, converged = chi2.converged);
            chi2
        } else {
            warn!(kind = %FitKind::Chi2, events = sample.len(), total_w, "nothing to fit");
            chi2_fitter.define_parameter(self.scale_parameter(1.0))?;
            FitResult::unfitted(FitKind::Chi2, chi2_fitter.parameters())
        };

        let likelihood = LogLikelihood::new(sample, self.options.range)?.with_context(&self.ctx);
        let mut logl_fitter = self.coefficient_fitter(&inits)?;
        let in_range = likelihood.weight_in_range();
        let logl = if in_range > 0.0 {
            if self.options.use_chi2_pars && chi2.objective.is_finite() {
                for (i, seed) in chi2.values().into_iter().enumerate().take(self.options.npar) {
                    logl_fitter.set_value(i, seed)?;
                }
            }
            let minimum = logl_fitter.minimize(&likelihood).clone();
            let mut logl =
                FitResult::from_minimum(FitKind::LogL, logl_fitter.parameters(), &minimum);
            self.canonicalize(&mut logl, &logl_fitter);
            info!(kind = %FitKind::LogL, objective = logl.objective, converged = logl.converged);
            logl
        } else {
            warn!(kind = %FitKind::LogL, events = sample.len(), in_range, "nothing to fit");
            FitResult::unfitted(FitKind::LogL, logl_fitter.parameters())
        };

        Ok((histogram, chi2, logl))
    }

    fn scale_parameter(&self, scale: Float) -> FitParameter {
        FitParameter::new(SCALE_NAME, scale, 1e-2 * scale)
            .with_limits(0.1 * scale, 10.0 * scale)
    }
}

/// Access to the raw sample a bin accumulator holds for fitting.
pub trait FitSample {
    /// The events to fit.
    fn sample(&self) -> &RawSample;
}

impl FitSample for RawSample {
    fn sample(&self) -> &RawSample {
        self
    }
}

impl<C: Category> FitSample for CategoryBin<RawSample, C> {
    fn sample(&self) -> &RawSample {
        self.all()
    }
}

/// A complete binned analysis: events are filled into bins of the auxiliary axis, then every
/// bin is fit in ascending order and handed to a [`FitSink`].
///
/// The bin accumulator is either a plain [`RawSample`] or a [`CategoryBin`] of raw samples.
#[derive(Debug)]
pub struct Analysis<B = RawSample> {
    config: FitConfig,
    binner: Binner<B>,
    totals: RunTotals,
    fitter: BinFitter,
}

impl<B: FitSample + Default> Analysis<B> {
    /// Validate `config` and create an empty analysis.
    pub fn new(config: &FitConfig) -> AngfitResult<Self> {
        config.validate()?;
        let binner = Binner::with_default(AxisSpec::new(*config.aux()?));
        let fitter = BinFitter::with_context(
            FitOptions::from_config(config),
            *config.angular()?,
            config.execution_context()?,
        )?;
        Ok(Self {
            config: config.clone(),
            binner,
            totals: RunTotals::default(),
            fitter,
        })
    }
}

impl<B> Analysis<B> {
    /// The configuration.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }
    /// The totals over every event filled so far.
    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }
    /// The bins filled so far.
    pub fn binner(&self) -> &Binner<B> {
        &self.binner
    }
    /// Replace the per-bin fit options (for example, to change the step budget).
    pub fn with_fit_options(mut self, options: FitOptions) -> AngfitResult<Self> {
        options.validate()?;
        self.fitter.options = options;
        Ok(self)
    }

    /// Account for an event and return its payload, or `None` if its angular value is outside
    /// of the physical domain $`|x| \le 1`$.
    fn accept(&mut self, event: &Event) -> Option<WeightedValue> {
        self.totals.add(event);
        (event.x.abs() <= 1.0).then(|| event.value())
    }

    fn fit_bins(
        &self,
        sink: &mut dyn FitSink,
        sample: impl Fn(&B) -> &RawSample,
    ) -> AngfitResult<Vec<BinFit>> {
        sink.begin(&self.totals, &self.config.axes)?;
        let mut fits = Vec::with_capacity(self.binner.nslots());
        for bin in self.binner.iter() {
            let label = format!("{}{}", self.config.aux_axis, bin.bin_str());
            let events = sample(bin.accumulator).events();
            info!(bin = %label, events = events.len(), "fitting bin");
            let (histogram, chi2, logl) = self.fitter.fit_sample(events)?;
            let fit = BinFit {
                index: bin.index,
                lower: bin.lower,
                upper: bin.upper,
                histogram_name: format!("{}-{}", self.config.angular_axis, label),
                label,
                histogram,
                events: events.len(),
                chi2,
                logl,
            };
            sink.write_bin(&fit)?;
            fits.push(fit);
        }
        sink.finish()?;
        Ok(fits)
    }
}

impl<B: FitSample> Analysis<B> {
    /// Fit every bin in ascending order, writing each to `sink` as soon as it is done.
    pub fn fit(&self, sink: &mut dyn FitSink) -> AngfitResult<Vec<BinFit>> {
        self.fit_bins(sink, |b| b.sample())
    }
}

impl Analysis<RawSample> {
    /// Fill events. Every event counts towards the run totals; events outside of the
    /// auxiliary axis or with $`|x| > 1`$ are not kept.
    pub fn fill<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            if let Some(value) = self.accept(&event) {
                self.binner.observe(event.aux, value);
            }
        }
    }
}

impl<C: Category> Analysis<CategoryBin<RawSample, C>> {
    /// Fill events together with their category.
    pub fn fill_categorized<I: IntoIterator<Item = (Event, C)>>(&mut self, events: I) {
        for (event, category) in events {
            if let Some(value) = self.accept(&event) {
                self.binner.observe(event.aux, (value, category));
            }
        }
    }
    /// Fill events whose category is unknown; they only enter the "all" sample.
    pub fn fill<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            if let Some(value) = self.accept(&event) {
                self.binner.observe(event.aux, Uncategorized(value));
            }
        }
    }
    /// Fit only the events of one category in every bin.
    pub fn fit_category(
        &self,
        category: C,
        sink: &mut dyn FitSink,
    ) -> AngfitResult<Vec<BinFit>> {
        self.fit_bins(sink, |b| b.category(category))
    }
}
