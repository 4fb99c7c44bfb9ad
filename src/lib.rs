//! `angfit` fits angular distributions of particle-physics events in bins of an auxiliary
//! observable (typically an invariant mass).
//!
//! Each event carries a weight, an angular observable $`x = \cos\theta`$, and the auxiliary
//! value used to pick its bin. Within every bin the distribution of $`x`$ is fit to the squared
//! modulus of a truncated even-order Legendre expansion,
//! ```math
//! f(x; c_2, c_4, c_6, \varphi_2) = \left| c_0 + c_2 e^{\imath\varphi_2} P_2(x) + c_4 P_4(x) + c_6 P_6(x) \right|^2,
//! ```
//! where $`c_0`$ is fixed by normalization. Two fits are run per bin, in order: a $`\chi^2`$ fit
//! to a weighted histogram of $`x`$, and an unbinned maximum-likelihood fit to the raw event
//! sample (optionally seeded by the first).
//!
//! # Layout
//! - [`binning`] routes events through [`Axis`](binning::axis::Axis)es into per-bin
//!   [`Accumulator`](binning::accumulators::Accumulator)s.
//! - [`basis`] holds the Legendre expansion itself.
//! - [`minimizer`] adapts any [`Objective`](minimizer::Objective) to the [`ganesh`] minimizers,
//!   with parameter limits, fixing and error extraction.
//! - [`likelihoods`] defines the $`\chi^2`$ and $`-2\ln\mathcal{L}`$ objectives.
//! - [`fit`] runs the per-bin pipeline and hands [`FitRecord`](output::FitRecord)s to a
//!   [`FitSink`](output::FitSink).
//! - [`summary`] compares and tabulates stored fit records across bins, and [`sample`] draws
//!   test events from the expansion.
//!
//! # Quick Start
//! ```rust,no_run
//! use angfit::prelude::*;
//!
//! let config: FitConfig = "
//!     M 4 100 500
//!     cos 20 0 1
//!     p c2   0 0.1 -1 1
//!     p c4   0 0.1 -1 1
//!     p c6   0 0.1 -1 1
//!     p phi2 0 0.1 -3.1416 3.1416
//! "
//! .parse()?;
//! let mut analysis: Analysis = Analysis::new(&config)?;
//! let events: Vec<Event> = Vec::new(); // provided by the reconstruction step
//! analysis.fill(events);
//! let mut sink = MemorySink::default();
//! let fits = analysis.fit(&mut sink)?;
//! # Ok::<(), AngfitError>(())
//! ```
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use thiserror::Error;

/// The Legendre expansion used as the angular density.
pub mod basis;
/// Axes, bin accumulators and the generic binning engine.
pub mod binning;
/// Fit configuration and its text format.
pub mod config;
/// Events and run-level bookkeeping.
pub mod data;
/// Thread policies for the parallel likelihood reduction.
pub mod execution_context;
/// The per-bin fit pipeline.
pub mod fit;
/// Objective functions minimized by the fit pipeline.
pub mod likelihoods;
/// The adapter between objectives and [`ganesh`] minimizers.
pub mod minimizer;
/// Persistence of histograms and fit records.
pub mod output;
/// Monte-Carlo sampling from the angular density.
pub mod sample;
/// Comparisons and tables built from stored fit records.
pub mod summary;
/// Utility functions and enums.
pub mod utils;

pub use crate::basis::{canonical_phase, legendre_sq, N_COEFFICIENTS};
pub use crate::binning::{
    accumulators::{Accumulator, Category, CategoryBin, RawSample, Uncategorized, WeightedBin},
    axis::{Axis, AxisSpec, UniformAxis, VariableAxis},
    histogram::Histogram,
    Binner,
};
pub use crate::config::{FitConfig, ParameterSpec};
pub use crate::data::{Event, RunTotals, WeightedValue};
pub use crate::execution_context::{ExecutionContext, ThreadPolicy};
pub use crate::fit::{Analysis, BinFit, BinFitter, FitKind, FitOptions, FitResult};
pub use crate::likelihoods::{ChiSquare, LogLikelihood};
pub use crate::minimizer::{FitAlgorithm, FitParameter, Objective, ParameterFitter};
pub use crate::output::{FitRecord, FitSink, JsonWriter, MemorySink};
pub use crate::utils::enums::InitialState;

/// Commonly used items, for glob imports.
pub mod prelude {
    pub use crate::{
        legendre_sq, Accumulator, Analysis, AngfitError, AngfitResult, AxisSpec, Binner,
        CategoryBin, Event, FitConfig, FitKind, FitOptions, FitRecord, FitSink, Float,
        Histogram, InitialState, JsonWriter, MemorySink, RawSample, UniformAxis,
    };
}

/// A floating-point number type (defaults to [`f64`], see `f32` feature).
#[cfg(not(feature = "f32"))]
pub type Float = f64;

/// A floating-point number type (defaults to [`f64`], see `f32` feature).
#[cfg(feature = "f32")]
pub type Float = f32;

/// The mathematical constant $`\pi`$.
#[cfg(not(feature = "f32"))]
pub const PI: Float = std::f64::consts::PI;

/// The mathematical constant $`\pi`$.
#[cfg(feature = "f32")]
pub const PI: Float = std::f32::consts::PI;

/// Shorthand for results carrying an [`AngfitError`].
pub type AngfitResult<T> = Result<T, AngfitError>;

/// The error type used by all `angfit` internal methods
#[derive(Error, Debug)]
pub enum AngfitError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`serde_json::Error`].
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// An error type for [`rayon`] thread pools
    #[cfg(feature = "rayon")]
    #[error("Error building thread pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant or a configuration value.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// An axis was declared with no bins or with an empty or inverted range.
    #[error("Invalid axis: {nbins} bins over [{lower}, {upper})")]
    InvalidAxis {
        /// Requested number of bins
        nbins: usize,
        /// Requested lower edge
        lower: Float,
        /// Requested upper edge
        upper: Float,
    },
    /// More active fit parameters were requested than the expansion has.
    #[error("Requested {requested} active parameters, but at most {max} are available")]
    TooManyParameters {
        /// Requested count
        requested: usize,
        /// Number of declared parameters
        max: usize,
    },
    /// The fit range does not lie inside the physical domain of $`|\cos\theta|`$.
    #[error("Fit range {range} is outside of (0, 1]")]
    InvalidFitRange {
        /// Requested range
        range: Float,
    },
    /// A fit parameter was declared with an inverted or empty set of limits.
    #[error("Parameter \"{name}\" has invalid limits [{lower}, {upper}]")]
    InvalidLimits {
        /// Parameter name
        name: String,
        /// Lower limit
        lower: Float,
        /// Upper limit
        upper: Float,
    },
    /// A fit parameter was declared with a step size which is not a positive number.
    #[error("Parameter \"{name}\" has invalid step size {step}")]
    InvalidStep {
        /// Parameter name
        name: String,
        /// Requested step
        step: Float,
    },
    /// Fewer parameter declarations than required were found.
    #[error("Missing parameters: expected {expected}, found {found}")]
    MissingParameters {
        /// Required number of declarations
        expected: usize,
        /// Number of declarations found
        found: usize,
    },
    /// More parameter declarations than allowed were found.
    #[error("Extra parameter \"{name}\"")]
    ExtraParameter {
        /// Name of the surplus parameter
        name: String,
    },
    /// A required entry (a configuration key, or a bin of a comparison) was not found.
    #[error("Missing entry \"{key}\"")]
    MissingEntry {
        /// The missing key
        key: String,
    },
    /// A parameter index beyond the defined parameters was used.
    #[error("No parameter with index {index} (only {count} defined)")]
    ParameterIndexError {
        /// Requested index
        index: usize,
        /// Number of defined parameters
        count: usize,
    },
    /// The coefficients cannot be normalized (negative radicand for $`c_0`$).
    #[error("Coefficients {coefficients:?} cannot be normalized")]
    Unnormalizable {
        /// The offending coefficients
        coefficients: Vec<Float>,
    },
    /// An execution context could not be created.
    #[error("Execution context error: {reason}")]
    ExecutionContextError {
        /// Why the context is invalid
        reason: String,
    },
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}
