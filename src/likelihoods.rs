use crate::{
    basis::{legendre_sq, N_COEFFICIENTS},
    binning::histogram::Histogram,
    data::WeightedValue,
    execution_context::ExecutionContext,
    minimizer::Objective,
    AngfitError, AngfitResult, Float,
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The number of parameters of a [`ChiSquare`]: the coefficients followed by the scale `A`.
pub const CHI2_PARAMETERS: usize = N_COEFFICIENTS + 1;

/// A least-squares objective comparing a [`Histogram`] to the scaled angular density,
///
/// ```math
/// \chi^2(\vec{c}, A) = \sum_{i\,:\,\sigma_i > 0} \frac{\left(h_i - A f(x_i; \vec{c})\right)^2}{\sigma_i^2}
/// ```
///
/// where $`x_i`$ is the midpoint of bin $`i`$, $`h_i = \sum w`$ and $`\sigma_i^2 = \sum w^2`$.
/// Bins without entries have $`\sigma_i = 0`$ and are skipped. Parameters are
/// `[c2, c4, c6, phi2, A]`.
#[derive(Clone, Debug)]
pub struct ChiSquare<'a> {
    histogram: &'a Histogram,
    midpoints: Vec<Float>,
}

impl<'a> ChiSquare<'a> {
    /// Construct a [`ChiSquare`] over a [`Histogram`].
    pub fn new(histogram: &'a Histogram) -> Self {
        Self {
            histogram,
            midpoints: histogram.midpoints(),
        }
    }
    /// The number of bins entering the sum.
    pub fn n_points(&self) -> usize {
        self.histogram.bins().iter().filter(|b| b.w2 > 0.0).count()
    }
}

impl Objective for ChiSquare<'_> {
    fn evaluate(&self, parameters: &[Float]) -> Float {
        let Some(&scale) = parameters.get(N_COEFFICIENTS) else {
            return Float::NAN;
        };
        self.histogram
            .bins()
            .iter()
            .zip(&self.midpoints)
            .filter(|(b, _)| b.w2 > 0.0)
            .map(|(b, &x)| (b.w - scale * legendre_sq(x, parameters)).powi(2) / b.w2)
            .sum()
    }
}

// 7-point Gauss-Legendre rule, exact for the degree-12 density
const GAUSS_NODES: [Float; 7] = [
    -0.949_107_912_342_758_5,
    -0.741_531_185_599_394_4,
    -0.405_845_151_377_397_2,
    0.0,
    0.405_845_151_377_397_2,
    0.741_531_185_599_394_4,
    0.949_107_912_342_758_5,
];
const GAUSS_WEIGHTS: [Float; 7] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
    0.381_830_050_505_118_9,
    0.279_705_391_489_276_7,
    0.129_484_966_168_869_7,
];

/// The mean of the angular density over $`[-r, r]`$ (exactly 1 for $`r = 1`$).
pub fn mean_density(range: Float, coefficients: &[Float]) -> Float {
    if range >= 1.0 {
        return 1.0;
    }
    0.5 * GAUSS_NODES
        .iter()
        .zip(GAUSS_WEIGHTS)
        .map(|(t, w)| w * legendre_sq(range * t, coefficients))
        .sum::<Float>()
}

/// An unbinned maximum-likelihood objective over a raw weighted sample,
///
/// ```math
/// -2\ln\mathcal{L}(\vec{c}) = -2 \sum_{e\,:\,|x_e| \le r} w_e \ln\frac{f(x_e; \vec{c})}{\bar{f}_r(\vec{c})}
/// ```
///
/// where $`r`$ is the fit range and $`\bar{f}_r`$ the mean of the density over $`[-r, r]`$. For
/// the full range $`\bar{f}_1 = 1`$, so an isotropic sample gives exactly 0 at
/// $`\vec{c} = 0`$. Parameters are `[c2, c4, c6, phi2]`.
///
/// The per-event sum is reduced in parallel when the `rayon` feature is enabled and the
/// [`ExecutionContext`] allows it.
#[derive(Clone, Copy, Debug)]
pub struct LogLikelihood<'a> {
    events: &'a [WeightedValue],
    range: Float,
    weight_in_range: Float,
    ctx: Option<&'a ExecutionContext>,
}

impl<'a> LogLikelihood<'a> {
    /// Construct a [`LogLikelihood`] over `events`, keeping those with $`|x| \le`$ `range`.
    ///
    /// Fails if `range` is outside of $`(0, 1]`$.
    pub fn new(events: &'a [WeightedValue], range: Float) -> AngfitResult<Self> {
        if !(range > 0.0 && range <= 1.0) {
            return Err(AngfitError::InvalidFitRange { range });
        }
        let weight_in_range = events
            .iter()
            .filter(|e| e.x.abs() <= range)
            .map(|e| e.w)
            .sum();
        Ok(Self {
            events,
            range,
            weight_in_range,
            ctx: None,
        })
    }
    /// Evaluate under the thread policy of an [`ExecutionContext`] (by default the global pool
    /// is used when available).
    pub fn with_context(mut self, ctx: &'a ExecutionContext) -> Self {
        self.ctx = Some(ctx);
        self
    }
    /// The fit range.
    pub fn range(&self) -> Float {
        self.range
    }
    /// The sum of weights of the events inside the fit range.
    pub fn weight_in_range(&self) -> Float {
        self.weight_in_range
    }

    fn serial_sum(&self, coefficients: &[Float]) -> Float {
        self.events
            .iter()
            .filter(|e| e.x.abs() <= self.range)
            .map(|e| e.w * legendre_sq(e.x, coefficients).ln())
            .sum()
    }

    #[cfg(feature = "rayon")]
    fn weighted_log_sum(&self, coefficients: &[Float]) -> Float {
        let parallel = self.ctx.map_or(true, |ctx| ctx.is_parallel());
        if !parallel {
            return self.serial_sum(coefficients);
        }
        let sum = || -> Float {
            self.events
                .par_iter()
                .filter(|e| e.x.abs() <= self.range)
                .map(|e| e.w * legendre_sq(e.x, coefficients).ln())
                .sum()
        };
        match self.ctx {
            Some(ctx) => ctx.install(sum),
            None => sum(),
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn weighted_log_sum(&self, coefficients: &[Float]) -> Float {
        self.serial_sum(coefficients)
    }
}

impl Objective for LogLikelihood<'_> {
    fn evaluate(&self, parameters: &[Float]) -> Float {
        let log_sum = self.weighted_log_sum(parameters);
        let log_norm = mean_density(self.range, parameters).ln();
        -2.0 * (log_sum - self.weight_in_range * log_norm)
    }
}
