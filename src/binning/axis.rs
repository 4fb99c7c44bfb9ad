use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{AngfitError, AngfitResult, Float};

/// A one-dimensional partition of the real line into bins.
///
/// Bin indices are 1-based: bins `1..=nbins` cover the axis range, `0` is the underflow slot
/// and `nbins + 1` the overflow slot. Whether under/overflow events are kept is decided by the
/// [`AxisSpec`] wrapping the axis, not by the axis itself.
pub trait Axis: Clone + Debug + Send + Sync {
    /// The number of in-range bins.
    fn nbins(&self) -> usize;
    /// The index of the bin containing `x`. The upper edge of the topmost bin is inclusive, and
    /// `NaN` lands in the overflow slot.
    fn find_bin(&self, x: Float) -> usize;
    /// The lower edge of the bin with the given index (`-inf` for the underflow slot).
    fn lower(&self, index: usize) -> Float;
    /// The upper edge of the bin with the given index (`+inf` for the overflow slot).
    fn upper(&self, index: usize) -> Float;

    /// The lower edge of the axis range.
    fn min(&self) -> Float {
        self.lower(1)
    }
    /// The upper edge of the axis range.
    fn max(&self) -> Float {
        self.upper(self.nbins())
    }
    /// The center of the bin with the given index.
    fn center(&self, index: usize) -> Float {
        0.5 * (self.lower(index) + self.upper(index))
    }
    /// All `nbins + 1` edges of the in-range bins.
    fn edges(&self) -> Vec<Float> {
        (1..=self.nbins())
            .map(|i| self.lower(i))
            .chain(std::iter::once(self.max()))
            .collect()
    }
    /// Format a bin as `"[lower,upper)"`.
    fn bin_str(&self, index: usize) -> String {
        format!("[{},{})", self.lower(index), self.upper(index))
    }
}

/// An [`Axis`] of `nbins` equal-width bins over `[lower, upper)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "(usize, Float, Float)",
    into = "(usize, Float, Float)"
)]
pub struct UniformAxis {
    nbins: usize,
    lower: Float,
    upper: Float,
}

impl UniformAxis {
    /// Construct a [`UniformAxis`], failing if `nbins == 0` or if `lower >= upper` (including
    /// non-finite edges).
    pub fn new(nbins: usize, lower: Float, upper: Float) -> AngfitResult<Self> {
        if nbins == 0 || !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(AngfitError::InvalidAxis {
                nbins,
                lower,
                upper,
            });
        }
        Ok(Self {
            nbins,
            lower,
            upper,
        })
    }
    /// The width of every bin.
    pub fn bin_width(&self) -> Float {
        (self.upper - self.lower) / self.nbins as Float
    }
}

impl TryFrom<(usize, Float, Float)> for UniformAxis {
    type Error = AngfitError;

    fn try_from(value: (usize, Float, Float)) -> Result<Self, Self::Error> {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<UniformAxis> for (usize, Float, Float) {
    fn from(axis: UniformAxis) -> Self {
        (axis.nbins, axis.lower, axis.upper)
    }
}

impl Axis for UniformAxis {
    fn nbins(&self) -> usize {
        self.nbins
    }

    fn find_bin(&self, x: Float) -> usize {
        if x < self.lower {
            0
        } else if x <= self.upper {
            let bin_index = ((x - self.lower) / self.bin_width()).floor() as usize;
            bin_index.min(self.nbins - 1) + 1
        } else {
            self.nbins + 1
        }
    }

    fn lower(&self, index: usize) -> Float {
        match index {
            0 => Float::NEG_INFINITY,
            i if i > self.nbins => self.upper,
            i => self.lower + (i - 1) as Float * self.bin_width(),
        }
    }

    fn upper(&self, index: usize) -> Float {
        match index {
            0 => self.lower,
            i if i == self.nbins => self.upper,
            i if i > self.nbins => Float::INFINITY,
            i => self.lower + i as Float * self.bin_width(),
        }
    }
}

/// An [`Axis`] with arbitrary, strictly increasing bin edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Float>", into = "Vec<Float>")]
pub struct VariableAxis {
    edges: Vec<Float>,
}

impl VariableAxis {
    /// Construct a [`VariableAxis`] from its bin edges. At least two finite, strictly
    /// increasing edges are required.
    pub fn new(edges: Vec<Float>) -> AngfitResult<Self> {
        let valid = edges.len() >= 2
            && edges.iter().all(|e| e.is_finite())
            && edges.windows(2).all(|w| w[0] < w[1]);
        if !valid {
            return Err(AngfitError::InvalidAxis {
                nbins: edges.len().saturating_sub(1),
                lower: edges.first().copied().unwrap_or(Float::NAN),
                upper: edges.last().copied().unwrap_or(Float::NAN),
            });
        }
        Ok(Self { edges })
    }
}

impl TryFrom<Vec<Float>> for VariableAxis {
    type Error = AngfitError;

    fn try_from(value: Vec<Float>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VariableAxis> for Vec<Float> {
    fn from(axis: VariableAxis) -> Self {
        axis.edges
    }
}

impl Axis for VariableAxis {
    fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    fn find_bin(&self, x: Float) -> usize {
        let n = self.nbins();
        if x < self.edges[0] {
            0
        } else if x <= self.edges[n] {
            // number of edges <= x, so the first bin gets index 1
            self.edges.partition_point(|&e| e <= x).min(n)
        } else {
            n + 1
        }
    }

    fn lower(&self, index: usize) -> Float {
        match index {
            0 => Float::NEG_INFINITY,
            i => self.edges[(i - 1).min(self.nbins())],
        }
    }

    fn upper(&self, index: usize) -> Float {
        if index > self.nbins() {
            Float::INFINITY
        } else {
            self.edges[index]
        }
    }

    fn edges(&self) -> Vec<Float> {
        self.edges.clone()
    }
}

/// An [`Axis`] together with the policy for events falling outside of its range.
///
/// By default neither underflow nor overflow events are retained; the binning engine drops
/// them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec<X: Axis = UniformAxis> {
    axis: X,
    underflow: bool,
    overflow: bool,
}

impl<X: Axis> AxisSpec<X> {
    /// Wrap an [`Axis`], dropping out-of-range events.
    pub fn new(axis: X) -> Self {
        Self {
            axis,
            underflow: false,
            overflow: false,
        }
    }
    /// Retain (or drop) events below the axis range in a dedicated slot.
    pub fn with_underflow(mut self, underflow: bool) -> Self {
        self.underflow = underflow;
        self
    }
    /// Retain (or drop) events above the axis range in a dedicated slot.
    pub fn with_overflow(mut self, overflow: bool) -> Self {
        self.overflow = overflow;
        self
    }
    /// The wrapped [`Axis`].
    pub fn axis(&self) -> &X {
        &self.axis
    }
    /// Whether the underflow slot is retained.
    pub fn has_underflow(&self) -> bool {
        self.underflow
    }
    /// Whether the overflow slot is retained.
    pub fn has_overflow(&self) -> bool {
        self.overflow
    }
    /// The number of retained slots.
    pub fn nslots(&self) -> usize {
        self.axis.nbins() + self.underflow as usize + self.overflow as usize
    }
    /// The retained slot (0-based, dense) of the value `x`, if any.
    pub fn slot(&self, x: Float) -> Option<usize> {
        let index = self.axis.find_bin(x);
        if index == 0 {
            self.underflow.then_some(0)
        } else if index > self.axis.nbins() {
            self.overflow.then(|| self.nslots() - 1)
        } else {
            Some(index - !self.underflow as usize)
        }
    }
    /// The axis bin index (1-based, see [`Axis`]) of a retained slot.
    pub fn index_of_slot(&self, slot: usize) -> usize {
        slot + !self.underflow as usize
    }
}

impl<X: Axis> From<X> for AxisSpec<X> {
    fn from(axis: X) -> Self {
        Self::new(axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_axes() {
        assert!(UniformAxis::new(0, 0.0, 1.0).is_err());
        assert!(UniformAxis::new(3, 1.0, 1.0).is_err());
        assert!(UniformAxis::new(3, 2.0, 1.0).is_err());
        assert!(UniformAxis::new(3, Float::NAN, 1.0).is_err());
        assert!(VariableAxis::new(vec![0.0]).is_err());
        assert!(VariableAxis::new(vec![0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_uniform_boundaries() {
        let axis = UniformAxis::new(4, 0.0, 1.0).unwrap();
        assert_eq!(axis.find_bin(0.0), 1);
        assert_eq!(axis.find_bin(0.2499), 1);
        assert_eq!(axis.find_bin(0.25), 2);
        assert_eq!(axis.find_bin(1.0 - 1e-12), 4);
        assert_eq!(axis.find_bin(1.0), 4);
        assert_eq!(axis.find_bin(-1e-12), 0);
        assert_eq!(axis.find_bin(1.0 + 1e-12), 5);
        assert_eq!(axis.find_bin(Float::NAN), 5);
    }

    #[test]
    fn test_uniform_monotonic_partition() {
        let axis = UniformAxis::new(7, -1.0, 1.0).unwrap();
        let mut last = 0;
        let mut counts = [0usize; 9];
        let n = 7000;
        for i in 0..n {
            let x = -1.0 + 2.0 * (i as Float + 0.5) / n as Float;
            let bin = axis.find_bin(x);
            assert!(bin >= last);
            assert!(x >= axis.lower(bin) && x < axis.upper(bin));
            last = bin;
            counts[bin] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[8], 0);
        assert!(counts[1..8].iter().all(|&c| c == 1000));
    }

    #[test]
    fn test_uniform_edges() {
        let axis = UniformAxis::new(4, 100.0, 500.0).unwrap();
        assert_eq!(axis.edges(), vec![100.0, 200.0, 300.0, 400.0, 500.0]);
        assert_eq!(axis.bin_str(1), "[100,200)");
        assert_eq!(axis.bin_str(4), "[400,500)");
        assert_relative_eq!(axis.center(2), 250.0);
        assert_eq!(axis.lower(0), Float::NEG_INFINITY);
        assert_eq!(axis.upper(5), Float::INFINITY);
    }

    #[test]
    fn test_variable_axis() {
        let axis = VariableAxis::new(vec![0.0, 1.0, 3.0, 10.0]).unwrap();
        assert_eq!(axis.nbins(), 3);
        assert_eq!(axis.find_bin(-0.5), 0);
        assert_eq!(axis.find_bin(0.0), 1);
        assert_eq!(axis.find_bin(1.0), 2);
        assert_eq!(axis.find_bin(9.99), 3);
        assert_eq!(axis.find_bin(10.0), 3);
        assert_eq!(axis.find_bin(10.5), 4);
        assert_eq!(axis.bin_str(2), "[1,3)");
    }

    #[test]
    fn test_axis_spec_slots() {
        let axis = UniformAxis::new(2, 0.0, 2.0).unwrap();
        let drop = AxisSpec::new(axis);
        assert_eq!(drop.nslots(), 2);
        assert_eq!(drop.slot(-1.0), None);
        assert_eq!(drop.slot(0.5), Some(0));
        assert_eq!(drop.slot(1.5), Some(1));
        assert_eq!(drop.slot(3.0), None);
        assert_eq!(drop.index_of_slot(1), 2);

        let keep = AxisSpec::new(axis).with_underflow(true).with_overflow(true);
        assert_eq!(keep.nslots(), 4);
        assert_eq!(keep.slot(-1.0), Some(0));
        assert_eq!(keep.slot(0.5), Some(1));
        assert_eq!(keep.slot(3.0), Some(3));
        assert_eq!(keep.index_of_slot(3), 3);
    }

    #[test]
    fn test_axis_serde() {
        let axis = UniformAxis::new(4, 100.0, 500.0).unwrap();
        let json = serde_json::to_string(&axis).unwrap();
        assert_eq!(json, "[4,100.0,500.0]");
        let back: UniformAxis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis);
        assert!(serde_json::from_str::<UniformAxis>("[0,1.0,2.0]").is_err());
    }
}
