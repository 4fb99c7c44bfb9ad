use serde::{ser::SerializeStruct, Serialize, Serializer};

use crate::{
    binning::{
        accumulators::{Accumulator, RawSample, WeightedBin},
        axis::{Axis, AxisSpec, UniformAxis},
        BinRef, Binner,
    },
    data::WeightedValue,
    Float,
};

/// A weighted histogram of the angular observable over a [`UniformAxis`].
///
/// Values outside of the axis range are dropped. Each in-range bin keeps $`\sum w`$,
/// $`\sum w^2`$ and the number of entries (see [`WeightedBin`]).
#[derive(Clone, Debug)]
pub struct Histogram {
    binner: Binner<WeightedBin>,
}

impl Histogram {
    /// Create an empty [`Histogram`].
    pub fn new(axis: UniformAxis) -> Self {
        Self {
            binner: Binner::with_default(AxisSpec::new(axis)),
        }
    }
    /// Fill the histogram with a weighted value. Returns `false` if `x` was out of range.
    pub fn fill(&mut self, x: Float, w: Float) -> bool {
        self.binner.observe(x, w)
    }
    /// Fill a [`Histogram`] with every value of a [`RawSample`].
    pub fn from_sample(axis: UniformAxis, sample: &RawSample) -> Self {
        let mut histogram = Self::new(axis);
        for value in sample {
            histogram.observe(*value);
        }
        histogram
    }
    /// The histogram axis.
    pub fn axis(&self) -> &UniformAxis {
        self.binner.axis()
    }
    /// The number of bins.
    pub fn nbins(&self) -> usize {
        self.binner.nslots()
    }
    /// The bins, in ascending order.
    pub fn bins(&self) -> &[WeightedBin] {
        self.binner.bins()
    }
    /// Iterate over the bins with their edges.
    pub fn iter(&self) -> impl Iterator<Item = BinRef<'_, WeightedBin>> + '_ {
        self.binner.iter()
    }
    /// The bin midpoints.
    pub fn midpoints(&self) -> Vec<Float> {
        let axis = self.axis();
        (1..=axis.nbins()).map(|i| axis.center(i)).collect()
    }
    /// $`\sum w`$ per bin.
    pub fn sum_weight(&self) -> Vec<Float> {
        self.bins().iter().map(|b| b.w).collect()
    }
    /// $`\sum w^2`$ per bin.
    pub fn sum_weight_sq(&self) -> Vec<Float> {
        self.bins().iter().map(|b| b.w2).collect()
    }
    /// Entries per bin.
    pub fn counts(&self) -> Vec<u64> {
        self.bins().iter().map(|b| b.n).collect()
    }
    /// The total in-range weight.
    pub fn total_weight(&self) -> Float {
        self.bins().iter().map(|b| b.w).sum()
    }
    /// The total number of in-range entries.
    pub fn entries(&self) -> u64 {
        self.bins().iter().map(|b| b.n).sum()
    }
}

impl Accumulator<WeightedValue> for Histogram {
    #[inline]
    fn observe(&mut self, value: WeightedValue) {
        self.fill(value.x, value.w);
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Histogram", 2)?;
        state.serialize_field("axis", self.axis())?;
        state.serialize_field("bins", self.bins())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_sums() {
        let mut h = Histogram::new(UniformAxis::new(4, 0.0, 1.0).unwrap());
        assert!(h.fill(0.1, 1.0));
        assert!(h.fill(0.15, 3.0));
        assert!(h.fill(0.6, 0.5));
        assert!(h.fill(1.0, 2.0));
        assert!(!h.fill(1.1, 7.0));
        assert!(!h.fill(-0.1, 7.0));
        assert_eq!(h.sum_weight(), vec![4.0, 0.0, 0.5, 2.0]);
        assert_eq!(h.sum_weight_sq(), vec![10.0, 0.0, 0.25, 4.0]);
        assert_eq!(h.counts(), vec![2, 0, 1, 1]);
        assert_relative_eq!(h.total_weight(), 6.5);
        assert_eq!(h.entries(), 4);
    }

    #[test]
    fn test_midpoints() {
        let h = Histogram::new(UniformAxis::new(4, 0.0, 1.0).unwrap());
        let mids = h.midpoints();
        assert_eq!(mids.len(), 4);
        assert_relative_eq!(mids[0], 0.125);
        assert_relative_eq!(mids[3], 0.875);
    }

    #[test]
    fn test_from_sample() {
        let sample: RawSample = [
            WeightedValue::new(-0.9, 1.0),
            WeightedValue::new(0.2, 2.0),
            WeightedValue::new(0.3, 0.5),
        ]
        .into_iter()
        .collect();
        let h = Histogram::from_sample(UniformAxis::new(2, -1.0, 1.0).unwrap(), &sample);
        assert_eq!(h.sum_weight(), vec![1.0, 2.5]);
        assert_eq!(h.counts(), vec![1, 2]);
    }

    #[test]
    fn test_serialize() {
        let mut h = Histogram::new(UniformAxis::new(2, 0.0, 1.0).unwrap());
        h.fill(0.75, 2.0);
        assert_eq!(
            serde_json::to_string(&h).unwrap(),
            r#"{"axis":[2,0.0,1.0],"bins":[[0.0,0.0,0],[2.0,4.0,1]]}"#
        );
    }
}
