use std::fmt::Debug;

use crate::Float;

use self::{
    accumulators::Accumulator,
    axis::{Axis, AxisSpec},
};

/// Bin payloads: histogram bins, raw samples, and category fan-out.
pub mod accumulators;
/// One-dimensional axes and their out-of-range policies.
pub mod axis;
/// A weighted histogram over a uniform axis.
pub mod histogram;

/// A set of [`AxisSpec`]s which together map a coordinate to a single retained slot.
///
/// Implemented for a single [`AxisSpec`] (coordinate [`Float`]) and for tuples of two and
/// three (coordinates `(Float, Float)` and `(Float, Float, Float)`). Multi-axis slots are
/// flattened in row-major order, with the last axis varying fastest.
pub trait Axes: Clone + Debug + Send + Sync {
    /// The coordinate type routed by these axes.
    type Coord: Copy;
    /// The per-axis slot tuple.
    type Slots: Copy + Debug + PartialEq;
    /// The total number of retained slots.
    fn nslots(&self) -> usize;
    /// The per-axis slots of a coordinate, or `None` if any axis drops it.
    fn slots(&self, coord: Self::Coord) -> Option<Self::Slots>;
    /// Flatten per-axis slots into one linear slot.
    fn flatten(&self, slots: Self::Slots) -> usize;
    /// Inverse of [`Axes::flatten`].
    fn unflatten(&self, slot: usize) -> Self::Slots;
    /// The linear slot of a coordinate, or `None` if it is dropped.
    fn slot(&self, coord: Self::Coord) -> Option<usize> {
        self.slots(coord).map(|s| self.flatten(s))
    }
}

impl<X: Axis> Axes for AxisSpec<X> {
    type Coord = Float;
    type Slots = usize;

    fn nslots(&self) -> usize {
        AxisSpec::nslots(self)
    }
    fn slots(&self, coord: Float) -> Option<usize> {
        AxisSpec::slot(self, coord)
    }
    fn flatten(&self, slots: usize) -> usize {
        slots
    }
    fn unflatten(&self, slot: usize) -> usize {
        slot
    }
}

impl<X: Axis, Y: Axis> Axes for (AxisSpec<X>, AxisSpec<Y>) {
    type Coord = (Float, Float);
    type Slots = (usize, usize);

    fn nslots(&self) -> usize {
        self.0.nslots() * self.1.nslots()
    }
    fn slots(&self, (x, y): (Float, Float)) -> Option<(usize, usize)> {
        Some((self.0.slot(x)?, self.1.slot(y)?))
    }
    fn flatten(&self, (sx, sy): (usize, usize)) -> usize {
        sx * self.1.nslots() + sy
    }
    fn unflatten(&self, slot: usize) -> (usize, usize) {
        let ny = self.1.nslots();
        (slot / ny, slot % ny)
    }
}

impl<X: Axis, Y: Axis, Z: Axis> Axes for (AxisSpec<X>, AxisSpec<Y>, AxisSpec<Z>) {
    type Coord = (Float, Float, Float);
    type Slots = (usize, usize, usize);

    fn nslots(&self) -> usize {
        self.0.nslots() * self.1.nslots() * self.2.nslots()
    }
    fn slots(&self, (x, y, z): (Float, Float, Float)) -> Option<(usize, usize, usize)> {
        Some((self.0.slot(x)?, self.1.slot(y)?, self.2.slot(z)?))
    }
    fn flatten(&self, (sx, sy, sz): (usize, usize, usize)) -> usize {
        (sx * self.1.nslots() + sy) * self.2.nslots() + sz
    }
    fn unflatten(&self, slot: usize) -> (usize, usize, usize) {
        let ny = self.1.nslots();
        let nz = self.2.nslots();
        (slot / (ny * nz), (slot / nz) % ny, slot % nz)
    }
}

/// The binning engine: a set of [`Axes`] plus one accumulator per retained slot.
///
/// Events are routed by their coordinate to exactly one accumulator, or dropped if the axes do
/// not retain that coordinate. Accumulators are only ever mutated through
/// [`Binner::observe`].
#[derive(Clone, Debug)]
pub struct Binner<A, S: Axes = AxisSpec> {
    axes: S,
    bins: Vec<A>,
}

impl<A, S: Axes> Binner<A, S> {
    /// Create a [`Binner`] with one accumulator per slot, each produced by `factory`.
    pub fn new(axes: S, mut factory: impl FnMut() -> A) -> Self {
        let bins = (0..axes.nslots()).map(|_| factory()).collect();
        Self { axes, bins }
    }
    /// Route `payload` to the accumulator selected by `coord`. Returns `false` if the event was
    /// dropped.
    #[inline]
    pub fn observe<P>(&mut self, coord: S::Coord, payload: P) -> bool
    where
        A: Accumulator<P>,
    {
        match self.axes.slot(coord) {
            Some(slot) => {
                self.bins[slot].observe(payload);
                true
            }
            None => false,
        }
    }
    /// The linear slot `coord` would be routed to.
    pub fn find_slot(&self, coord: S::Coord) -> Option<usize> {
        self.axes.slot(coord)
    }
    /// The axes of this binner.
    pub fn axes(&self) -> &S {
        &self.axes
    }
    /// All accumulators, ordered by linear slot.
    pub fn bins(&self) -> &[A] {
        &self.bins
    }
    /// The accumulator at a linear slot.
    pub fn get(&self, slot: usize) -> Option<&A> {
        self.bins.get(slot)
    }
    /// The accumulator for given per-axis slots.
    pub fn at(&self, slots: S::Slots) -> Option<&A> {
        self.bins.get(self.axes.flatten(slots))
    }
    /// The number of retained slots.
    pub fn nslots(&self) -> usize {
        self.bins.len()
    }
}

impl<A: Default, S: Axes> Binner<A, S> {
    /// Create a [`Binner`] with default-constructed accumulators.
    pub fn with_default(axes: S) -> Self {
        Self::new(axes, A::default)
    }
}

/// A view of one bin of a one-dimensional [`Binner`].
#[derive(Debug)]
pub struct BinRef<'a, A> {
    /// The axis bin index (1-based for in-range bins).
    pub index: usize,
    /// The lower edge of the bin.
    pub lower: Float,
    /// The upper edge of the bin.
    pub upper: Float,
    /// The bin's accumulator.
    pub accumulator: &'a A,
}

impl<A> BinRef<'_, A> {
    /// The bin range formatted as `"[lower,upper)"`.
    pub fn bin_str(&self) -> String {
        format!("[{},{})", self.lower, self.upper)
    }
    /// The bin center.
    pub fn center(&self) -> Float {
        0.5 * (self.lower + self.upper)
    }
}

impl<A, X: Axis> Binner<A, AxisSpec<X>> {
    /// The single axis of this binner.
    pub fn axis(&self) -> &X {
        self.axes.axis()
    }
    /// Iterate over retained bins in ascending axis order.
    pub fn iter(&self) -> impl Iterator<Item = BinRef<'_, A>> + '_ {
        self.bins.iter().enumerate().map(move |(slot, accumulator)| {
            let index = self.axes.index_of_slot(slot);
            BinRef {
                index,
                lower: self.axes.axis().lower(index),
                upper: self.axes.axis().upper(index),
                accumulator,
            }
        })
    }
    /// Format the axis bin with the given index as `"[lower,upper)"`.
    pub fn bin_str(&self, index: usize) -> String {
        self.axes.axis().bin_str(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{
        accumulators::{CategoryBin, RawSample, WeightedBin},
        axis::UniformAxis,
    };
    use crate::{data::WeightedValue, utils::enums::InitialState};
    use approx::assert_relative_eq;

    fn mass_axis() -> AxisSpec {
        AxisSpec::new(UniformAxis::new(3, 100.0, 400.0).unwrap())
    }

    #[test]
    fn test_routing_and_dropping() {
        let mut binner: Binner<WeightedBin> = Binner::with_default(mass_axis());
        assert!(binner.observe(100.0, 1.0));
        assert!(binner.observe(250.0, 2.0));
        assert!(binner.observe(399.0, 0.5));
        assert!(!binner.observe(99.0, 10.0));
        assert!(!binner.observe(400.5, 10.0));
        assert_relative_eq!(binner.bins()[0].w, 1.0);
        assert_relative_eq!(binner.bins()[1].w, 2.0);
        assert_relative_eq!(binner.bins()[2].w, 0.5);
        let total: Float = binner.bins().iter().map(|b| b.w).sum();
        assert_relative_eq!(total, 3.5);
    }

    #[test]
    fn test_ordered_iteration_labels() {
        let binner: Binner<RawSample> = Binner::with_default(mass_axis());
        let labels: Vec<String> = binner.iter().map(|b| b.bin_str()).collect();
        assert_eq!(labels, vec!["[100,200)", "[200,300)", "[300,400)"]);
        let indices: Vec<usize> = binner.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(binner.bin_str(2), "[200,300)");
    }

    #[test]
    fn test_under_overflow_retained() {
        let spec = mass_axis().with_underflow(true).with_overflow(true);
        let mut binner: Binner<WeightedBin> = Binner::with_default(spec);
        assert_eq!(binner.nslots(), 5);
        assert!(binner.observe(50.0, 1.0));
        assert!(binner.observe(1000.0, 3.0));
        let bins: Vec<_> = binner.iter().collect();
        assert_eq!(bins[0].index, 0);
        assert_relative_eq!(bins[0].accumulator.w, 1.0);
        assert_eq!(bins[4].index, 4);
        assert_relative_eq!(bins[4].accumulator.w, 3.0);
        assert_eq!(bins[4].bin_str(), "[400,inf)");
    }

    #[test]
    fn test_raw_sample_binning() {
        let mut binner: Binner<RawSample> = Binner::with_default(mass_axis());
        binner.observe(150.0, WeightedValue::new(0.5, 1.0));
        binner.observe(150.0, WeightedValue::new(-0.5, 2.0));
        assert_eq!(binner.bins()[0].len(), 2);
        assert!(binner.bins()[1].is_empty());
    }

    #[test]
    fn test_category_binning() {
        let mut binner: Binner<CategoryBin<WeightedBin, InitialState>> =
            Binner::with_default(mass_axis());
        binner.observe(150.0, (1.0, InitialState::GluonQuark));
        binner.observe(150.0, (2.0, InitialState::GluonGluon));
        let bin = &binner.bins()[0];
        assert_relative_eq!(bin.all().w, 3.0);
        assert_relative_eq!(bin.category(InitialState::GluonQuark).w, 1.0);
    }

    #[test]
    fn test_two_dimensional_flattening() {
        let x = AxisSpec::new(UniformAxis::new(2, 0.0, 2.0).unwrap());
        let y = AxisSpec::new(UniformAxis::new(3, 0.0, 3.0).unwrap());
        let mut binner: Binner<WeightedBin, (AxisSpec, AxisSpec)> = Binner::with_default((x, y));
        assert_eq!(binner.nslots(), 6);
        assert!(binner.observe((1.5, 0.5), 1.0));
        assert!(binner.observe((0.5, 2.5), 2.0));
        assert!(!binner.observe((0.5, 3.5), 4.0));
        assert_eq!(binner.find_slot((1.5, 0.5)), Some(3));
        assert_eq!(binner.axes().unflatten(3), (1, 0));
        assert_relative_eq!(binner.at((1, 0)).unwrap().w, 1.0);
        assert_relative_eq!(binner.at((0, 2)).unwrap().w, 2.0);
    }

    #[test]
    fn test_three_dimensional_flattening() {
        let a = AxisSpec::new(UniformAxis::new(2, 0.0, 2.0).unwrap());
        let b = AxisSpec::new(UniformAxis::new(3, 0.0, 3.0).unwrap());
        let c = AxisSpec::new(UniformAxis::new(4, 0.0, 4.0).unwrap());
        let axes = (a, b, c);
        assert_eq!(axes.nslots(), 24);
        for slot in 0..24 {
            assert_eq!(axes.flatten(axes.unflatten(slot)), slot);
        }
        assert_eq!(axes.slot((1.5, 2.5, 3.5)), Some(23));
        assert_eq!(axes.slot((0.5, 0.5, 0.5)), Some(0));
    }
}
