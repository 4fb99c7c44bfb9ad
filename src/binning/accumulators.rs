use std::{fmt::Debug, marker::PhantomData};

use serde::{Deserialize, Serialize};

use crate::{data::WeightedValue, Float};

/// Anything which can be placed in a bin and updated with events of payload type `P`.
///
/// This is the only operation the binning engine needs; reading the accumulated state back is
/// left to the concrete types.
pub trait Accumulator<P> {
    /// Update the accumulator with one payload.
    fn observe(&mut self, payload: P);
}

/// A histogram bin holding the sum of weights, the sum of squared weights, and the number of
/// entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Float, Float, u64)", into = "(Float, Float, u64)")]
pub struct WeightedBin {
    /// $`\sum w`$
    pub w: Float,
    /// $`\sum w^2`$
    pub w2: Float,
    /// Number of entries
    pub n: u64,
}

impl WeightedBin {
    /// The statistical uncertainty of the bin content, $`\sqrt{\sum w^2}`$.
    pub fn error(&self) -> Float {
        self.w2.sqrt()
    }
}

impl Accumulator<Float> for WeightedBin {
    #[inline]
    fn observe(&mut self, weight: Float) {
        self.w += weight;
        self.w2 += weight * weight;
        self.n += 1;
    }
}

impl From<(Float, Float, u64)> for WeightedBin {
    fn from((w, w2, n): (Float, Float, u64)) -> Self {
        Self { w, w2, n }
    }
}

impl From<WeightedBin> for (Float, Float, u64) {
    fn from(bin: WeightedBin) -> Self {
        (bin.w, bin.w2, bin.n)
    }
}

/// An append-only list of weighted values, kept in the order they were observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    events: Vec<WeightedValue>,
}

impl RawSample {
    /// The number of values reserved by [`RawSample::default`].
    pub const DEFAULT_CAPACITY: usize = 1 << 10;

    /// Create an empty sample with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }
    /// The observed values.
    pub fn events(&self) -> &[WeightedValue] {
        &self.events
    }
    /// The number of observed values.
    pub fn len(&self) -> usize {
        self.events.len()
    }
    /// Whether nothing has been observed.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    /// The sum of weights of all observed values.
    pub fn total_weight(&self) -> Float {
        self.events.iter().map(|e| e.w).sum()
    }
    /// Iterate over the observed values.
    pub fn iter(&self) -> std::slice::Iter<'_, WeightedValue> {
        self.events.iter()
    }
}

impl Default for RawSample {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl Accumulator<WeightedValue> for RawSample {
    #[inline]
    fn observe(&mut self, value: WeightedValue) {
        self.events.push(value);
    }
}

impl FromIterator<WeightedValue> for RawSample {
    fn from_iter<T: IntoIterator<Item = WeightedValue>>(iter: T) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RawSample {
    type Item = &'a WeightedValue;
    type IntoIter = std::slice::Iter<'a, WeightedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// A fixed set of mutually exclusive event categories.
pub trait Category: Copy + Debug + Send + Sync + 'static {
    /// The number of categories.
    const COUNT: usize;
    /// The dense index of this category, in `0..COUNT`.
    fn index(&self) -> usize;
    /// The category with the given dense index.
    fn from_index(index: usize) -> Option<Self>;
}

/// An accumulator which keeps one inner accumulator for all events and one per [`Category`].
///
/// Observing `(payload, category)` updates the "all" accumulator and the one belonging to
/// `category`. The category is part of the call, so the bin carries no per-event state between
/// calls.
#[derive(Clone, Debug)]
pub struct CategoryBin<A, C: Category> {
    all: A,
    categories: Vec<A>,
    _category: PhantomData<C>,
}

impl<A, C: Category> CategoryBin<A, C> {
    /// Create a [`CategoryBin`] whose inner accumulators are produced by `factory`.
    pub fn new(mut factory: impl FnMut() -> A) -> Self {
        Self {
            all: factory(),
            categories: (0..C::COUNT).map(|_| factory()).collect(),
            _category: PhantomData,
        }
    }
    /// The accumulator which saw every event.
    pub fn all(&self) -> &A {
        &self.all
    }
    /// The accumulator of a single category.
    pub fn category(&self, category: C) -> &A {
        &self.categories[category.index()]
    }
    /// Iterate over every category with its accumulator, in index order.
    pub fn categories(&self) -> impl Iterator<Item = (C, &A)> {
        self.categories
            .iter()
            .enumerate()
            .filter_map(|(i, acc)| C::from_index(i).map(|c| (c, acc)))
    }
    /// Update only the "all" accumulator, for events without a known category.
    pub fn observe_uncategorized<P>(&mut self, payload: P)
    where
        A: Accumulator<P>,
    {
        self.all.observe(payload);
    }
}

impl<A: Default, C: Category> Default for CategoryBin<A, C> {
    fn default() -> Self {
        Self::new(A::default)
    }
}

impl<P: Clone, A: Accumulator<P>, C: Category> Accumulator<(P, C)> for CategoryBin<A, C> {
    #[inline]
    fn observe(&mut self, (payload, category): (P, C)) {
        self.all.observe(payload.clone());
        self.categories[category.index()].observe(payload);
    }
}

/// A payload without a category, routed only to the "all" accumulator of a [`CategoryBin`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uncategorized<P>(pub P);

impl<P, A: Accumulator<P>, C: Category> Accumulator<Uncategorized<P>> for CategoryBin<A, C> {
    #[inline]
    fn observe(&mut self, payload: Uncategorized<P>) {
        self.observe_uncategorized(payload.0);
    }
}
