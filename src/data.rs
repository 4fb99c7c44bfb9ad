use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

use crate::Float;

/// A single weighted value of the angular observable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedValue {
    /// The angular observable (typically $`\cos\theta`$ or $`|\cos\theta|`$).
    pub x: Float,
    /// The event weight.
    pub w: Float,
}

impl WeightedValue {
    /// Construct a [`WeightedValue`].
    pub fn new(x: Float, w: Float) -> Self {
        Self { x, w }
    }
}

impl From<Float> for WeightedValue {
    fn from(x: Float) -> Self {
        Self { x, w: 1.0 }
    }
}

/// An event as handed over by the reconstruction step: the angular observable, the auxiliary
/// observable used for binning, a weight, and the number of sub-events it stands for.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event weight (defaults to 1).
    pub weight: Float,
    /// The angular observable.
    pub x: Float,
    /// The auxiliary observable (an invariant mass, for instance).
    pub aux: Float,
    /// The number of generated sub-events this entry represents (defaults to 1).
    pub ncount: u64,
}

impl Event {
    /// Construct a unit-weight [`Event`].
    pub fn new(x: Float, aux: Float) -> Self {
        Self {
            weight: 1.0,
            x,
            aux,
            ncount: 1,
        }
    }
    /// Set the event weight.
    pub fn with_weight(mut self, weight: Float) -> Self {
        self.weight = weight;
        self
    }
    /// Set the number of sub-events.
    pub fn with_ncount(mut self, ncount: u64) -> Self {
        self.ncount = ncount;
        self
    }
    /// The weighted angular value carried by this event.
    pub fn value(&self) -> WeightedValue {
        WeightedValue::new(self.x, self.weight)
    }
}

/// Totals over every event seen during the fill pass, whether or not it was kept.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunTotals {
    /// Sum of event weights.
    pub weight: Float,
    /// Number of entries.
    pub entries: u64,
    /// Sum of sub-event counts.
    pub ncount: u64,
}

impl RunTotals {
    /// Account for one event.
    pub fn add(&mut self, event: &Event) {
        self.weight += event.weight;
        self.entries += 1;
        self.ncount += event.ncount;
    }
}

impl Serialize for RunTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RunTotals", 3)?;
        state.serialize_field("weight", &[self.weight])?;
        state.serialize_field("entries", &[self.entries])?;
        state.serialize_field("ncount", &[self.ncount])?;
        state.end()
    }
}
