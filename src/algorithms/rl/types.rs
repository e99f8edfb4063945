//! Core types for the Q-learning dispatcher.
//!
//! Defines the discretized state key used as a value-table lookup key and the
//! result of an action selection.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ShovelId;

/// One slot of a state key.
///
/// Most slots hold small integer codes, but the timing feature and the raw
/// priority and coverage attributes are continuous, so slots are stored as
/// `f64` with bitwise equality. `-0.0` is normalized to `0.0` and every NaN to
/// one canonical NaN so that equal readings always hash alike.
#[derive(Debug, Clone, Copy)]
pub struct Feature(f64);

impl Feature {
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            Feature(0.0)
        } else if value.is_nan() {
            Feature(f64::NAN)
        } else {
            Feature(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Feature {
    fn from(value: f64) -> Self {
        Feature::new(value)
    }
}

impl From<i64> for Feature {
    fn from(value: i64) -> Self {
        Feature::new(value as f64)
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Feature {}

impl Hash for Feature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Feature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Feature::new)
    }
}

/// Fixed-arity discretized description of a decision context.
///
/// Produced by [`StateEncoder`](super::observation::StateEncoder) and used
/// verbatim as a value-table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(Vec<Feature>);

impl StateKey {
    pub fn new(features: Vec<Feature>) -> Self {
        StateKey(features)
    }

    /// Builds a key from raw slot values.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        StateKey(values.into_iter().map(Feature::new).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn features(&self) -> &[Feature] {
        &self.0
    }

    /// Raw slot values in order.
    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(Feature::value).collect()
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, feature) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{feature}")?;
        }
        write!(f, ")")
    }
}

/// Outcome of an epsilon-greedy selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionChoice {
    pub action: ShovelId,
    /// True when the action was drawn at random rather than by argmax.
    pub explored: bool,
}

impl ActionChoice {
    pub fn exploit(action: impl Into<ShovelId>) -> Self {
        Self {
            action: action.into(),
            explored: false,
        }
    }

    pub fn explore(action: impl Into<ShovelId>) -> Self {
        Self {
            action: action.into(),
            explored: true,
        }
    }
}
