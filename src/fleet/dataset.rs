//! Ordered tick datasets loaded from historical fleet logs.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::snapshot::{TickSnapshot, WireSnapshot};
use crate::error::{DispatchError, Result};

/// An immutable, ordered sequence of tick snapshots.
///
/// Built once at the I/O boundary and shared by reference (or `Arc`) with
/// every trainer that consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct TickDataset {
    ticks: Vec<(u64, TickSnapshot)>,
}

impl TickDataset {
    /// Builds a dataset from `(tick_index, snapshot)` pairs, sorting by index.
    pub fn from_ticks(mut ticks: Vec<(u64, TickSnapshot)>) -> Result<Self> {
        if ticks.is_empty() {
            return Err(DispatchError::EmptyDataset);
        }
        ticks.sort_by_key(|(index, _)| *index);
        Ok(Self { ticks })
    }

    /// Parses a multi-tick log: an object keyed by decimal tick indices.
    ///
    /// Non-numeric top-level keys (metadata sections) are ignored.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: Map<String, Value> =
            serde_json::from_str(json).map_err(|e| DispatchError::json("tick log", e))?;
        Self::from_json_map(root)
    }

    /// Loads a multi-tick log from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DispatchError::io(path, e))?;
        let dataset = Self::from_json_str(&text)?;
        info!(
            path = %path.display(),
            ticks = dataset.len(),
            "Loaded tick dataset"
        );
        Ok(dataset)
    }

    fn from_json_map(root: Map<String, Value>) -> Result<Self> {
        let mut ticks = Vec::new();
        for (key, value) in root {
            let Some(index) = parse_tick_key(&key) else {
                debug!(key = %key, "Skipping non-tick key");
                continue;
            };
            let wire: WireSnapshot = serde_json::from_value(value)
                .map_err(|e| DispatchError::json(format!("tick {key}"), e))?;
            ticks.push((index, TickSnapshot::from_wire(wire)));
        }
        Self::from_ticks(ticks)
    }

    /// Serializes back into the multi-tick log format.
    pub fn to_json_value(&self) -> Value {
        let map: Map<String, Value> = self
            .ticks
            .iter()
            .map(|(index, snap)| (index.to_string(), snap.to_json_value()))
            .collect();
        Value::Object(map)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Tick index and snapshot at `position` in tick order.
    pub fn get(&self, position: usize) -> Option<(u64, &TickSnapshot)> {
        self.ticks.get(position).map(|(i, s)| (*i, s))
    }

    /// Snapshot with tick index `index`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::TickNotFound`] if the log has no such tick.
    pub fn tick(&self, index: u64) -> Result<&TickSnapshot> {
        self.ticks
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|pos| &self.ticks[pos].1)
            .map_err(|_| DispatchError::TickNotFound(index.to_string()))
    }

    /// Position of the tick following `position`.
    ///
    /// With `wrap`, the last tick is followed by the first; otherwise it has
    /// no successor.
    pub fn next_position(&self, position: usize, wrap: bool) -> Option<usize> {
        let next = position + 1;
        if next < self.ticks.len() {
            Some(next)
        } else if wrap && !self.ticks.is_empty() {
            Some(0)
        } else {
            None
        }
    }

    /// Iterates `(tick_index, snapshot)` in tick order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &TickSnapshot)> {
        self.ticks.iter().map(|(i, s)| (*i, s))
    }

    /// Tick indices in order.
    pub fn indices(&self) -> Vec<u64> {
        self.ticks.iter().map(|(i, _)| *i).collect()
    }
}

/// Tick keys are non-empty runs of ASCII digits.
fn parse_tick_key(key: &str) -> Option<u64> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match key.parse() {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(key = %key, error = %e, "Tick key out of range, skipping");
            None
        }
    }
}
