//! Tabular action-value storage and its JSON persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::types::StateKey;
use crate::error::{DispatchError, Result};
use crate::ShovelId;

/// Action values for one state.
pub type ValueRow = BTreeMap<ShovelId, f64>;

/// Mapping from state key to per-shovel value estimates.
///
/// Rows are only ever added. The on-disk form is a JSON array of
/// `{"state": [...], "values": {...}}` entries sorted by state, so saving the
/// same table twice yields byte-identical files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    rows: HashMap<StateKey, ValueRow>,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    state: StateKey,
    values: ValueRow,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known states.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, state: &StateKey) -> bool {
        self.rows.contains_key(state)
    }

    pub fn row(&self, state: &StateKey) -> Option<&ValueRow> {
        self.rows.get(state)
    }

    /// Value of `action` in `state`, if recorded.
    pub fn value(&self, state: &StateKey, action: &str) -> Option<f64> {
        self.rows.get(state).and_then(|row| row.get(action)).copied()
    }

    /// Returns the row for `state`, creating it with `0.0` for each of
    /// `actions` if the state is unseen.
    pub fn ensure_row<'a>(
        &mut self,
        state: &StateKey,
        actions: impl IntoIterator<Item = &'a ShovelId>,
    ) -> &mut ValueRow {
        self.rows
            .entry(state.clone())
            .or_insert_with(|| actions.into_iter().map(|a| (a.clone(), 0.0)).collect())
    }

    /// Total number of stored `(state, action)` values.
    pub fn value_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    /// Iterates rows in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &ValueRow)> {
        self.rows.iter()
    }

    /// Rows sorted by state key.
    pub fn sorted(&self) -> Vec<(&StateKey, &ValueRow)> {
        let mut rows: Vec<_> = self.rows.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows
    }

    pub fn to_json_string(&self) -> Result<String> {
        let entries: Vec<Entry> = self
            .sorted()
            .into_iter()
            .map(|(state, values)| Entry {
                state: state.clone(),
                values: values.clone(),
            })
            .collect();
        serde_json::to_string(&entries).map_err(|e| DispatchError::json("value table", e))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::parse(json, "value table")
    }

    /// Loads a table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DispatchError::io(path, e))?;
        Self::parse(&text, path.display().to_string())
    }

    fn parse(json: &str, context: impl Into<String>) -> Result<Self> {
        let entries: Vec<Entry> =
            serde_json::from_str(json).map_err(|e| DispatchError::json(context, e))?;
        Ok(Self {
            rows: entries.into_iter().map(|e| (e.state, e.values)).collect(),
        })
    }

    /// Loads a table, falling back to an empty one when the file is missing
    /// or unreadable.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "No value table found, starting empty");
            return Self::new();
        }
        match Self::load(path) {
            Ok(table) => {
                info!(path = %path.display(), states = table.len(), "Loaded value table");
                table
            }
            Err(e) => {
                warn!(error = %e, "Value table unreadable, starting empty");
                Self::new()
            }
        }
    }

    /// Writes the table to `path`, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
        }
        let json = self.to_json_string()?;
        let file = File::create(path).map_err(|e| DispatchError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(json.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| DispatchError::io(path, e))?;
        info!(path = %path.display(), states = self.len(), "Saved value table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(values: &[f64]) -> StateKey {
        StateKey::from_values(values.iter().copied())
    }

    fn sample() -> ValueTable {
        let mut table = ValueTable::new();
        let actions = vec!["S1".to_string(), "S2".to_string()];
        table.ensure_row(&key(&[1.0, 2.0]), &actions);
        let row = table.ensure_row(&key(&[0.0, -1.0, 2.75]), &actions);
        row.insert("S1".into(), 0.1 + 0.2);
        row.insert("S2".into(), -3.3333333333333335);
        table
    }

    #[test]
    fn ensure_row_initializes_once() {
        let mut table = ValueTable::new();
        let k = key(&[1.0]);
        let actions = vec!["A".to_string()];
        table.ensure_row(&k, &actions).insert("A".into(), 5.0);
        let other = vec!["B".to_string()];
        let row = table.ensure_row(&k, &other);
        assert_eq!(row.get("A"), Some(&5.0));
        assert!(!row.contains_key("B"));
    }

    #[test]
    fn json_round_trip_is_exact() {
        let table = sample();
        let json = table.to_json_string().unwrap();
        let back = ValueTable::from_json_str(&json).unwrap();
        assert_eq!(back, table);
        assert_eq!(back.to_json_string().unwrap(), json);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.json");
        let table = sample();
        table.save(&path).unwrap();
        assert_eq!(ValueTable::load(&path).unwrap(), table);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, "{not json").unwrap();
        assert!(ValueTable::load(&path).is_err());
        assert!(ValueTable::load_or_empty(&path).is_empty());
        assert!(ValueTable::load_or_empty(dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn load_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, "[{\"state\": 3}]").unwrap();
        match ValueTable::load(&path).unwrap_err() {
            DispatchError::Json { context, .. } => assert_eq!(context, path.display().to_string()),
            other => panic!("unexpected error: {other}"),
        }
        match ValueTable::from_json_str("[1]").unwrap_err() {
            DispatchError::Json { context, .. } => assert_eq!(context, "value table"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn counts_values() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value_count(), 4);
        assert_eq!(table.value(&key(&[1.0, 2.0]), "S1"), Some(0.0));
        assert_eq!(table.value(&key(&[1.0, 2.0]), "S9"), None);
    }
}
