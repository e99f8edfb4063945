//! Append-only training log.
//!
//! One CSV row per (episode, tick, truck) transition.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::algorithms::rl::environment::TransitionOutcome;
use crate::csv::field;
use crate::error::{DispatchError, Result};

const HEADER: &str = "episode,tick,truck,state,action,explored,reward,rewards,best_action,optimal,value_row,chosen_eta";

/// Writes training transitions as CSV rows.
pub struct TrainingLog<W: Write> {
    writer: W,
    path: PathBuf,
    rows: usize,
}

impl TrainingLog<BufWriter<File>> {
    /// Creates (or truncates) a log file and writes the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| DispatchError::io(path, e))?;
        Self::new(BufWriter::new(file), path)
    }
}

impl<W: Write> TrainingLog<W> {
    /// Wraps `writer` and writes the header. `path` is only used in errors.
    pub fn new(mut writer: W, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        writeln!(writer, "{HEADER}").map_err(|e| DispatchError::io(&path, e))?;
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    /// Appends one transition.
    pub fn record(&mut self, episode: usize, tick: u64, outcome: &TransitionOutcome) -> Result<()> {
        let rewards = outcome
            .rewards
            .iter()
            .map(|(a, r)| format!("{a}={r}"))
            .collect::<Vec<_>>()
            .join(";");
        let value_row = outcome
            .value_row
            .iter()
            .map(|(a, v)| format!("{a}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        let eta = outcome
            .chosen_eta
            .map(|e| e.to_string())
            .unwrap_or_default();
        let state = outcome.state.to_string();

        writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            episode,
            tick,
            field(&outcome.truck_id),
            field(&state),
            field(&outcome.choice.action),
            outcome.choice.explored,
            outcome.reward,
            field(&rewards),
            field(outcome.best_action.as_deref().unwrap_or("")),
            outcome.optimal,
            field(&value_row),
            eta,
        )
        .map_err(|e| DispatchError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| DispatchError::io(&self.path, e))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
