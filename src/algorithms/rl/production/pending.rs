//! Decisions awaiting their reward on the next dispatch invocation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::algorithms::rl::types::StateKey;
use crate::error::{DispatchError, Result};
use crate::{Id, ShovelId, TruckId};

/// A dispatch decision whose outcome is only observable on a later tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub tick_id: Option<String>,
    pub truck_id: TruckId,
    pub state: StateKey,
    pub action: ShovelId,
    pub valid_actions: Vec<ShovelId>,
    /// RFC 3339 time the decision was made.
    pub timestamp: String,
    /// Dispatch session that produced the decision.
    #[serde(default)]
    pub session_id: Id,
}

/// File-backed hand-off of pending decisions between invocations.
///
/// The file is consumed on read: [`PendingStore::take`] deletes it so a
/// decision is never replayed twice.
#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deletes the pending file.
    ///
    /// A missing file yields no decisions. A corrupt file is deleted as
    /// well and yields no decisions, with a warning.
    pub fn take(&self) -> Vec<PendingDecision> {
        if !self.path.exists() {
            return Vec::new();
        }
        let decisions = match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<Vec<PendingDecision>>(&text) {
                Ok(decisions) => decisions,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Corrupt pending decisions ignored"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable pending decisions ignored"
                );
                Vec::new()
            }
        };
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not delete pending decisions");
        }
        decisions
    }

    /// Persists `decisions` for the next invocation, replacing any file.
    pub fn save(&self, decisions: &[PendingDecision]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(decisions)
            .map_err(|e| DispatchError::json("pending decisions", e))?;
        fs::write(&self.path, json).map_err(|e| DispatchError::io(&self.path, e))?;
        info!(
            path = %self.path.display(),
            decisions = decisions.len(),
            "Saved pending decisions"
        );
        Ok(())
    }
}
