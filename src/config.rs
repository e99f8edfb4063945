//! Top-level configuration file.
//!
//! A single TOML document; every section and field is optional and falls
//! back to its default.
//!
//! ```toml
//! [fleet]
//! shovels = ["PH002", "EX004", "PH003", "PH001", "CF001", "CF002"]
//!
//! [paths]
//! ticks = "data/ticks.json"
//! value_table = "data/value_table.json"
//!
//! [agent]
//! alpha = 0.1
//! epsilon = 0.7
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::algorithms::rl::config::{
    AgentConfig, EncoderConfig, ProductionConfig, RewardConfig, SweepConfig, TrainingConfig,
};
use crate::algorithms::rl::environment::{TransitionDriver, ValidActionMode};
use crate::algorithms::rl::observation::StateEncoder;
use crate::algorithms::rl::production::Dispatcher;
use crate::algorithms::rl::sweep::Sweep;
use crate::algorithms::rl::training::Trainer;
use crate::error::{DispatchError, Result};
use crate::ShovelId;

/// The shovel universe. Its order fixes the state-key layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub shovels: Vec<ShovelId>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            shovels: ["PH002", "EX004", "PH003", "PH001", "CF001", "CF002"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Multi-tick log used by training, sweeps, replay, and evaluation.
    pub ticks: PathBuf,
    /// Single-tick snapshot used by realtime dispatch.
    pub tick: PathBuf,
    pub value_table: PathBuf,
    pub training_log: Option<PathBuf>,
    pub pending: PathBuf,
    pub sweep_results: PathBuf,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ticks: PathBuf::from("data/ticks.json"),
            tick: PathBuf::from("data/tick.json"),
            value_table: PathBuf::from("data/value_table.json"),
            training_log: None,
            pending: PathBuf::from("data/pending_decisions.json"),
            sweep_results: PathBuf::from("data/sweep_results.csv"),
            checkpoint_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Everything the dispatcher can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub fleet: FleetConfig,
    pub paths: PathsConfig,
    pub agent: AgentConfig,
    pub training: TrainingConfig,
    pub production: ProductionConfig,
    pub encoder: EncoderConfig,
    pub reward: RewardConfig,
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DispatchError::io(path, e))?;
        toml::from_str(&text).map_err(|source| DispatchError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DispatchError::InvalidConfig(msg));

        if self.fleet.shovels.is_empty() {
            return invalid("fleet.shovels must not be empty".into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.fleet.shovels.iter().find(|s| !seen.insert(s.as_str())) {
            return invalid(format!("duplicate shovel id {dup}"));
        }
        self.agent.validate().map_err(DispatchError::InvalidConfig)?;
        if self.sweep.workers == 0 {
            return invalid("sweep.workers must be at least 1".into());
        }
        if !(self.encoder.position_bin > 0.0 && self.encoder.position_bin.is_finite()) {
            return invalid(format!(
                "encoder.position_bin must be positive and finite, got {}",
                self.encoder.position_bin
            ));
        }
        let thresholds: [(&str, &[f64]); 3] = [
            ("encoder.fuel_thresholds", &self.encoder.fuel_thresholds[..]),
            ("encoder.eta_thresholds", &self.encoder.eta_thresholds[..]),
            ("reward.eta_thresholds", &self.reward.eta_thresholds[..]),
        ];
        for (name, values) in thresholds {
            if !strictly_increasing(values) {
                return invalid(format!(
                    "{name} must be finite and strictly increasing, got {values:?}"
                ));
            }
        }
        if self.encoder.active_state_code != self.reward.active_state_code {
            return invalid(format!(
                "encoder.active_state_code ({}) differs from reward.active_state_code ({})",
                self.encoder.active_state_code, self.reward.active_state_code
            ));
        }
        Ok(())
    }

    pub fn encoder(&self) -> StateEncoder {
        StateEncoder::new(self.fleet.shovels.clone(), self.encoder.clone())
    }

    /// Driver over the whole fleet, as used by training and sweeps.
    pub fn training_driver(&self) -> TransitionDriver {
        TransitionDriver::new(self.encoder(), self.reward.clone(), ValidActionMode::Fleet)
    }

    pub fn trainer(&self) -> Trainer {
        let trainer = Trainer::new(self.training_driver(), self.training.clone());
        match &self.paths.checkpoint_dir {
            Some(dir) => trainer.with_checkpoint_dir(dir),
            None => trainer,
        }
    }

    pub fn sweep(&self) -> Sweep {
        Sweep::new(
            self.training_driver(),
            self.agent.clone(),
            self.training.clone(),
            self.sweep.clone(),
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.encoder(),
            self.reward.clone(),
            self.agent.clone(),
            self.production.clone(),
        )
    }
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: DispatchConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, DispatchConfig::default());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.fleet.shovels.len(), 6);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg: DispatchConfig = toml::from_str(
            r#"
            [fleet]
            shovels = ["S1", "S2"]

            [agent]
            alpha = 0.3
            seed = 42

            [production]
            save_interval = 10

            [reward]
            invalid_action = -50.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fleet.shovels, vec!["S1", "S2"]);
        assert_eq!(cfg.agent.alpha, 0.3);
        assert_eq!(cfg.agent.gamma, 0.9);
        assert_eq!(cfg.agent.seed, Some(42));
        assert_eq!(cfg.production.save_interval, 10);
        assert_eq!(cfg.production.optimize_status, "waiting for shovel");
        assert_eq!(cfg.reward.invalid_action, -50.0);
        assert_eq!(cfg.encoder().arity(), 4 + 6 * 2);
    }

    #[test]
    fn rejects_duplicate_shovels() {
        let mut cfg = DispatchConfig::default();
        cfg.fleet.shovels = vec!["S1".into(), "S2".into(), "S1".into()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate shovel id S1"));
    }

    #[test]
    fn rejects_empty_fleet_and_zero_workers() {
        let mut cfg = DispatchConfig::default();
        cfg.fleet.shovels.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = DispatchConfig::default();
        cfg.sweep.workers = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("workers"));
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let mut cfg = DispatchConfig::default();
        cfg.agent.gamma = 1.5;
        assert!(matches!(cfg.validate(), Err(DispatchError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_nan_position_bin() {
        let cfg: DispatchConfig = toml::from_str("[encoder]\nposition_bin = nan\n").unwrap();
        assert!(cfg.encoder.position_bin.is_nan());
        assert!(cfg.validate().unwrap_err().to_string().contains("position_bin"));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut cfg = DispatchConfig::default();
        cfg.encoder.fuel_thresholds = [50.0, 20.0];
        assert!(cfg.validate().unwrap_err().to_string().contains("fuel_thresholds"));

        let mut cfg = DispatchConfig::default();
        cfg.encoder.eta_thresholds = [3.0, 6.0, 6.0, 12.0];
        assert!(cfg.validate().unwrap_err().to_string().contains("encoder.eta_thresholds"));

        let mut cfg = DispatchConfig::default();
        cfg.reward.eta_thresholds = [3.0, f64::NAN, 9.0, 12.0];
        assert!(cfg.validate().unwrap_err().to_string().contains("reward.eta_thresholds"));
    }

    #[test]
    fn rejects_mismatched_active_codes() {
        let mut cfg = DispatchConfig::default();
        cfg.reward.active_state_code = 2;
        assert!(cfg.validate().unwrap_err().to_string().contains("active_state_code"));
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haulq.toml");
        fs::write(&path, "[agent]\nalpha = \"high\"\n").unwrap();
        match DispatchConfig::from_file(&path).unwrap_err() {
            DispatchError::Toml { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            DispatchConfig::from_file(dir.path().join("missing.toml")),
            Err(DispatchError::Io { .. })
        ));
    }
}
