//! Configuration for state encoding, reward shaping, and Q-learning.

use serde::{Deserialize, Serialize};

use crate::fleet::ACTIVE_STATE;
use crate::units::TimingUnit;

/// Hyperparameters of the Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate α.
    pub alpha: f64,
    /// Discount factor γ.
    pub gamma: f64,
    /// Initial exploration rate ε.
    pub epsilon: f64,
    /// Exploration floor ε_min; decay stops once ε is at or below it.
    pub epsilon_min: f64,
    /// Multiplicative per-episode decay ε_decay.
    pub epsilon_decay: f64,
    /// Seed for the exploration RNG; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.7,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Returns a description of the first out-of-range hyperparameter.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(format!("alpha must be in (0, 1], got {}", self.alpha));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(format!("epsilon must be in [0, 1], got {}", self.epsilon));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) {
            return Err(format!(
                "epsilon_min must be in [0, 1], got {}",
                self.epsilon_min
            ));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            ));
        }
        Ok(())
    }
}

/// Discretization parameters for the state encoder.
///
/// These must be identical between training and production: any change
/// produces keys unrelated to the ones already in the value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Width of a position bin in grid units.
    pub position_bin: f64,
    /// Fuel bucket boundaries: `< low → 0`, `< high → 1`, else `2`.
    pub fuel_thresholds: [f64; 2],
    /// ETA bucket boundaries in minutes; values past the last one land in the top bucket.
    pub eta_thresholds: [f64; 4],
    /// Shovel state code meaning "available".
    pub active_state_code: i64,
    /// Unit of `shovel_spot_time` and `shovel_cycle` in the telemetry.
    pub timing_unit: TimingUnit,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            position_bin: 500.0,
            fuel_thresholds: [20.0, 50.0],
            eta_thresholds: [3.0, 6.0, 9.0, 12.0],
            active_state_code: ACTIVE_STATE,
            timing_unit: TimingUnit::Minutes,
        }
    }
}

/// Reward shaping constants.
///
/// Defaults reproduce the dispatcher's tuned values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Shovel state code meaning "available".
    pub active_state_code: i64,
    /// Status label that earns the waiting bonuses.
    pub waiting_status: String,
    /// Returned alone when the chosen shovel is absent from the snapshot.
    pub invalid_action: f64,
    /// Added when the chosen shovel is not active.
    pub inactive_shovel: f64,
    /// Queue terms for queue lengths 0, 1, 2 and 3+.
    pub queue: [f64; 4],
    /// Added when the truck is waiting and the shovel is active.
    pub waiting_active: f64,
    /// Added when the truck is loading or travelling.
    pub busy_truck: f64,
    /// Added when the truck is waiting and the shovel is active with no queue.
    pub idle_shovel: f64,
    /// ETA band boundaries in minutes.
    pub eta_thresholds: [f64; 4],
    /// ETA band terms, one per band plus the band past the last threshold.
    pub eta_bands: [f64; 5],
    /// Added when the chosen shovel has the smallest active ETA.
    pub best_eta: f64,
    /// Added when the chosen ETA is within `near_best_ratio` of the smallest.
    pub near_best_eta: f64,
    pub near_best_ratio: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            active_state_code: ACTIVE_STATE,
            waiting_status: "waiting for shovel".to_string(),
            invalid_action: -20.0,
            inactive_shovel: -10.0,
            queue: [3.0, 1.0, -2.0, -4.0],
            waiting_active: 8.0,
            busy_truck: -3.0,
            idle_shovel: 5.0,
            eta_thresholds: [3.0, 6.0, 9.0, 12.0],
            eta_bands: [8.0, 5.0, 2.0, -1.0, -3.0],
            best_eta: 4.0,
            near_best_eta: 2.0,
            near_best_ratio: 1.2,
        }
    }
}

/// Training loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the dataset.
    pub episodes: usize,
    /// Save a checkpoint every N episodes; 0 disables checkpoints.
    pub checkpoint_interval: usize,
    /// Pair the last tick with the first one.
    pub wrap_last_tick: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 2,
            checkpoint_interval: 0,
            wrap_last_tick: true,
        }
    }
}

/// Production dispatch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Save the value table every N processed ticks in replay mode.
    pub save_interval: usize,
    /// Only trucks in this status are reassigned; the rest keep their shovel.
    pub optimize_status: String,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            save_interval: 5,
            optimize_status: "waiting for shovel".to_string(),
        }
    }
}

/// One-factor-at-a-time hyperparameter sweep.
///
/// Each grid varies one parameter while the other two stay at their
/// baseline value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub alphas: Vec<f64>,
    pub gammas: Vec<f64>,
    pub epsilon_decays: Vec<f64>,
    pub baseline_alpha: f64,
    pub baseline_gamma: f64,
    pub baseline_epsilon_decay: f64,
    /// Training episodes per configuration.
    pub episodes: usize,
    /// Concurrent training runs.
    pub workers: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            alphas: vec![0.1, 0.3, 0.5],
            gammas: vec![0.8, 0.9, 0.99],
            epsilon_decays: vec![0.99, 0.995, 0.999],
            baseline_alpha: 0.1,
            baseline_gamma: 0.9,
            baseline_epsilon_decay: 0.995,
            episodes: 5,
            workers: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_grid_sizes() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.alphas.len() + cfg.gammas.len() + cfg.epsilon_decays.len(), 9);
        assert_eq!(cfg.episodes, 5);
    }

    #[test]
    fn default_agent_config_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let cfg = AgentConfig {
            alpha: 0.0,
            ..AgentConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("alpha"));
    }

    #[test]
    fn rejects_out_of_range_decay() {
        let cfg = AgentConfig {
            epsilon_decay: 1.5,
            ..AgentConfig::default()
        };
        assert!(cfg.validate().unwrap_err().contains("epsilon_decay"));
    }

    #[test]
    fn default_reward_constants() {
        let cfg = RewardConfig::default();
        assert_eq!(cfg.invalid_action, -20.0);
        assert_eq!(cfg.queue, [3.0, 1.0, -2.0, -4.0]);
        assert_eq!(cfg.near_best_ratio, 1.2);
    }

    #[test]
    fn partial_encoder_section_keeps_defaults() {
        let cfg: EncoderConfig = toml::from_str("position_bin = 250.0").unwrap();
        assert_eq!(cfg.position_bin, 250.0);
        assert_eq!(cfg.eta_thresholds, [3.0, 6.0, 9.0, 12.0]);
        assert_eq!(cfg.active_state_code, 1);
    }
}
