//! Episodic training over a tick dataset.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::log::TrainingLog;
use crate::algorithms::rl::agent::QLearningAgent;
use crate::algorithms::rl::config::TrainingConfig;
use crate::algorithms::rl::environment::TransitionDriver;
use crate::error::{DispatchError, Result};
use crate::fleet::TickDataset;

/// Summary of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// Total reward per episode, in episode order.
    pub episode_rewards: Vec<f64>,
    /// Transitions applied.
    pub decisions: usize,
    /// Trucks skipped for lack of valid actions.
    pub skipped: usize,
    /// Decisions that matched the best immediate reward.
    pub optimal_decisions: usize,
    /// Checkpoint files written.
    pub checkpoints: Vec<PathBuf>,
    pub final_epsilon: f64,
}

impl TrainingReport {
    /// Mean of the per-episode totals, or 0 with no episodes.
    pub fn mean_reward(&self) -> f64 {
        if self.episode_rewards.is_empty() {
            0.0
        } else {
            self.episode_rewards.iter().sum::<f64>() / self.episode_rewards.len() as f64
        }
    }
}

/// Runs Q-learning episodes over a dataset.
///
/// Each tick is paired with the following one; with `wrap_last_tick` the
/// last tick is paired with the first, otherwise it only serves as a
/// successor. ε decays once per episode.
pub struct Trainer {
    driver: TransitionDriver,
    config: TrainingConfig,
    checkpoint_dir: Option<PathBuf>,
}

impl Trainer {
    pub fn new(driver: TransitionDriver, config: TrainingConfig) -> Self {
        Self {
            driver,
            config,
            checkpoint_dir: None,
        }
    }

    /// Enables checkpoints every `checkpoint_interval` episodes into `dir`.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `agent` on `dataset`, optionally writing every transition to `log`.
    pub fn train<W: Write>(
        &self,
        agent: &mut QLearningAgent,
        dataset: &TickDataset,
        mut log: Option<&mut TrainingLog<W>>,
    ) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();

        for episode in 1..=self.config.episodes {
            let mut total = 0.0;

            for position in 0..dataset.len() {
                let Some((tick, current)) = dataset.get(position) else {
                    continue;
                };
                let Some((_, next)) = dataset
                    .next_position(position, self.config.wrap_last_tick)
                    .and_then(|p| dataset.get(p))
                else {
                    continue;
                };

                for truck_id in current.trucks.keys() {
                    match self.driver.step(agent, truck_id, current, next) {
                        Ok(outcome) => {
                            total += outcome.reward;
                            report.decisions += 1;
                            if outcome.optimal {
                                report.optimal_decisions += 1;
                            }
                            if let Some(log) = log.as_deref_mut() {
                                log.record(episode, tick, &outcome)?;
                            }
                        }
                        Err(DispatchError::NoValidActions(_)) => {
                            debug!(truck = %truck_id, tick, "No valid actions, skipping truck");
                            report.skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            agent.decay_epsilon();
            report.episode_rewards.push(total);
            info!(
                episode,
                total_reward = total,
                epsilon = agent.epsilon(),
                states = agent.table().len(),
                "Episode finished"
            );

            if let Some(path) = self.checkpoint_path(episode) {
                agent.table().save(&path)?;
                report.checkpoints.push(path);
            }
        }

        if let Some(log) = log {
            log.flush()?;
        }
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "Some trucks had no valid actions");
        }
        report.final_epsilon = agent.epsilon();
        Ok(report)
    }

    fn checkpoint_path(&self, episode: usize) -> Option<PathBuf> {
        let interval = self.config.checkpoint_interval;
        if interval == 0 || episode % interval != 0 {
            return None;
        }
        self.checkpoint_dir
            .as_deref()
            .map(|dir| checkpoint_file(dir, episode))
    }
}

/// Checkpoint file for `episode` inside `dir`.
pub fn checkpoint_file(dir: &Path, episode: usize) -> PathBuf {
    dir.join(format!("value_table_ep{episode}.json"))
}
