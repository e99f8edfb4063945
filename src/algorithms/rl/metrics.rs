//! Evaluation and production metrics for the dispatcher.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::environment::TransitionDriver;
use super::policy::{DecisionContext, Policy};
use super::reward::RewardComputer;
use super::types::StateKey;
use crate::fleet::TickDataset;
use crate::ShovelId;

/// Aggregated metrics of a policy run greedily over a dataset, without learning.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetrics {
    pub policy: String,
    /// Decisions scored.
    pub decisions: usize,
    /// Trucks with no valid action.
    pub skipped: usize,
    pub total_reward: f64,
    /// Mean reward per decision.
    pub mean_reward: f64,
    /// Percentage of decisions matching the best immediate reward.
    pub optimal_rate: f64,
}

impl EvaluationMetrics {
    /// Evaluates `policy` over every consecutive tick pair of `dataset`.
    ///
    /// Each decision is scored exactly like a training transition: the
    /// next tick's status, the current tick's shovels, and the truck's
    /// current ETAs.
    pub fn evaluate(
        dataset: &TickDataset,
        driver: &TransitionDriver,
        policy: &mut dyn Policy,
    ) -> Self {
        let mut decisions = 0usize;
        let mut skipped = 0usize;
        let mut optimal = 0usize;
        let mut total_reward = 0.0;

        for position in 0..dataset.len() {
            let (Some((_, current)), Some((_, next))) = (
                dataset.get(position),
                dataset
                    .next_position(position, false)
                    .and_then(|p| dataset.get(p)),
            ) else {
                continue;
            };

            for (truck_id, truck) in &current.trucks {
                let state = driver.encoder().encode(truck, &current.shovels);
                let valid = driver.valid_actions(truck);
                let ctx = DecisionContext {
                    state: &state,
                    valid_actions: &valid,
                    truck,
                    shovels: &current.shovels,
                };
                let Some(action) = policy.select(&ctx) else {
                    skipped += 1;
                    continue;
                };

                let next_truck = next.truck(truck_id).unwrap_or(truck);
                let rewards = RewardComputer::compute_all(
                    &next_truck.status,
                    &valid,
                    &current.shovels,
                    Some(&truck.eta),
                    driver.reward_config(),
                );
                let reward = RewardComputer::compute(
                    &next_truck.status,
                    &action,
                    &current.shovels,
                    Some(&truck.eta),
                    driver.reward_config(),
                );
                if RewardComputer::best_action(&rewards) == Some(&action) {
                    optimal += 1;
                }
                decisions += 1;
                total_reward += reward;
            }
        }

        let (mean_reward, optimal_rate) = if decisions > 0 {
            (
                total_reward / decisions as f64,
                optimal as f64 / decisions as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            policy: policy.name().to_string(),
            decisions,
            skipped,
            total_reward,
            mean_reward,
            optimal_rate,
        }
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Evaluation Metrics ({}) ===", self.policy)?;
        writeln!(f, "  Decisions:               {}", self.decisions)?;
        writeln!(f, "  Skipped trucks:          {}", self.skipped)?;
        writeln!(f, "  Total reward:            {:.2}", self.total_reward)?;
        writeln!(f, "  Mean reward / decision:  {:.3}", self.mean_reward)?;
        writeln!(f, "  Optimal decisions:       {:.1}%", self.optimal_rate)
    }
}

/// Counters collected while dispatching in production.
#[derive(Debug, Clone, Default)]
pub struct ProductionMetrics {
    pub ticks: usize,
    /// Trucks the agent assigned.
    pub optimized: usize,
    /// Trucks left on their current assignment.
    pub fixed: usize,
    /// Trucks that could not be processed.
    pub errors: usize,
    pub total_reward: f64,
    /// Decisions made from a state absent from the initial table.
    pub new_states: usize,
    /// Updates that moved an existing value by more than 1e-6.
    pub updated_values: usize,
    pub explorations: usize,
    pub exploitations: usize,
    pub actions_per_shovel: BTreeMap<ShovelId, usize>,
    pub initial_states: usize,
    pub final_states: usize,
    unique_states: HashSet<StateKey>,
}

impl ProductionMetrics {
    pub fn new(initial_states: usize) -> Self {
        Self {
            initial_states,
            final_states: initial_states,
            ..Self::default()
        }
    }

    /// Records one optimized decision.
    pub fn record_decision(&mut self, state: &StateKey, action: &str, explored: bool, reward: f64) {
        self.optimized += 1;
        self.total_reward += reward;
        if explored {
            self.explorations += 1;
        } else {
            self.exploitations += 1;
        }
        *self
            .actions_per_shovel
            .entry(action.to_string())
            .or_insert(0) += 1;
        self.unique_states.insert(state.clone());
    }

    /// Distinct states decided from.
    pub fn unique_states(&self) -> usize {
        self.unique_states.len()
    }

    /// Mean reward per optimized truck.
    pub fn mean_reward(&self) -> f64 {
        if self.optimized == 0 {
            0.0
        } else {
            self.total_reward / self.optimized as f64
        }
    }

    /// Percentage of optimized decisions that explored.
    pub fn exploration_rate(&self) -> f64 {
        if self.optimized == 0 {
            0.0
        } else {
            self.explorations as f64 / self.optimized as f64 * 100.0
        }
    }
}

impl fmt::Display for ProductionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Production Metrics ===")?;
        writeln!(f, "  Ticks processed:         {}", self.ticks)?;
        writeln!(f, "  Trucks optimized:        {}", self.optimized)?;
        writeln!(f, "  Trucks fixed:            {}", self.fixed)?;
        writeln!(f, "  Trucks with errors:      {}", self.errors)?;
        writeln!(f, "  Unique states seen:      {}", self.unique_states())?;
        writeln!(f, "  New states:              {}", self.new_states)?;
        writeln!(f, "  Values updated:          {}", self.updated_values)?;
        writeln!(
            f,
            "  Explore / exploit:       {} / {} ({:.1}%)",
            self.explorations,
            self.exploitations,
            self.exploration_rate()
        )?;
        writeln!(f, "  Total reward:            {:.2}", self.total_reward)?;
        writeln!(f, "  Mean reward / truck:     {:.3}", self.mean_reward())?;
        for (shovel, count) in &self.actions_per_shovel {
            let pct = *count as f64 / self.optimized.max(1) as f64 * 100.0;
            writeln!(f, "    {shovel}: {count} ({pct:.1}%)")?;
        }
        writeln!(
            f,
            "  Table states:            {} -> {} (+{})",
            self.initial_states,
            self.final_states,
            self.final_states.saturating_sub(self.initial_states)
        )
    }
}
