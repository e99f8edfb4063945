//! Tabular Q-learning agent.
//!
//! ```text
//! Q(s, a) ← Q(s, a) + α · [r + γ · max_a' Q(s', a') − Q(s, a)]
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::config::AgentConfig;
use super::policy::{DecisionContext, Policy};
use super::types::{ActionChoice, StateKey};
use super::value_table::{ValueRow, ValueTable};
use crate::ShovelId;

/// Epsilon-greedy Q-learning agent over a fixed shovel action universe.
///
/// The agent exclusively owns its [`ValueTable`]; parallel trainers each get
/// their own agent.
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    actions: Vec<ShovelId>,
    table: ValueTable,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    epsilon_min: f64,
    epsilon_decay: f64,
    rng: StdRng,
}

impl QLearningAgent {
    /// Creates an agent with an empty table.
    pub fn new(actions: Vec<ShovelId>, config: &AgentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            actions,
            table: ValueTable::new(),
            alpha: config.alpha,
            gamma: config.gamma,
            epsilon: config.epsilon,
            epsilon_min: config.epsilon_min,
            epsilon_decay: config.epsilon_decay,
            rng,
        }
    }

    /// Replaces the value table, e.g. with one loaded from disk.
    pub fn with_table(mut self, table: ValueTable) -> Self {
        self.table = table;
        self
    }

    /// The full action universe.
    pub fn actions(&self) -> &[ShovelId] {
        &self.actions
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Chooses an action for `state` among `valid_actions`.
    ///
    /// An unseen state gets a row of zeros over `valid_actions`. With
    /// probability ε the choice is uniformly random; otherwise it is the first
    /// action in `valid_actions` order with the largest value. Returns `None`
    /// when `valid_actions` is empty.
    pub fn select_action(
        &mut self,
        state: &StateKey,
        valid_actions: &[ShovelId],
    ) -> Option<ActionChoice> {
        if valid_actions.is_empty() {
            return None;
        }
        let row = self.table.ensure_row(state, valid_actions);

        if self.rng.gen::<f64>() < self.epsilon {
            return valid_actions
                .choose(&mut self.rng)
                .map(|a| ActionChoice::explore(a.clone()));
        }

        argmax(row, valid_actions).map(|a| ActionChoice::exploit(a.clone()))
    }

    /// Best known action without exploring or touching the table.
    pub fn greedy_action<'a>(
        &self,
        state: &StateKey,
        valid_actions: &'a [ShovelId],
    ) -> Option<&'a ShovelId> {
        match self.table.row(state) {
            Some(row) => argmax(row, valid_actions),
            None => valid_actions.first(),
        }
    }

    /// Applies one temporal-difference update and returns the new value.
    ///
    /// An unseen `state` is initialized over the full action universe; an
    /// unseen `next_state` over `next_valid_actions` (possibly empty). Only
    /// `Q(state, action)` changes.
    pub fn update(
        &mut self,
        state: &StateKey,
        action: &str,
        reward: f64,
        next_state: &StateKey,
        next_valid_actions: &[ShovelId],
    ) -> f64 {
        if !self.table.contains(state) {
            debug!(state = %state, "Added state");
        }
        self.table.ensure_row(state, &self.actions);

        if !self.table.contains(next_state) {
            debug!(state = %next_state, "Added next state");
        }
        let next_row = self.table.ensure_row(next_state, next_valid_actions);
        let target = next_valid_actions
            .iter()
            .map(|a| next_row.get(a).copied().unwrap_or(0.0))
            .max_by(f64::total_cmp)
            .map_or(reward, |best| reward + self.gamma * best);

        let alpha = self.alpha;
        let row = self.table.ensure_row(state, &self.actions);
        let value = row.entry(action.to_string()).or_insert(0.0);
        *value += alpha * (target - *value);
        *value
    }

    /// Multiplies ε by the decay rate while it is above the floor.
    ///
    /// ε never goes below `epsilon_min` and never increases.
    pub fn decay_epsilon(&mut self) {
        if self.epsilon > self.epsilon_min {
            self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
        }
    }
}

/// Greedy view of the learned table: never explores and never updates.
impl Policy for QLearningAgent {
    fn select(&mut self, ctx: &DecisionContext<'_>) -> Option<ShovelId> {
        self.greedy_action(ctx.state, ctx.valid_actions).cloned()
    }

    fn name(&self) -> &str {
        "q_learning"
    }
}

/// First action in `valid_actions` order holding the largest value.
///
/// Actions missing from the row count as `0.0`.
pub(crate) fn argmax<'a>(row: &ValueRow, valid_actions: &'a [ShovelId]) -> Option<&'a ShovelId> {
    let mut best: Option<(&ShovelId, f64)> = None;
    for action in valid_actions {
        let value = row.get(action).copied().unwrap_or(0.0);
        match best {
            Some((_, v)) if value <= v => {}
            _ => best = Some((action, value)),
        }
    }
    best.map(|(a, _)| a)
}
