//! Tick transition driver.
//!
//! Implements the atomic learning step for one truck:
//! encode → select → fetch next → encode next → reward → update.
//! The reward always uses the status observed on the *next* tick.

use tracing::debug;

use super::agent::QLearningAgent;
use super::config::RewardConfig;
use super::observation::StateEncoder;
use super::reward::RewardComputer;
use super::types::{ActionChoice, StateKey};
use super::value_table::ValueRow;
use crate::error::{DispatchError, Result};
use crate::fleet::{TickSnapshot, TruckRecord};
use crate::{ShovelId, TruckId};

/// Which shovels a truck may be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidActionMode {
    /// Every shovel of the fleet (training).
    Fleet,
    /// Shovels the truck has an ETA entry for (production).
    EtaMap,
}

/// Result of one learning step for one truck.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub truck_id: TruckId,
    pub state: StateKey,
    pub next_state: StateKey,
    pub valid_actions: Vec<ShovelId>,
    pub choice: ActionChoice,
    /// True when `state` was not in the table before selection.
    pub new_state: bool,
    /// Status observed on the next tick.
    pub next_status: String,
    pub reward: f64,
    /// Reward every valid action would have earned, in valid-action order.
    pub rewards: Vec<(ShovelId, f64)>,
    pub best_action: Option<ShovelId>,
    /// True when the chosen action is `best_action`.
    pub optimal: bool,
    /// Value of the chosen action after the update.
    pub updated_value: f64,
    /// Row of `state` after the update, restricted to the valid actions.
    pub value_row: ValueRow,
    /// ETA to the chosen shovel on the current tick.
    pub chosen_eta: Option<f64>,
}

/// Applies learning steps to an agent from pairs of consecutive ticks.
#[derive(Debug, Clone)]
pub struct TransitionDriver {
    encoder: StateEncoder,
    reward: RewardConfig,
    mode: ValidActionMode,
}

impl TransitionDriver {
    pub fn new(encoder: StateEncoder, reward: RewardConfig, mode: ValidActionMode) -> Self {
        Self {
            encoder,
            reward,
            mode,
        }
    }

    pub fn encoder(&self) -> &StateEncoder {
        &self.encoder
    }

    pub fn reward_config(&self) -> &RewardConfig {
        &self.reward
    }

    pub fn mode(&self) -> ValidActionMode {
        self.mode
    }

    /// Valid actions for `truck` under this driver's mode.
    ///
    /// In [`ValidActionMode::EtaMap`] the ETA-map shovels come in fleet
    /// order, followed by any shovel outside the fleet in lexicographic order.
    pub fn valid_actions(&self, truck: &TruckRecord) -> Vec<ShovelId> {
        valid_actions(self.mode, self.encoder.shovels(), truck)
    }

    /// Runs the full learning step for `truck_id` from `current` to `next`.
    ///
    /// A truck missing from `next` is compared against its current record.
    ///
    /// # Errors
    ///
    /// [`DispatchError::TruckNotFound`] if the truck is not in `current`, and
    /// [`DispatchError::NoValidActions`] if it has nothing to choose from.
    pub fn step(
        &self,
        agent: &mut QLearningAgent,
        truck_id: &str,
        current: &TickSnapshot,
        next: &TickSnapshot,
    ) -> Result<TransitionOutcome> {
        let truck = current
            .truck(truck_id)
            .ok_or_else(|| DispatchError::TruckNotFound(truck_id.to_string()))?;

        // 1. encode
        let state = self.encoder.encode(truck, &current.shovels);
        let valid = self.valid_actions(truck);
        let new_state = !agent.table().contains(&state);

        // 2. select
        let choice = agent
            .select_action(&state, &valid)
            .ok_or_else(|| DispatchError::NoValidActions(truck_id.to_string()))?;

        // 3. fetch next
        let next_truck = next.truck(truck_id).unwrap_or(truck);

        // 4. encode next
        let next_state = self.encoder.encode(next_truck, &next.shovels);

        // 5. reward
        let rewards = RewardComputer::compute_all(
            &next_truck.status,
            &valid,
            &current.shovels,
            Some(&truck.eta),
            &self.reward,
        );
        let reward = rewards
            .iter()
            .find(|(a, _)| *a == choice.action)
            .map(|(_, r)| *r)
            .unwrap_or(self.reward.invalid_action);
        let best_action = RewardComputer::best_action(&rewards).cloned();
        let optimal = best_action.as_deref() == Some(choice.action.as_str());

        // 6. update
        let updated_value = agent.update(&state, &choice.action, reward, &next_state, &valid);

        let value_row = agent
            .table()
            .row(&state)
            .map(|row| {
                valid
                    .iter()
                    .map(|a| (a.clone(), row.get(a).copied().unwrap_or(0.0)))
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            truck = %truck_id,
            action = %choice.action,
            explored = choice.explored,
            reward,
            optimal,
            "Transition applied"
        );

        Ok(TransitionOutcome {
            truck_id: truck_id.to_string(),
            chosen_eta: truck.eta_to(&choice.action),
            state,
            next_state,
            valid_actions: valid,
            choice,
            new_state,
            next_status: next_truck.status.clone(),
            reward,
            rewards,
            best_action,
            optimal,
            updated_value,
            value_row,
        })
    }
}

/// Valid actions for `truck` given a fleet ordering.
pub fn valid_actions(
    mode: ValidActionMode,
    fleet: &[ShovelId],
    truck: &TruckRecord,
) -> Vec<ShovelId> {
    match mode {
        ValidActionMode::Fleet => fleet.to_vec(),
        ValidActionMode::EtaMap => {
            let mut actions: Vec<ShovelId> = fleet
                .iter()
                .filter(|s| truck.eta.contains_key(s.as_str()))
                .cloned()
                .collect();
            actions.extend(
                truck
                    .eta
                    .keys()
                    .filter(|s| !fleet.contains(s))
                    .cloned(),
            );
            actions
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rl::config::{AgentConfig, EncoderConfig};
    use crate::fleet::ShovelRecord;

    fn fleet() -> Vec<ShovelId> {
        vec!["S1".to_string(), "S2".to_string()]
    }

    fn driver(mode: ValidActionMode) -> TransitionDriver {
        TransitionDriver::new(
            StateEncoder::new(fleet(), EncoderConfig::default()),
            RewardConfig::default(),
            mode,
        )
    }

    fn greedy_agent() -> QLearningAgent {
        let config = AgentConfig {
            epsilon: 0.0,
            seed: Some(1),
            ..AgentConfig::default()
        };
        QLearningAgent::new(fleet(), &config)
    }

    fn tick(status: &str) -> TickSnapshot {
        TickSnapshot::new()
            .with_truck(
                TruckRecord::new("CM01", status)
                    .with_position(201000.0, 8391000.0)
                    .with_fuel(60.0),
            )
            .with_shovel("S1", ShovelRecord::new(1, 0))
            .with_shovel("S2", ShovelRecord::new(4, 0))
    }

    #[test]
    fn first_tie_break_picks_first_shovel() {
        let d = driver(ValidActionMode::Fleet);
        let mut agent = greedy_agent();
        let t = tick("waiting for shovel");
        let out = d.step(&mut agent, "CM01", &t, &t).unwrap();
        assert_eq!(out.choice.action, "S1");
        assert!(out.new_state);
        // +3 queue, +8 waiting, +5 idle
        assert_eq!(out.reward, 16.0);
        assert_eq!(out.best_action.as_deref(), Some("S1"));
        assert!(out.optimal);
        assert!((out.updated_value - 1.6).abs() < 1e-12);
    }

    #[test]
    fn reward_uses_next_status() {
        let d = driver(ValidActionMode::Fleet);
        let mut agent = greedy_agent();
        let out = d
            .step(&mut agent, "CM01", &tick("waiting for shovel"), &tick("loading"))
            .unwrap();
        assert_eq!(out.next_status, "loading");
        // +3 queue, -3 busy
        assert_eq!(out.reward, 0.0);
    }

    #[test]
    fn missing_next_truck_falls_back_to_current() {
        let d = driver(ValidActionMode::Fleet);
        let mut agent = greedy_agent();
        let current = tick("waiting for shovel");
        let next = TickSnapshot::new().with_shovel("S1", ShovelRecord::new(1, 0));
        let out = d.step(&mut agent, "CM01", &current, &next).unwrap();
        assert_eq!(out.next_status, "waiting for shovel");
    }

    #[test]
    fn eta_mode_without_etas_has_no_actions() {
        let d = driver(ValidActionMode::EtaMap);
        let mut agent = greedy_agent();
        let t = tick("waiting for shovel");
        let err = d.step(&mut agent, "CM01", &t, &t).unwrap_err();
        assert!(matches!(err, DispatchError::NoValidActions(_)));
        assert!(agent.table().is_empty());
    }

    #[test]
    fn unknown_truck_is_an_error() {
        let d = driver(ValidActionMode::Fleet);
        let mut agent = greedy_agent();
        let t = tick("waiting for shovel");
        let err = d.step(&mut agent, "CM99", &t, &t).unwrap_err();
        assert!(matches!(err, DispatchError::TruckNotFound(_)));
    }

    #[test]
    fn eta_mode_orders_fleet_first() {
        let truck = TruckRecord::new("T", "waiting for shovel")
            .with_eta("ZZ", Some(1.0))
            .with_eta("S2", Some(2.0))
            .with_eta("AA", None);
        let actions = valid_actions(ValidActionMode::EtaMap, &fleet(), &truck);
        assert_eq!(actions, vec!["S2", "AA", "ZZ"]);
        let all = valid_actions(ValidActionMode::Fleet, &fleet(), &truck);
        assert_eq!(all, fleet());
    }
}
