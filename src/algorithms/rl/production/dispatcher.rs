//! Production dispatch: deferred updates, per-truck outcomes, and replay.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, error, info, warn};

use super::pending::{PendingDecision, PendingStore};
use super::reason::DecisionReason;
use crate::algorithms::rl::agent::QLearningAgent;
use crate::algorithms::rl::config::{AgentConfig, ProductionConfig, RewardConfig};
use crate::algorithms::rl::environment::{TransitionDriver, ValidActionMode};
use crate::algorithms::rl::metrics::ProductionMetrics;
use crate::algorithms::rl::observation::StateEncoder;
use crate::algorithms::rl::reward::RewardComputer;
use crate::algorithms::rl::types::{ActionChoice, StateKey};
use crate::algorithms::rl::value_table::ValueTable;
use crate::csv::field;
use crate::error::{DispatchError, Result};
use crate::fleet::{TickDataset, TickSnapshot, TruckRecord};
use crate::{generate_id, Id, ShovelId, TruckId};

/// One row of the dispatch result.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub truck_id: TruckId,
    pub shovel: ShovelId,
    pub status: String,
    /// ETA to `shovel`, `0.0` when unknown.
    pub eta: f64,
    pub current_shovel: Option<ShovelId>,
    /// ETA to the current shovel, `0.0` when unknown.
    pub eta_to_current: f64,
    /// True when `shovel` differs from the current assignment.
    pub changed: bool,
    pub explored: bool,
    pub reason: DecisionReason,
}

impl Assignment {
    pub const CSV_HEADER: &'static str =
        "truck,shovel,status,eta,current_shovel,eta_to_current,changed,reason";

    fn new(truck: &TruckRecord, choice: &ActionChoice, reason: DecisionReason) -> Self {
        let current = truck.current_shovel.clone();
        let eta_to_current = current
            .as_deref()
            .and_then(|c| truck.eta_to(c))
            .unwrap_or(0.0);
        Self {
            truck_id: truck.id.clone(),
            shovel: choice.action.clone(),
            status: truck.status.clone(),
            eta: truck.eta_to(&choice.action).unwrap_or(0.0),
            changed: current.as_deref() != Some(choice.action.as_str()),
            current_shovel: current,
            eta_to_current,
            explored: choice.explored,
            reason,
        }
    }

    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            field(&self.truck_id),
            field(&self.shovel),
            field(&self.status),
            self.eta,
            field(self.current_shovel.as_deref().unwrap_or("")),
            self.eta_to_current,
            self.changed,
            field(&self.reason.to_string()),
        )
    }
}

/// What happened to one truck of the current tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TruckOutcome {
    /// The agent chose a shovel.
    Optimized(Assignment),
    /// Not in the optimizable status; left as is.
    Fixed(TruckId),
    /// Nothing to choose from.
    Skipped(TruckId),
    /// The truck's record could not be processed; the rest of the tick was.
    Error { truck_id: TruckId, reason: String },
}

impl TruckOutcome {
    pub fn truck_id(&self) -> &str {
        match self {
            TruckOutcome::Optimized(a) => &a.truck_id,
            TruckOutcome::Fixed(id) | TruckOutcome::Skipped(id) => id,
            TruckOutcome::Error { truck_id, .. } => truck_id,
        }
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            TruckOutcome::Optimized(a) => Some(a),
            _ => None,
        }
    }
}

/// Result of applying one pending decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    Applied {
        truck_id: TruckId,
        action: ShovelId,
        reward: f64,
        /// Value of the pending action after the update.
        value: f64,
    },
    Failed { truck_id: TruckId, reason: String },
}

impl ReplayOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReplayOutcome::Applied { .. })
    }
}

/// Everything one dispatch invocation produced.
#[derive(Debug, Clone, Default)]
pub struct TickDispatch {
    pub replayed: Vec<ReplayOutcome>,
    pub outcomes: Vec<TruckOutcome>,
    /// Decisions to settle on the next tick.
    pub pending: Vec<PendingDecision>,
}

impl TickDispatch {
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.outcomes.iter().filter_map(TruckOutcome::assignment)
    }
}

/// Drives the agent against live or replayed fleet telemetry.
///
/// Valid actions are the shovels in each truck's ETA map. Only trucks whose
/// status equals `optimize_status` are assigned.
pub struct Dispatcher {
    driver: TransitionDriver,
    agent: AgentConfig,
    config: ProductionConfig,
    session_id: Id,
}

impl Dispatcher {
    pub fn new(
        encoder: StateEncoder,
        reward: RewardConfig,
        agent: AgentConfig,
        config: ProductionConfig,
    ) -> Self {
        Self {
            driver: TransitionDriver::new(encoder, reward, ValidActionMode::EtaMap),
            agent,
            config,
            session_id: generate_id(),
        }
    }

    /// Identifier stamped on every pending decision of this dispatcher.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn driver(&self) -> &TransitionDriver {
        &self.driver
    }

    /// A fresh agent over the fleet, seeded with the table at `table_path`
    /// (empty when missing or corrupt).
    pub fn load_agent(&self, table_path: &Path) -> QLearningAgent {
        QLearningAgent::new(self.driver.encoder().shovels().to_vec(), &self.agent)
            .with_table(ValueTable::load_or_empty(table_path))
    }

    /// Handles one live tick end to end.
    ///
    /// Loads the table, consumes the pending decisions, settles them against
    /// `snapshot`, saves the table if anything was pending, decides for the
    /// current trucks, and persists the new pending decisions.
    pub fn realtime(
        &self,
        snapshot: &TickSnapshot,
        table_path: &Path,
        store: &PendingStore,
    ) -> Result<TickDispatch> {
        let mut agent = self.load_agent(table_path);
        let pending = store.take();
        let dispatch = self.dispatch_tick(&mut agent, snapshot, &pending);
        if !pending.is_empty() {
            agent.table().save(table_path)?;
        }
        store.save(&dispatch.pending)?;
        Ok(dispatch)
    }

    /// In-memory core of [`Dispatcher::realtime`].
    pub fn dispatch_tick(
        &self,
        agent: &mut QLearningAgent,
        snapshot: &TickSnapshot,
        pending: &[PendingDecision],
    ) -> TickDispatch {
        let replayed = self.apply_pending(agent, snapshot, pending);
        let (outcomes, pending) = self.decide(agent, snapshot);
        TickDispatch {
            replayed,
            outcomes,
            pending,
        }
    }

    /// Settles each pending decision against the tick that followed it.
    ///
    /// The reward uses the truck's status and ETAs on `snapshot` and the
    /// shovels of `snapshot`. A failed record does not affect the others.
    pub fn apply_pending(
        &self,
        agent: &mut QLearningAgent,
        snapshot: &TickSnapshot,
        pending: &[PendingDecision],
    ) -> Vec<ReplayOutcome> {
        if !pending.is_empty() {
            info!(count = pending.len(), "Applying pending decisions");
        }
        pending
            .iter()
            .map(|decision| match self.settle(agent, snapshot, decision) {
                Ok((reward, value)) => {
                    debug!(
                        truck = %decision.truck_id,
                        action = %decision.action,
                        reward,
                        value,
                        "Pending decision applied"
                    );
                    ReplayOutcome::Applied {
                        truck_id: decision.truck_id.clone(),
                        action: decision.action.clone(),
                        reward,
                        value,
                    }
                }
                Err(e) => {
                    error!(truck = %decision.truck_id, error = %e, "Pending decision failed");
                    ReplayOutcome::Failed {
                        truck_id: decision.truck_id.clone(),
                        reason: e.to_string(),
                    }
                }
            })
            .collect()
    }

    fn settle(
        &self,
        agent: &mut QLearningAgent,
        snapshot: &TickSnapshot,
        decision: &PendingDecision,
    ) -> Result<(f64, f64)> {
        let encoder = self.driver.encoder();
        if decision.state.len() != encoder.arity() {
            return Err(DispatchError::InvalidConfig(format!(
                "pending state has {} slots, fleet encodes {}",
                decision.state.len(),
                encoder.arity()
            )));
        }
        let truck = snapshot
            .truck(&decision.truck_id)
            .ok_or_else(|| rejected_or_missing(snapshot, &decision.truck_id))?;
        let reward = RewardComputer::compute(
            &truck.status,
            &decision.action,
            &snapshot.shovels,
            Some(&truck.eta),
            self.driver.reward_config(),
        );
        let next_state = encoder.encode(truck, &snapshot.shovels);
        let value = agent.update(
            &decision.state,
            &decision.action,
            reward,
            &next_state,
            &decision.valid_actions,
        );
        Ok((reward, value))
    }

    /// Chooses shovels for the optimizable trucks of `snapshot`.
    ///
    /// Returns one outcome per truck and the decisions to settle next tick.
    /// Rejected truck records become [`TruckOutcome::Error`] after the parsed
    /// trucks.
    pub fn decide(
        &self,
        agent: &mut QLearningAgent,
        snapshot: &TickSnapshot,
    ) -> (Vec<TruckOutcome>, Vec<PendingDecision>) {
        let mut outcomes = Vec::with_capacity(snapshot.trucks.len());
        let mut pending = Vec::new();

        for (truck_id, truck) in &snapshot.trucks {
            if truck.status != self.config.optimize_status {
                outcomes.push(TruckOutcome::Fixed(truck_id.clone()));
                continue;
            }

            let state = self.driver.encoder().encode(truck, &snapshot.shovels);
            let valid = self.driver.valid_actions(truck);
            let new_state = !agent.table().contains(&state);
            let Some(choice) = agent.select_action(&state, &valid) else {
                debug!(truck = %truck_id, "No ETA shovels, skipping truck");
                outcomes.push(TruckOutcome::Skipped(truck_id.clone()));
                continue;
            };
            if new_state {
                warn!(truck = %truck_id, state = %state, "New state added");
            }

            let reason = self.explain(new_state, &choice, agent, &state, truck, snapshot);
            info!(
                truck = %truck_id,
                shovel = %choice.action,
                reason = %reason,
                "Truck assigned"
            );

            pending.push(PendingDecision {
                tick_id: snapshot.tick_id.clone(),
                truck_id: truck_id.clone(),
                state,
                action: choice.action.clone(),
                valid_actions: valid,
                timestamp: chrono::Utc::now().to_rfc3339(),
                session_id: self.session_id.clone(),
            });
            outcomes.push(TruckOutcome::Optimized(Assignment::new(
                truck, &choice, reason,
            )));
        }

        for truck_id in snapshot.rejected.keys() {
            let reason = rejected_or_missing(snapshot, truck_id).to_string();
            error!(truck = %truck_id, reason = %reason, "Truck not dispatched");
            outcomes.push(TruckOutcome::Error {
                truck_id: truck_id.clone(),
                reason,
            });
        }

        info!(
            decisions = pending.len(),
            trucks = snapshot.trucks.len(),
            rejected = snapshot.rejected.len(),
            "Tick dispatched"
        );
        (outcomes, pending)
    }

    fn explain(
        &self,
        new_state: bool,
        choice: &ActionChoice,
        agent: &QLearningAgent,
        state: &StateKey,
        truck: &TruckRecord,
        snapshot: &TickSnapshot,
    ) -> DecisionReason {
        let reward = self.driver.reward_config();
        DecisionReason::explain(
            new_state,
            choice,
            agent.table().row(state),
            truck,
            &snapshot.shovels,
            reward.active_state_code,
            reward.near_best_ratio,
        )
    }

    /// Replays a recorded dataset through the production loop, loading and
    /// saving the table at `table_path`.
    pub fn replay(&self, dataset: &TickDataset, table_path: &Path) -> Result<ProductionMetrics> {
        let mut agent = self.load_agent(table_path);
        self.replay_with(&mut agent, dataset, Some(table_path))
    }

    /// Replays consecutive tick pairs (without wrap-around), learning online.
    ///
    /// With `save_to`, the table is saved every `save_interval` ticks and at
    /// the end.
    pub fn replay_with(
        &self,
        agent: &mut QLearningAgent,
        dataset: &TickDataset,
        save_to: Option<&Path>,
    ) -> Result<ProductionMetrics> {
        let initial: HashSet<StateKey> = agent.table().iter().map(|(k, _)| k.clone()).collect();
        let mut metrics = ProductionMetrics::new(initial.len());

        for position in 0..dataset.len().saturating_sub(1) {
            let (Some((tick, current)), Some((_, next))) =
                (dataset.get(position), dataset.get(position + 1))
            else {
                continue;
            };
            metrics.ticks += 1;

            for (truck_id, truck) in &current.trucks {
                if truck.status != self.config.optimize_status {
                    metrics.fixed += 1;
                    continue;
                }

                let state = self.driver.encoder().encode(truck, &current.shovels);
                if !initial.contains(&state) {
                    metrics.new_states += 1;
                }
                let before = agent.table().row(&state).cloned();

                match self.driver.step(agent, truck_id, current, next) {
                    Ok(out) => {
                        let old = before.and_then(|row| row.get(&out.choice.action).copied());
                        if old.is_some_and(|v| (out.updated_value - v).abs() > 1e-6) {
                            metrics.updated_values += 1;
                        }
                        let reason = self.explain(
                            out.new_state,
                            &out.choice,
                            agent,
                            &out.state,
                            truck,
                            current,
                        );
                        debug!(
                            tick,
                            truck = %truck_id,
                            action = %out.choice.action,
                            reward = out.reward,
                            value = out.updated_value,
                            reason = %reason,
                            "Truck optimized"
                        );
                        metrics.record_decision(
                            &out.state,
                            &out.choice.action,
                            out.choice.explored,
                            out.reward,
                        );
                    }
                    Err(e) => {
                        warn!(tick, truck = %truck_id, error = %e, "Truck not optimized");
                        metrics.errors += 1;
                    }
                }
            }

            for (truck_id, reason) in &current.rejected {
                warn!(tick, truck = %truck_id, reason = %reason, "Truck record rejected");
                metrics.errors += 1;
            }

            let interval = self.config.save_interval;
            if let Some(path) = save_to {
                if interval > 0 && (position + 1) % interval == 0 {
                    agent.table().save(path)?;
                }
            }
        }

        if let Some(path) = save_to {
            agent.table().save(path)?;
        }
        metrics.final_states = agent.table().len();
        info!(
            ticks = metrics.ticks,
            optimized = metrics.optimized,
            errors = metrics.errors,
            "Replay finished"
        );
        Ok(metrics)
    }
}

/// Error for a truck that is absent from `snapshot`, naming the parse
/// failure when its record was rejected.
fn rejected_or_missing(snapshot: &TickSnapshot, truck_id: &str) -> DispatchError {
    match snapshot.rejection(truck_id) {
        Some(reason) => DispatchError::MalformedTruck {
            truck_id: truck_id.to_string(),
            reason: reason.to_string(),
        },
        None => DispatchError::TruckNotFound(truck_id.to_string()),
    }
}
