//! Policy trait for dispatch decisions.

use std::collections::BTreeMap;

use crate::algorithms::rl::types::StateKey;
use crate::fleet::{ShovelRecord, TruckRecord};
use crate::ShovelId;

/// Everything a policy may look at when choosing a shovel for one truck.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub state: &'a StateKey,
    pub valid_actions: &'a [ShovelId],
    pub truck: &'a TruckRecord,
    pub shovels: &'a BTreeMap<ShovelId, ShovelRecord>,
}

/// A policy that picks a shovel for a truck without learning.
///
/// Used to evaluate trained agents against baselines.
pub trait Policy: Send + Sync {
    /// Selects one of `ctx.valid_actions`, or `None` when there are none.
    fn select(&mut self, ctx: &DecisionContext<'_>) -> Option<ShovelId>;

    /// Human-readable policy name.
    fn name(&self) -> &str;
}
