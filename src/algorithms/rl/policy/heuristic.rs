//! Nearest-shovel heuristic baseline.

use super::trait_::{DecisionContext, Policy};
use crate::fleet::ACTIVE_STATE;
use crate::ShovelId;

/// Sends each truck to the active shovel with the smallest ETA, breaking
/// ties by shorter queue.
///
/// Shovels without an ETA or not active are only chosen when nothing else
/// is valid, in which case the first valid action is returned.
pub struct NearestShovelPolicy {
    active_state_code: i64,
}

impl NearestShovelPolicy {
    pub fn new(active_state_code: i64) -> Self {
        Self { active_state_code }
    }
}

impl Default for NearestShovelPolicy {
    fn default() -> Self {
        Self::new(ACTIVE_STATE)
    }
}

impl Policy for NearestShovelPolicy {
    fn select(&mut self, ctx: &DecisionContext<'_>) -> Option<ShovelId> {
        let mut best: Option<(&ShovelId, f64, i64)> = None;
        for action in ctx.valid_actions {
            let Some(shovel) = ctx.shovels.get(action) else {
                continue;
            };
            if !shovel.is_active_with(self.active_state_code) {
                continue;
            }
            let Some(eta) = ctx.truck.eta_to(action).filter(|e| *e >= 0.0) else {
                continue;
            };
            let queue = shovel.queue_count.unwrap_or(0);
            let better = match best {
                None => true,
                Some((_, e, q)) => eta < e || (eta == e && queue < q),
            };
            if better {
                best = Some((action, eta, queue));
            }
        }
        best.map(|(a, _, _)| a.clone())
            .or_else(|| ctx.valid_actions.first().cloned())
    }

    fn name(&self) -> &str {
        "nearest_shovel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rl::types::StateKey;
    use crate::fleet::{ShovelRecord, TruckRecord};
    use std::collections::BTreeMap;

    fn fleet() -> BTreeMap<ShovelId, ShovelRecord> {
        let mut shovels = BTreeMap::new();
        shovels.insert("S1".to_string(), ShovelRecord::new(1, 2));
        shovels.insert("S2".to_string(), ShovelRecord::new(1, 0));
        shovels.insert("S3".to_string(), ShovelRecord::new(4, 0));
        shovels
    }

    fn pick(truck: &TruckRecord, valid: &[ShovelId]) -> Option<ShovelId> {
        let state = StateKey::from_values([0.0]);
        let shovels = fleet();
        let ctx = DecisionContext {
            state: &state,
            valid_actions: valid,
            truck,
            shovels: &shovels,
        };
        NearestShovelPolicy::default().select(&ctx)
    }

    fn valid() -> Vec<ShovelId> {
        vec!["S1".into(), "S2".into(), "S3".into()]
    }

    #[test]
    fn picks_closest_active_shovel() {
        let truck = TruckRecord::new("T", "waiting for shovel")
            .with_eta("S1", Some(6.0))
            .with_eta("S2", Some(4.0))
            .with_eta("S3", Some(1.0));
        assert_eq!(pick(&truck, &valid()).as_deref(), Some("S2"));
    }

    #[test]
    fn equal_eta_prefers_shorter_queue() {
        let truck = TruckRecord::new("T", "waiting for shovel")
            .with_eta("S1", Some(4.0))
            .with_eta("S2", Some(4.0));
        assert_eq!(pick(&truck, &valid()).as_deref(), Some("S2"));
    }

    #[test]
    fn falls_back_to_first_valid() {
        let truck = TruckRecord::new("T", "waiting for shovel");
        assert_eq!(pick(&truck, &valid()).as_deref(), Some("S1"));
        assert_eq!(pick(&truck, &[]), None);
    }
}
