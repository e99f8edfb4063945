//! Shaped reward for a dispatch decision.
//!
//! Combines shovel availability, queue length, truck status, and ETA terms
//! into one scalar. The function is pure: the same inputs always give the
//! same reward.

use std::collections::BTreeMap;

use super::config::RewardConfig;
use crate::fleet::{ShovelRecord, TruckStatus};
use crate::ShovelId;

/// Computes rewards for dispatch decisions.
pub struct RewardComputer;

impl RewardComputer {
    /// Computes the reward for sending a truck to `chosen`.
    ///
    /// `next_status` is the truck status observed on the following tick.
    ///
    /// # Components
    ///
    /// 1. **Invalid action**: a shovel absent from `shovels` returns
    ///    `invalid_action` alone.
    /// 2. **Inactive shovel**: `inactive_shovel` when the state code is not active.
    /// 3. **Queue**: one of `queue[0..=3]` by queue length (missing counts as 0).
    /// 4. **Waiting at an active shovel**: `waiting_active`.
    /// 5. **Busy truck**: `busy_truck` while loading or travelling.
    /// 6. **Idle shovel**: `idle_shovel` when waiting, active, and queue is 0.
    /// 7. **ETA**: a band term for a known non-negative ETA, plus `best_eta`
    ///    or `near_best_eta` against the smallest ETA to an active shovel.
    pub fn compute(
        next_status: &str,
        chosen: &str,
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
        etas: Option<&BTreeMap<ShovelId, Option<f64>>>,
        config: &RewardConfig,
    ) -> f64 {
        let Some(shovel) = shovels.get(chosen) else {
            return config.invalid_action;
        };

        let active = shovel.is_active_with(config.active_state_code);
        let queue = shovel.queue_count.unwrap_or(0);
        let waiting = next_status == config.waiting_status;
        let mut reward = 0.0;

        if !active {
            reward += config.inactive_shovel;
        }

        reward += match queue {
            q if q >= 3 => config.queue[3],
            2 => config.queue[2],
            1 => config.queue[1],
            _ => config.queue[0],
        };

        if waiting && active {
            reward += config.waiting_active;
        }

        if TruckStatus::from_label(next_status).is_some_and(|s| s.is_busy()) {
            reward += config.busy_truck;
        }

        if waiting && active && queue == 0 {
            reward += config.idle_shovel;
        }

        if let Some(etas) = etas {
            reward += Self::eta_terms(chosen, active, shovels, etas, config);
        }

        reward
    }

    fn eta_terms(
        chosen: &str,
        active: bool,
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
        etas: &BTreeMap<ShovelId, Option<f64>>,
        config: &RewardConfig,
    ) -> f64 {
        let Some(eta) = etas.get(chosen).copied().flatten().filter(|e| *e >= 0.0) else {
            return 0.0;
        };

        let band = config
            .eta_thresholds
            .iter()
            .position(|&t| eta < t)
            .unwrap_or(config.eta_thresholds.len());
        let mut reward = config.eta_bands[band];

        if active {
            if let Some(best) = Self::best_active_eta(shovels, etas, config) {
                if eta == best {
                    reward += config.best_eta;
                } else if eta <= best * config.near_best_ratio {
                    reward += config.near_best_eta;
                }
            }
        }

        reward
    }

    /// Smallest non-negative ETA among shovels that are present and active.
    pub fn best_active_eta(
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
        etas: &BTreeMap<ShovelId, Option<f64>>,
        config: &RewardConfig,
    ) -> Option<f64> {
        etas.iter()
            .filter(|(id, _)| {
                shovels
                    .get(id.as_str())
                    .is_some_and(|s| s.is_active_with(config.active_state_code))
            })
            .filter_map(|(_, eta)| eta.filter(|e| *e >= 0.0))
            .min_by(f64::total_cmp)
    }

    /// Rewards for every action in `actions`, in the same order.
    pub fn compute_all(
        next_status: &str,
        actions: &[ShovelId],
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
        etas: Option<&BTreeMap<ShovelId, Option<f64>>>,
        config: &RewardConfig,
    ) -> Vec<(ShovelId, f64)> {
        actions
            .iter()
            .map(|a| {
                (
                    a.clone(),
                    Self::compute(next_status, a, shovels, etas, config),
                )
            })
            .collect()
    }

    /// First action with the largest reward.
    pub fn best_action(rewards: &[(ShovelId, f64)]) -> Option<&ShovelId> {
        let mut best: Option<(&ShovelId, f64)> = None;
        for (action, reward) in rewards {
            match best {
                Some((_, r)) if *reward <= r => {}
                _ => best = Some((action, *reward)),
            }
        }
        best.map(|(a, _)| a)
    }
}
