//! State encoding for the Q-learning dispatcher.
//!
//! Maps one truck plus the full shovel fleet to a fixed-arity [`StateKey`].

use std::collections::BTreeMap;

use super::config::EncoderConfig;
use super::types::{Feature, StateKey};
use crate::fleet::{ShovelRecord, TickSnapshot, TruckRecord};
use crate::units::{timing_slack, Minutes};
use crate::{ShovelId, TruckId};
use qtty::Quantity;

/// Value used for every unknown, missing, or masked slot.
pub const MISSING: f64 = -1.0;

/// Builds state keys for a fixed, ordered shovel fleet.
///
/// The key layout is:
/// ```text
/// [pos_x, pos_y, status, fuel]
///   ++ [eta_S   for S in fleet]
///   ++ [timing_S for S in fleet]
///   ++ [state_S for S in fleet] ++ [queue_S ...] ++ [priority_S ...] ++ [coverage_S ...]
/// ```
/// so its arity is always `4 + 2S + 4S`.
#[derive(Debug, Clone)]
pub struct StateEncoder {
    shovels: Vec<ShovelId>,
    config: EncoderConfig,
}

impl StateEncoder {
    /// Number of truck slots at the head of every key.
    pub const TRUCK_FEATURE_DIM: usize = 4;
    /// Number of slots contributed by each shovel.
    pub const SHOVEL_FEATURE_DIM: usize = 6;

    pub fn new(shovels: Vec<ShovelId>, config: EncoderConfig) -> Self {
        Self { shovels, config }
    }

    /// The fleet ordering keys are built against.
    pub fn shovels(&self) -> &[ShovelId] {
        &self.shovels
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Arity of every key this encoder produces.
    pub fn arity(&self) -> usize {
        Self::TRUCK_FEATURE_DIM + Self::SHOVEL_FEATURE_DIM * self.shovels.len()
    }

    /// Encodes one truck against the shovel fleet.
    ///
    /// Shovels absent from `shovels` are treated as inactive with every raw
    /// attribute missing.
    pub fn encode(
        &self,
        truck: &TruckRecord,
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
    ) -> StateKey {
        let mut slots = Vec::with_capacity(self.arity());

        slots.push(self.position_bin(truck.position.x));
        slots.push(self.position_bin(truck.position.y));
        slots.push(
            truck
                .parsed_status()
                .map_or(MISSING, |s| s.code() as f64),
        );
        slots.push(self.fuel_bucket(truck.fuel));

        let mut etas = Vec::with_capacity(self.shovels.len());
        let mut timings = Vec::with_capacity(self.shovels.len());
        for id in &self.shovels {
            match shovels.get(id) {
                Some(shovel) if shovel.is_active_with(self.config.active_state_code) => {
                    let eta = truck.eta_to(id);
                    etas.push(self.eta_bucket(eta));
                    timings.push(self.timing_feature(eta, shovel));
                }
                _ => {
                    etas.push(MISSING);
                    timings.push(MISSING);
                }
            }
        }
        slots.extend(etas);
        slots.extend(timings);

        let attributes: [fn(&ShovelRecord) -> Option<f64>; 4] = [
            |s| s.state.map(|v| v as f64),
            |s| s.queue_count.map(|v| v as f64),
            |s| s.priority,
            |s| s.coverage,
        ];
        for attribute in attributes {
            for id in &self.shovels {
                slots.push(shovels.get(id).and_then(attribute).unwrap_or(MISSING));
            }
        }

        StateKey::new(slots.into_iter().map(Feature::new).collect())
    }

    /// Encodes every truck of a tick.
    ///
    /// Returns the keys and the truck ids in the same order.
    pub fn encode_tick(&self, snapshot: &TickSnapshot) -> (Vec<StateKey>, Vec<TruckId>) {
        snapshot
            .trucks
            .iter()
            .map(|(id, truck)| (self.encode(truck, &snapshot.shovels), id.clone()))
            .unzip()
    }

    /// Column label of every key slot, in key order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = ["pos_x", "pos_y", "status", "fuel"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for prefix in ["eta", "timing", "state", "queue", "priority", "coverage"] {
            labels.extend(self.shovels.iter().map(|id| format!("{prefix}_{id}")));
        }
        labels
    }

    /// Floor-divides a coordinate by the bin width; missing or negative is `-1`.
    pub fn position_bin(&self, coordinate: Option<f64>) -> f64 {
        match coordinate {
            Some(v) if v >= 0.0 && v.is_finite() => (v / self.config.position_bin).floor(),
            _ => MISSING,
        }
    }

    /// Fuel bucket 0 (low), 1 (mid) or 2 (high); missing fuel is low.
    pub fn fuel_bucket(&self, fuel: Option<f64>) -> f64 {
        let [low, high] = self.config.fuel_thresholds;
        match fuel {
            None => 0.0,
            Some(f) if f < low => 0.0,
            Some(f) if f < high => 1.0,
            Some(_) => 2.0,
        }
    }

    /// ETA bucket 0..=4 by threshold; missing is `-1`.
    pub fn eta_bucket(&self, eta: Option<f64>) -> f64 {
        let Some(eta) = eta else {
            return MISSING;
        };
        self.config
            .eta_thresholds
            .iter()
            .position(|&t| eta < t)
            .unwrap_or(self.config.eta_thresholds.len()) as f64
    }

    /// `eta - (spot + cycle)` in minutes; missing timing counts as zero.
    fn timing_feature(&self, eta: Option<f64>, shovel: &ShovelRecord) -> f64 {
        let Some(eta) = eta else {
            return MISSING;
        };
        let unit = self.config.timing_unit;
        let spot = unit.to_minutes(shovel.spot_time.unwrap_or(0.0));
        let cycle = unit.to_minutes(shovel.cycle_time.unwrap_or(0.0));
        let eta: Minutes = Quantity::new(eta);
        timing_slack(eta, spot, cycle).value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::TimingUnit;

    fn encoder(shovels: &[&str]) -> StateEncoder {
        StateEncoder::new(
            shovels.iter().map(|s| s.to_string()).collect(),
            EncoderConfig::default(),
        )
    }

    fn fleet() -> BTreeMap<ShovelId, ShovelRecord> {
        let mut shovels = BTreeMap::new();
        shovels.insert(
            "A".to_string(),
            ShovelRecord::new(1, 1).with_timing(0.5, 1.0),
        );
        shovels.insert("B".to_string(), ShovelRecord::new(4, 0));
        shovels
    }

    #[test]
    fn encodes_reference_truck() {
        let truck = TruckRecord::new("CM01", "loading")
            .with_position(200500.0, 8395500.0)
            .with_fuel(45.0)
            .with_eta("A", Some(4.0))
            .with_eta("B", Some(1.0));
        let key = encoder(&["A", "B"]).encode(&truck, &fleet());
        assert_eq!(
            key.values(),
            vec![
                401.0, 16791.0, 4.0, 1.0, // truck
                1.0, -1.0, // eta buckets, B masked
                2.5, -1.0, // timing slack, B masked
                1.0, 4.0, // state
                1.0, 0.0, // queue
                -1.0, -1.0, // priority
                -1.0, -1.0, // coverage
            ]
        );
    }

    #[test]
    fn arity_matches_fleet_size() {
        let enc = encoder(&["A", "B", "C"]);
        let truck = TruckRecord::new("T", "loading");
        let key = enc.encode(&truck, &fleet());
        assert_eq!(key.len(), 4 + 6 * 3);
        assert_eq!(enc.arity(), key.len());
        assert_eq!(enc.labels().len(), key.len());
    }

    #[test]
    fn inactive_shovel_masks_eta() {
        let truck = TruckRecord::new("T", "waiting for shovel").with_eta("B", Some(1.0));
        let key = encoder(&["B"]).encode(&truck, &fleet());
        assert_eq!(key.values()[4], MISSING);
        assert_eq!(key.values()[5], MISSING);
    }

    #[test]
    fn active_shovel_without_eta_is_missing() {
        let truck = TruckRecord::new("T", "waiting for shovel");
        let key = encoder(&["A"]).encode(&truck, &fleet());
        assert_eq!(key.values()[4], MISSING);
        assert_eq!(key.values()[5], MISSING);
    }

    #[test]
    fn unknown_status_and_position() {
        let mut truck = TruckRecord::new("T", "parked");
        truck.position.x = Some(-3.0);
        let key = encoder(&[]).encode(&truck, &BTreeMap::new());
        assert_eq!(key.values(), vec![-1.0, -1.0, -1.0, 0.0]);
    }

    #[test]
    fn bucket_boundaries() {
        let enc = encoder(&[]);
        assert_eq!(enc.fuel_bucket(Some(19.9)), 0.0);
        assert_eq!(enc.fuel_bucket(Some(20.0)), 1.0);
        assert_eq!(enc.fuel_bucket(Some(50.0)), 2.0);
        assert_eq!(enc.eta_bucket(Some(2.99)), 0.0);
        assert_eq!(enc.eta_bucket(Some(3.0)), 1.0);
        assert_eq!(enc.eta_bucket(Some(11.9)), 3.0);
        assert_eq!(enc.eta_bucket(Some(12.0)), 4.0);
        assert_eq!(enc.eta_bucket(None), MISSING);
        assert_eq!(enc.position_bin(Some(499.9)), 0.0);
        assert_eq!(enc.position_bin(Some(500.0)), 1.0);
    }

    #[test]
    fn seconds_timing_is_converted() {
        let mut shovels = BTreeMap::new();
        shovels.insert(
            "A".to_string(),
            ShovelRecord::new(1, 0).with_timing(30.0, 90.0),
        );
        let config = EncoderConfig {
            timing_unit: TimingUnit::Seconds,
            ..EncoderConfig::default()
        };
        let enc = StateEncoder::new(vec!["A".into()], config);
        let truck = TruckRecord::new("T", "waiting for shovel").with_eta("A", Some(5.0));
        let slack = enc.encode(&truck, &shovels).values()[5];
        assert!((slack - 3.0).abs() < 1e-9);
    }

    #[test]
    fn encode_tick_pairs_keys_with_ids() {
        let snap = TickSnapshot::new()
            .with_truck(TruckRecord::new("CM02", "loading"))
            .with_truck(TruckRecord::new("CM01", "waiting for shovel"));
        let enc = encoder(&["A"]);
        let (keys, ids) = enc.encode_tick(&snap);
        assert_eq!(ids, vec!["CM01".to_string(), "CM02".to_string()]);
        assert_eq!(keys[0].values()[2], 0.0);
        assert_eq!(keys[1].values()[2], 4.0);
    }

    #[test]
    fn labels_follow_block_order() {
        let labels = encoder(&["A", "B"]).labels();
        assert_eq!(labels[4], "eta_A");
        assert_eq!(labels[6], "timing_A");
        assert_eq!(labels[8], "state_A");
        assert_eq!(labels[15], "coverage_B");
    }
}
