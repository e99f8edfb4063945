//! Synthetic tick generation for smoke-testing the training pipeline.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::dataset::TickDataset;
use super::shovel::ShovelRecord;
use super::snapshot::TickSnapshot;
use super::truck::{Position, TruckRecord, TruckStatus};
use crate::error::Result;
use crate::ShovelId;

const SYNTHETIC_STATUSES: [TruckStatus; 6] = [
    TruckStatus::WaitingForShovel,
    TruckStatus::Loading,
    TruckStatus::Unloading,
    TruckStatus::MovingLoad,
    TruckStatus::MovingUnload,
    TruckStatus::WaitingForDumper,
];

const SHOVEL_STATES: [i64; 3] = [1, 3, 4];

/// Generates a random dataset of `ticks` snapshots with `trucks` trucks each.
///
/// Positions are drawn from the mine's reference extent, fuel from 10..=100,
/// shovel states from {1, 3, 4} and queues from {0, 1, 2}. Every truck gets an
/// ETA of 0.5..15 minutes to every shovel.
pub fn generate(
    shovels: &[ShovelId],
    ticks: usize,
    trucks: usize,
    seed: u64,
) -> Result<TickDataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut snapshots = Vec::with_capacity(ticks);

    for tick in 0..ticks {
        let mut snapshot = TickSnapshot::new();
        snapshot.tick_id = Some(tick.to_string());

        for i in 0..trucks {
            let status = SYNTHETIC_STATUSES
                .choose(&mut rng)
                .copied()
                .unwrap_or(TruckStatus::WaitingForShovel);
            let mut truck = TruckRecord::new(format!("CM{:02}", i + 1), status.label());
            truck.position = Position::new(
                rng.gen_range(200_000.0..210_000.0),
                rng.gen_range(8_390_000.0..8_400_000.0),
            );
            truck.fuel = Some(rng.gen_range(10..=100) as f64);
            for shovel in shovels {
                let eta = (rng.gen_range(0.5..15.0_f64) * 10.0).round() / 10.0;
                truck.eta.insert(shovel.clone(), Some(eta));
            }
            snapshot = snapshot.with_truck(truck);
        }

        for shovel in shovels {
            let state = SHOVEL_STATES.choose(&mut rng).copied().unwrap_or(1);
            let record = ShovelRecord::new(state, rng.gen_range(0..=2));
            snapshot = snapshot.with_shovel(shovel.clone(), record);
        }

        snapshots.push((tick as u64, snapshot));
    }

    TickDataset::from_ticks(snapshots)
}
