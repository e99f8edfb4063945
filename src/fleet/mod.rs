//! Fleet telemetry: trucks, shovels, tick snapshots, and tick datasets.

pub mod dataset;
pub mod shovel;
pub mod snapshot;
pub mod synthetic;
pub mod truck;

pub use dataset::TickDataset;
pub use shovel::{ShovelRecord, ACTIVE_STATE};
pub use snapshot::TickSnapshot;
pub use truck::{Position, TruckRecord, TruckStatus};
