//! haulq - Haul-truck dispatch by tabular Q-learning
//!
//! Assigns haul trucks in an open-pit mine to loading shovels. Each tick of
//! truck and shovel telemetry is discretized into a fixed-arity state key, a
//! shovel is chosen by an epsilon-greedy policy over a learned value table, and
//! the table is updated online from a shaped reward observed on the next tick.
//!
//! The same core drives offline training over historical tick logs,
//! hyperparameter sweeps, and production dispatch with deferred updates.

pub mod algorithms;
pub mod config;
mod csv;
pub mod error;
pub mod fleet;
pub mod units;

pub use config::DispatchConfig;
pub use error::{DispatchError, Result};
// Re-export unit conversion helpers for ergonomic use
pub use units::{convert, SameDim};

/// Identifier type used for trucks, shovels, sessions, and sweep runs.
pub type Id = String;

/// Identifier of a loading shovel; shovels form the action space.
pub type ShovelId = Id;

/// Identifier of a haul truck.
pub type TruckId = Id;

/// Generates a new unique identifier (UUID v4).
pub fn generate_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}
