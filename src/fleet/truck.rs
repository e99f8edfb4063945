//! Haul truck records and operational statuses.

use std::collections::BTreeMap;
use std::fmt;

use crate::{ShovelId, TruckId};

/// Operational status of a haul truck as reported by the fleet system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruckStatus {
    WaitingForShovel,
    MovingLoad,
    MovingUnload,
    WaitingForDumper,
    Loading,
    Unloading,
    Reverse,
}

impl TruckStatus {
    /// Returns all statuses in code order.
    pub fn all() -> [TruckStatus; 7] {
        [
            TruckStatus::WaitingForShovel,
            TruckStatus::MovingLoad,
            TruckStatus::MovingUnload,
            TruckStatus::WaitingForDumper,
            TruckStatus::Loading,
            TruckStatus::Unloading,
            TruckStatus::Reverse,
        ]
    }

    /// Wire label used by the fleet system.
    pub fn label(&self) -> &'static str {
        match self {
            TruckStatus::WaitingForShovel => "waiting for shovel",
            TruckStatus::MovingLoad => "moving load",
            TruckStatus::MovingUnload => "moving unload",
            TruckStatus::WaitingForDumper => "waiting for dumper",
            TruckStatus::Loading => "loading",
            TruckStatus::Unloading => "unloading",
            TruckStatus::Reverse => "reverse",
        }
    }

    /// Discrete code used in state keys (0..=6).
    pub fn code(&self) -> i64 {
        match self {
            TruckStatus::WaitingForShovel => 0,
            TruckStatus::MovingLoad => 1,
            TruckStatus::MovingUnload => 2,
            TruckStatus::WaitingForDumper => 3,
            TruckStatus::Loading => 4,
            TruckStatus::Unloading => 5,
            TruckStatus::Reverse => 6,
        }
    }

    /// Parses a wire label; unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().into_iter().find(|s| s.label() == label)
    }

    /// True while the truck is mid-task (loading or travelling).
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TruckStatus::Loading | TruckStatus::MovingLoad | TruckStatus::MovingUnload
        )
    }
}

impl fmt::Display for TruckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A truck position in mine grid coordinates.
///
/// Either coordinate may be unknown when the telemetry omits it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Position {
    /// Creates a fully known position.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    /// A position with both coordinates unknown.
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coord = |c: Option<f64>| c.map_or_else(|| "?".to_string(), |v| format!("{v:.1}"));
        write!(f, "({}, {})", coord(self.x), coord(self.y))
    }
}

/// Snapshot of a single truck at one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TruckRecord {
    pub id: TruckId,
    pub position: Position,
    /// Raw status label; empty when the telemetry omits it.
    pub status: String,
    /// Fuel level in percent.
    pub fuel: Option<f64>,
    /// ETA in minutes to each shovel; `None` when the fleet system has no estimate.
    pub eta: BTreeMap<ShovelId, Option<f64>>,
    /// Shovel the truck is currently assigned to, if reported.
    pub current_shovel: Option<ShovelId>,
}

impl TruckRecord {
    /// Creates a truck with the given id and status label and no other data.
    pub fn new(id: impl Into<TruckId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_fuel(mut self, fuel: f64) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn with_eta(mut self, shovel: impl Into<ShovelId>, eta: Option<f64>) -> Self {
        self.eta.insert(shovel.into(), eta);
        self
    }

    /// Parsed status, if the label is one of the known statuses.
    pub fn parsed_status(&self) -> Option<TruckStatus> {
        TruckStatus::from_label(&self.status)
    }

    /// ETA to `shovel` in minutes, if one is known.
    pub fn eta_to(&self, shovel: &str) -> Option<f64> {
        self.eta.get(shovel).copied().flatten()
    }
}
