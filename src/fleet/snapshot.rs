//! Tick snapshots and their JSON wire format.
//!
//! The fleet system reports each tick as an object with `truck_states` and
//! `shovel_states` maps. Records are validated into typed structs here, once,
//! so downstream code never deals with untyped maps.
//!
//! A malformed truck record does not fail the tick: it is kept aside in
//! [`TickSnapshot::rejected`] with the reason, and the other trucks parse
//! normally. Shovel records are still strict.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use super::shovel::ShovelRecord;
use super::truck::{Position, TruckRecord};
use crate::error::{DispatchError, Result};
use crate::{ShovelId, TruckId};

/// Point-in-time view of every truck and shovel in the mine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickSnapshot {
    /// Identifier reported by the fleet system, if any.
    pub tick_id: Option<String>,
    pub trucks: BTreeMap<TruckId, TruckRecord>,
    pub shovels: BTreeMap<ShovelId, ShovelRecord>,
    /// Truck records that failed to parse, with the parse error.
    pub rejected: BTreeMap<TruckId, String>,
}

impl TickSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_truck(mut self, truck: TruckRecord) -> Self {
        self.trucks.insert(truck.id.clone(), truck);
        self
    }

    pub fn with_shovel(mut self, id: impl Into<ShovelId>, shovel: ShovelRecord) -> Self {
        self.shovels.insert(id.into(), shovel);
        self
    }

    pub fn truck(&self, id: &str) -> Option<&TruckRecord> {
        self.trucks.get(id)
    }

    pub fn shovel(&self, id: &str) -> Option<&ShovelRecord> {
        self.shovels.get(id)
    }

    /// Parse error of a rejected truck record.
    pub fn rejection(&self, id: &str) -> Option<&str> {
        self.rejected.get(id).map(String::as_str)
    }

    /// Parses a single snapshot object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let wire: WireSnapshot =
            serde_json::from_str(json).map_err(|e| DispatchError::json("tick snapshot", e))?;
        Ok(Self::from_wire(wire))
    }

    /// Loads a single snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DispatchError::io(path, e))?;
        let wire: WireSnapshot = serde_json::from_str(&text)
            .map_err(|e| DispatchError::json(path.display().to_string(), e))?;
        Ok(Self::from_wire(wire))
    }

    /// Converts this snapshot back into its JSON wire form.
    ///
    /// Rejected truck records are not written back.
    pub fn to_json_value(&self) -> Value {
        // Serializing plain maps and options cannot fail.
        serde_json::to_value(self.to_wire()).unwrap_or(Value::Null)
    }

    pub(crate) fn from_wire(wire: WireSnapshot) -> Self {
        let tick_id = wire.tick_id.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        let mut trucks = BTreeMap::new();
        let mut rejected = BTreeMap::new();
        for (id, raw) in wire.truck_states {
            match serde_json::from_value::<WireTruck>(raw) {
                Ok(truck) => {
                    let record = truck.into_record(id.clone());
                    trucks.insert(id, record);
                }
                Err(e) => {
                    warn!(truck = %id, error = %e, "Rejecting malformed truck record");
                    rejected.insert(id, e.to_string());
                }
            }
        }
        let shovels = wire
            .shovel_states
            .into_iter()
            .map(|(id, s)| (id, s.into()))
            .collect();
        Self {
            tick_id,
            trucks,
            shovels,
            rejected,
        }
    }

    fn to_wire(&self) -> WireSnapshot {
        WireSnapshot {
            tick_id: self.tick_id.clone().map(Value::String),
            truck_states: self
                .trucks
                .iter()
                .filter_map(|(id, t)| {
                    serde_json::to_value(WireTruck::from(t))
                        .ok()
                        .map(|v| (id.clone(), v))
                })
                .collect(),
            shovel_states: self
                .shovels
                .iter()
                .map(|(id, s)| (id.clone(), WireShovel::from(s)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct WireSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    tick_id: Option<Value>,
    truck_states: BTreeMap<String, Value>,
    shovel_states: BTreeMap<String, WireShovel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WireTruck {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Vec<Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tank_fuel_level: Option<f64>,
    #[serde(rename = "ETA", skip_serializing_if = "Option::is_none")]
    eta: Option<BTreeMap<String, Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_shovel: Option<String>,
}

impl WireTruck {
    fn into_record(self, id: TruckId) -> TruckRecord {
        let position = self
            .position
            .map(|coords| Position {
                x: coords.first().copied().flatten(),
                y: coords.get(1).copied().flatten(),
            })
            .unwrap_or_default();
        TruckRecord {
            id,
            position,
            status: self.status.unwrap_or_default(),
            fuel: self.tank_fuel_level,
            eta: self.eta.unwrap_or_default(),
            current_shovel: self.current_shovel,
        }
    }
}

impl From<&TruckRecord> for WireTruck {
    fn from(t: &TruckRecord) -> Self {
        let position = match (t.position.x, t.position.y) {
            (None, None) => None,
            (x, y) => Some(vec![x, y]),
        };
        Self {
            status: Some(t.status.clone()),
            position,
            tank_fuel_level: t.fuel,
            eta: Some(t.eta.clone()),
            current_shovel: t.current_shovel.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WireShovel {
    #[serde(
        deserialize_with = "int_like",
        skip_serializing_if = "Option::is_none"
    )]
    state: Option<i64>,
    #[serde(
        deserialize_with = "int_like",
        skip_serializing_if = "Option::is_none"
    )]
    queue_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shovel_spot_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shovel_cycle: Option<f64>,
}

impl From<WireShovel> for ShovelRecord {
    fn from(s: WireShovel) -> Self {
        Self {
            state: s.state,
            queue_count: s.queue_count,
            priority: s.priority,
            coverage: s.coverage,
            spot_time: s.shovel_spot_time,
            cycle_time: s.shovel_cycle,
        }
    }
}

impl From<&ShovelRecord> for WireShovel {
    fn from(s: &ShovelRecord) -> Self {
        Self {
            state: s.state,
            queue_count: s.queue_count,
            priority: s.priority,
            coverage: s.coverage,
            shovel_spot_time: s.spot_time,
            shovel_cycle: s.cycle_time,
        }
    }
}

/// Accepts integer codes that some fleet exports write as floats (`1.0`).
fn int_like<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
        Some(v) => Err(serde::de::Error::custom(format!(
            "expected an integer code, found {v}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: &str = r#"{
        "tick_id": 42,
        "truck_states": {
            "CM01": {
                "status": "waiting for shovel",
                "position": [201000.0, 8391000.0],
                "tank_fuel_level": 60,
                "ETA": {"S1": 2.5, "S2": null},
                "type": "interp"
            },
            "CM02": {"status": "loading"}
        },
        "shovel_states": {
            "S1": {"state": 1, "queue_count": 0, "priority": 2, "shovel_spot_time": 0.5, "shovel_cycle": 1.0},
            "S2": {"state": 4.0, "queue_count": 3}
        }
    }"#;

    #[test]
    fn parses_typed_records() {
        let snap = TickSnapshot::from_json_str(TICK).unwrap();
        assert_eq!(snap.tick_id.as_deref(), Some("42"));

        let cm01 = snap.truck("CM01").unwrap();
        assert_eq!(cm01.position, Position::new(201000.0, 8391000.0));
        assert_eq!(cm01.fuel, Some(60.0));
        assert_eq!(cm01.eta_to("S1"), Some(2.5));
        assert!(cm01.eta.contains_key("S2"));
        assert_eq!(cm01.eta_to("S2"), None);

        let s1 = snap.shovel("S1").unwrap();
        assert_eq!(s1.state, Some(1));
        assert_eq!(s1.priority, Some(2.0));
        assert_eq!(s1.spot_time, Some(0.5));
        assert_eq!(s1.cycle_time, Some(1.0));
        assert_eq!(snap.shovel("S2").unwrap().state, Some(4));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let snap = TickSnapshot::from_json_str(TICK).unwrap();
        let cm02 = snap.truck("CM02").unwrap();
        assert_eq!(cm02.position, Position::unknown());
        assert_eq!(cm02.fuel, None);
        assert!(cm02.eta.is_empty());
    }

    #[test]
    fn short_position_array_leaves_y_unknown() {
        let snap = TickSnapshot::from_json_str(
            r#"{"truck_states": {"T": {"position": [10.0]}}, "shovel_states": {}}"#,
        )
        .unwrap();
        let t = snap.truck("T").unwrap();
        assert_eq!(t.position.x, Some(10.0));
        assert_eq!(t.position.y, None);
    }

    #[test]
    fn fractional_state_code_is_rejected() {
        let err = TickSnapshot::from_json_str(
            r#"{"truck_states": {}, "shovel_states": {"S": {"state": 1.5}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Json { .. }));
    }

    #[test]
    fn malformed_truck_is_rejected_alone() {
        let snap = TickSnapshot::from_json_str(
            r#"{
                "truck_states": {
                    "T1": {"status": "waiting for shovel", "tank_fuel_level": 50, "ETA": {"S1": 2.0}},
                    "T2": {"status": "waiting for shovel", "tank_fuel_level": "N/A"}
                },
                "shovel_states": {"S1": {"state": 1, "queue_count": 0}}
            }"#,
        )
        .unwrap();
        assert!(snap.truck("T1").is_some());
        assert!(snap.truck("T2").is_none());
        assert!(snap.rejection("T2").unwrap().contains("invalid type"));
        assert_eq!(snap.rejected.len(), 1);
    }

    #[test]
    fn wire_conversion_preserves_records() {
        let snap = TickSnapshot::from_json_str(TICK).unwrap();
        let again = TickSnapshot::from_json_str(&snap.to_json_value().to_string()).unwrap();
        assert_eq!(snap, again);
    }
}
