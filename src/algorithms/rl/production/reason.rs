//! Human-readable explanation of a dispatch decision.

use std::collections::BTreeMap;
use std::fmt;

use crate::algorithms::rl::types::ActionChoice;
use crate::algorithms::rl::value_table::ValueRow;
use crate::fleet::{ShovelRecord, TruckRecord};
use crate::ShovelId;

/// Why the agent picked an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonBase {
    /// The state had no row before selection.
    NewState,
    Exploration,
    /// The action holds the row's largest value.
    BestKnownValue,
    SubOptimal,
}

impl fmt::Display for ReasonBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReasonBase::NewState => "new state",
            ReasonBase::Exploration => "exploration",
            ReasonBase::BestKnownValue => "best known value",
            ReasonBase::SubOptimal => "sub-optimal",
        })
    }
}

/// How the chosen ETA ranks against the truck's other ETAs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EtaStanding {
    Best,
    /// Within the near-best ratio of the given best ETA.
    NearOptimal(f64),
    NotOptimal(f64),
    /// No comparable ETA to rank against.
    Unranked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaNote {
    pub eta: f64,
    pub standing: EtaStanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShovelNote {
    Active { queue: Option<i64> },
    Inactive { state: Option<i64> },
}

/// Explanation attached to every production assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReason {
    pub base: ReasonBase,
    pub eta: Option<EtaNote>,
    pub shovel: Option<ShovelNote>,
}

impl DecisionReason {
    /// Explains `choice` for `truck`.
    ///
    /// `row` is the state's value row as it stands now. The best ETA is taken
    /// over shovels present in `shovels` that have a known ETA.
    pub fn explain(
        new_state: bool,
        choice: &ActionChoice,
        row: Option<&ValueRow>,
        truck: &TruckRecord,
        shovels: &BTreeMap<ShovelId, ShovelRecord>,
        active_state_code: i64,
        near_best_ratio: f64,
    ) -> Self {
        let base = if new_state {
            ReasonBase::NewState
        } else if choice.explored {
            ReasonBase::Exploration
        } else {
            let max = row.and_then(|r| r.values().copied().max_by(f64::total_cmp));
            let value = row.and_then(|r| r.get(&choice.action).copied());
            match (value, max) {
                (Some(v), Some(m)) if v == m => ReasonBase::BestKnownValue,
                _ => ReasonBase::SubOptimal,
            }
        };

        let eta = truck.eta_to(&choice.action).map(|eta| {
            let best = truck
                .eta
                .iter()
                .filter(|(id, _)| shovels.contains_key(id.as_str()))
                .filter_map(|(_, e)| *e)
                .min_by(f64::total_cmp);
            let standing = match best {
                None => EtaStanding::Unranked,
                Some(b) if eta == b => EtaStanding::Best,
                Some(b) if eta <= b * near_best_ratio => EtaStanding::NearOptimal(b),
                Some(b) => EtaStanding::NotOptimal(b),
            };
            EtaNote { eta, standing }
        });

        let shovel = shovels.get(&choice.action).map(|s| {
            if s.is_active_with(active_state_code) {
                ShovelNote::Active {
                    queue: s.queue_count,
                }
            } else {
                ShovelNote::Inactive { state: s.state }
            }
        });

        Self { base, eta, shovel }
    }
}

fn code_or_na(code: Option<i64>) -> String {
    code.map_or_else(|| "N/A".to_string(), |c| c.to_string())
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        if let Some(note) = &self.eta {
            write!(f, " | ETA: {:.1} min", note.eta)?;
            match note.standing {
                EtaStanding::Best => write!(f, " (best ETA)")?,
                EtaStanding::NearOptimal(b) => write!(f, " (near optimal: {b:.1})")?,
                EtaStanding::NotOptimal(b) => write!(f, " (not optimal: best={b:.1})")?,
                EtaStanding::Unranked => {}
            }
        }
        match self.shovel {
            Some(ShovelNote::Active { queue }) => {
                write!(f, " | shovel active, queue: {}", code_or_na(queue))
            }
            Some(ShovelNote::Inactive { state }) => {
                write!(f, " | shovel inactive (state: {})", code_or_na(state))
            }
            None => Ok(()),
        }
    }
}
