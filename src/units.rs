//! Time quantities for ETA and shovel timing arithmetic.
//!
//! Truck ETAs are reported in minutes. Shovel spot and cycle times may be
//! reported in minutes or seconds depending on the fleet system, so they are
//! converted to minutes before being combined with an ETA.

use qtty::{Minute, Quantity, Second, Unit};
use serde::{Deserialize, Serialize};

/// A duration expressed in minutes.
pub type Minutes = Quantity<Minute>;

/// Marker trait for units that share the same physical dimension.
///
/// This trait is automatically implemented for any pair of units where
/// `From::Dim == To::Dim`, enabling compile-time checked conversions.
pub trait SameDim<To: Unit>: Unit<Dim = To::Dim> {}

// Blanket implementation: any two units with the same dimension satisfy SameDim
impl<From, To> SameDim<To> for From
where
    From: Unit,
    To: Unit<Dim = From::Dim>,
{
}

/// Converts a quantity from one unit to another unit of the same dimension.
#[inline]
pub const fn convert<From, To>(q: Quantity<From>) -> Quantity<To>
where
    From: SameDim<To>,
    To: Unit,
{
    q.to_const::<To>()
}

/// Unit in which shovel spot and cycle times are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingUnit {
    #[default]
    Minutes,
    Seconds,
}

impl TimingUnit {
    /// Interprets a raw timing value in this unit as minutes.
    pub fn to_minutes(self, raw: f64) -> Minutes {
        match self {
            TimingUnit::Minutes => Quantity::new(raw),
            TimingUnit::Seconds => convert(Quantity::<Second>::new(raw)),
        }
    }
}

/// Time left after a truck arrives once the shovel's spot and cycle are paid.
///
/// `slack = eta - (spot + cycle)`; negative values mean the shovel is still
/// busy when the truck gets there.
pub fn timing_slack(eta: Minutes, spot: Minutes, cycle: Minutes) -> Minutes {
    eta - spot - cycle
}
