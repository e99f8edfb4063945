//! Loading shovel records.

/// Activity-state code that marks a shovel as available for loading.
pub const ACTIVE_STATE: i64 = 1;

/// Snapshot of a single shovel at one tick.
///
/// Every attribute is optional because fleet telemetry omits fields freely;
/// consumers apply their own documented defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShovelRecord {
    /// Activity-state code; only [`ACTIVE_STATE`] means available.
    pub state: Option<i64>,
    /// Trucks already assigned to or waiting at this shovel.
    pub queue_count: Option<i64>,
    pub priority: Option<f64>,
    pub coverage: Option<f64>,
    /// Time to spot a truck under the shovel.
    pub spot_time: Option<f64>,
    /// Time to complete one loading cycle.
    pub cycle_time: Option<f64>,
}

impl ShovelRecord {
    /// Creates a shovel with the given state code and queue length.
    pub fn new(state: i64, queue_count: i64) -> Self {
        Self {
            state: Some(state),
            queue_count: Some(queue_count),
            ..Self::default()
        }
    }

    pub fn with_timing(mut self, spot_time: f64, cycle_time: f64) -> Self {
        self.spot_time = Some(spot_time);
        self.cycle_time = Some(cycle_time);
        self
    }

    pub fn with_priority(mut self, priority: f64, coverage: f64) -> Self {
        self.priority = Some(priority);
        self.coverage = Some(coverage);
        self
    }

    /// True when the state code equals `active_code`.
    pub fn is_active_with(&self, active_code: i64) -> bool {
        self.state == Some(active_code)
    }

    /// True when the state code equals [`ACTIVE_STATE`].
    pub fn is_active(&self) -> bool {
        self.is_active_with(ACTIVE_STATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_state_one_is_active() {
        assert!(ShovelRecord::new(1, 0).is_active());
        assert!(!ShovelRecord::new(3, 0).is_active());
        assert!(!ShovelRecord::new(4, 0).is_active());
        assert!(!ShovelRecord::default().is_active());
    }

    #[test]
    fn custom_active_code() {
        assert!(ShovelRecord::new(7, 0).is_active_with(7));
        assert!(!ShovelRecord::new(1, 0).is_active_with(7));
    }
}
