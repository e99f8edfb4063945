//! Random policy for testing and baselines.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::trait_::{DecisionContext, Policy};
use crate::ShovelId;

/// Uniformly random choice among the valid shovels.
///
/// Used for sanity checks and as a lower-bound baseline.
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    /// Creates a random policy with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn select(&mut self, ctx: &DecisionContext<'_>) -> Option<ShovelId> {
        ctx.valid_actions.choose(&mut self.rng).cloned()
    }

    fn name(&self) -> &str {
        "random"
    }
}
