//! Tabular Q-learning dispatch.
//!
//! The pieces compose bottom-up:
//! [`StateEncoder`] turns a truck and the shovel fleet into a [`StateKey`],
//! [`RewardComputer`] scores a decision from the following tick,
//! [`QLearningAgent`] owns the [`ValueTable`] and selects and updates, and
//! [`TransitionDriver`] runs one learning step per truck and tick pair.
//! [`Trainer`], [`Sweep`], and [`Dispatcher`] drive that step over datasets,
//! hyperparameter grids, and live telemetry respectively.

pub mod agent;
pub mod config;
pub mod environment;
pub mod metrics;
pub mod observation;
pub mod policy;
pub mod production;
pub mod reward;
pub mod sweep;
pub mod training;
pub mod types;
pub mod value_table;

pub use agent::QLearningAgent;
pub use config::{
    AgentConfig, EncoderConfig, ProductionConfig, RewardConfig, SweepConfig, TrainingConfig,
};
pub use environment::{TransitionDriver, TransitionOutcome, ValidActionMode};
pub use metrics::{EvaluationMetrics, ProductionMetrics};
pub use observation::StateEncoder;
pub use policy::{DecisionContext, NearestShovelPolicy, Policy, RandomPolicy};
pub use production::{
    Assignment, DecisionReason, Dispatcher, PendingDecision, PendingStore, ReplayOutcome,
    TickDispatch, TruckOutcome,
};
pub use reward::RewardComputer;
pub use sweep::{Sweep, SweepParameter, SweepPoint, SweepResult, SweepStatus, SweepWriter};
pub use training::{Trainer, TrainingLog, TrainingReport};
pub use types::{ActionChoice, Feature, StateKey};
pub use value_table::{ValueRow, ValueTable};
