//! Training infrastructure for the Q-learning dispatcher.
//!
//! Provides the episodic trainer and its CSV transition log.

pub mod log;
pub mod trainer;

pub use log::TrainingLog;
pub use trainer::{checkpoint_file, Trainer, TrainingReport};
