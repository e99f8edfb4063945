//! Dispatch algorithms.

pub mod rl;

pub use rl::{Dispatcher, QLearningAgent, Trainer};
