//! Production dispatch.
//!
//! Two entry points share one core:
//! - **realtime**: one tick per invocation; decisions are persisted and
//!   settled against the next invocation's tick.
//! - **replay**: a recorded dataset is run through the same loop, learning
//!   online from consecutive tick pairs.

pub mod dispatcher;
pub mod pending;
pub mod reason;

pub use dispatcher::{Assignment, Dispatcher, ReplayOutcome, TickDispatch, TruckOutcome};
pub use pending::{PendingDecision, PendingStore};
pub use reason::{DecisionReason, EtaNote, EtaStanding, ReasonBase, ShovelNote};
