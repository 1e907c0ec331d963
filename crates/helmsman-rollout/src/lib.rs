//! helmsman-rollout — health-gated rolling batches over a fleet.
//!
//! A fleet-wide mutation (restart, image replacement) is split into a
//! `BatchPlan`. The `BatchExecutor` walks the plan strictly in order:
//! every unit of a batch is mutated, then the batch waits on the health
//! gate before the next one starts. Failed units are charged against the
//! plan's error budget; once the budget is exceeded the run stops and
//! completed batches stay as they are.
//!
//! # Components
//!
//! - **`plan`** — batch sizing and error budget
//! - **`fleet`** — fleet-mutation collaborator (`FleetClient`, `CommandSpec`)
//! - **`executor`** — batch loop, cancellation, `BatchReport`

pub mod error;
pub mod executor;
pub mod fleet;
pub mod plan;

pub use error::{RolloutError, RolloutResult};
pub use executor::{BatchExecutor, BatchReport, BatchStatus};
pub use fleet::{CommandSpec, FleetClient, InMemoryFleetClient, UnitAck};
pub use plan::BatchPlan;
