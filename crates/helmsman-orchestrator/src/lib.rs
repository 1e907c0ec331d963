//! helmsman-orchestrator — versioned, resumable deployment operations.
//!
//! Every mutating operation runs the same pipeline:
//!
//! ```text
//! load PersistedState (version V)
//!   └── StateCorrector::correct_state   verify handles, heal weights, re-derive active stack
//!         └── DeploymentState transition (fails fast on illegal edges)
//!               └── TrafficController shifts and/or BatchExecutor run
//!                     └── StateStore::commit(V → V + 1)
//! ```
//!
//! Every step is safe to repeat: weight writes are absolute, fleet
//! commands are idempotent per unit, and correction re-derives the truth
//! from live systems. A failed operation can therefore be re-run as is;
//! `OrchestratorError::kind` tells the caller whether that is worthwhile.

pub mod correction;
pub mod error;
pub mod orchestrator;
pub mod resources;

pub use correction::{Correction, Repair, StateCorrector};
pub use error::{ErrorKind, OrchestratorError, OrchestratorResult};
pub use orchestrator::{Collaborators, Orchestrator};
pub use resources::{InMemoryResourceClient, ResourceClient, ResourceRegistry};
