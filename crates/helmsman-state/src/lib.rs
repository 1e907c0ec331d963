//! helmsman-state — versioned deployment state for Helmsman.
//!
//! Backed by [redb](https://docs.rs/redb), holds one `PersistedState`
//! record per deployment: the active/target stack, the deployment phase,
//! the cloud resource handles created by the orchestrators, the image
//! version and whether the deployment secret exists.
//!
//! # Versioning
//!
//! Every record carries a monotonic `version`. Writers go through
//! [`StateStore::commit`], which takes the version the caller read and
//! rejects the write with [`StateError::VersionConflict`] if anyone else
//! committed in between. A second concurrent writer is detected, never
//! merged.
//!
//! # Phase machine
//!
//! `DeploymentState` can only be changed through the transitions in
//! [`phase`]; anything else is an [`StateError::IllegalTransition`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and is handed explicitly to every component that needs it.

pub mod error;
pub mod phase;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use phase::{DeploymentPhase, DeploymentState};
pub use store::StateStore;
pub use types::*;
