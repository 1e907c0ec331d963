//! helmsman-core — shared vocabulary for the Helmsman orchestrator.
//!
//! Stacks, scopes, slots, routes and domains are used by every other
//! crate in the workspace. The configuration file (`helmsman.toml`) is
//! parsed and validated here, before any infrastructure is touched.

pub mod config;
pub mod error;
pub mod types;

pub use config::HelmsmanConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
