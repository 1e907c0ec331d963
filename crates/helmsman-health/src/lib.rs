//! helmsman-health — unit health checks for fleet mutations.
//!
//! After a batch of units is mutated, the rolling executor blocks on a
//! `HealthGate` until every unit in the batch reports healthy or the
//! per-batch timeout elapses.
//!
//! # Architecture
//!
//! ```text
//! HealthGate::wait(units)
//!   ├── HealthTracker per unit (consecutive results, backoff)
//!   ├── HealthCheckClient::is_healthy(unit) → ProbeResult
//!   └── GateReport { healthy, unhealthy, timed_out }
//! ```
//!
//! `ProbeHealthClient` is the stock client: it probes registered unit
//! addresses over HTTP or TCP according to the configured `ProbeConfig`.

pub mod checker;
pub mod client;
pub mod gate;

pub use checker::{HealthStatus, HealthTracker, ProbeResult};
pub use client::{HealthCheckClient, ProbeHealthClient};
pub use gate::{GateConfig, GateReport, HealthGate};
