//! Helmsman weighted traffic — DNS weight distribution across stacks.
//!
//! Every route has, per stack, a stable (`b`) and a canary (`g`) weighted
//! DNS record. Records are addressed by a three-character identifier
//! (`"{stack}{scope}{slot}"`, e.g. `"1ig"`) that is shared with existing
//! DNS records and must not change.
//!
//! # Components
//!
//! - **`weights`** — identifier codec, `expand` / `flatten`
//! - **`client`** — DNS-record collaborator trait and an in-memory implementation
//! - **`controller`** — reads weights, applies ordered two-step shifts

pub mod client;
pub mod controller;
pub mod error;
pub mod weights;

pub use client::{DnsRecordClient, InMemoryDnsClient, RecordWrite, WeightRecord};
pub use controller::{ShiftDirection, TrafficController};
pub use error::{TrafficError, TrafficResult};
pub use weights::{FlatWeights, NestedWeights, WeightId, WeightPair, expand, flatten};
