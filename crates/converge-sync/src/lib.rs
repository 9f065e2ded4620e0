//! Anti-entropy synchronization for the converge commit store.
//!
//! Drives any pair of peers toward collection equality using stateless,
//! symmetric message exchanges built on bloom-filter set reconciliation.
//! Bandwidth adapts to the observed divergence and a configurable
//! convergence budget.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (cycle driver)
//!     │  adaptive FPR, pacing, timeout ceiling
//!     ├── Store (scan / put, externally owned)
//!     ├── AuthMatcher (gates outbound reads and inbound writes)
//!     ├── SchemaRegistry (upgrade on read, receiving side)
//!     └── SyncMessage ◄──wire──► peer
//!              │
//!              └── BloomFilter (fresh random seeds every cycle)
//! ```
//!
//! # Protocol sketch
//!
//! Each cycle a peer scans its collection, feeds the ids it is willing to
//! share into a freshly seeded bloom filter, cross-checks them against the
//! filter last received from the peer, and ships the filter plus any
//! commits the peer appears to lack. Filters are re-seeded randomly every
//! cycle, so false positives do not survive from one cycle to the next and
//! the pair converges in `O(log_fpr(n))` exchanges with probability 1.
//!
//! Large scans and decodes run through the cooperative scheduler shim in
//! [`sched`], yielding between bounded chunks of work; dropping an
//! in-flight build or decode at a yield point cancels it without emitting a
//! partial message.

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod filter;
pub mod metrics;
pub mod pacing;
pub mod sched;
pub mod store;
pub mod wire;

pub use config::SyncConfig;
pub use engine::{
    adaptive_fpr, ApplyOutcome, CycleOutcome, PeerExchange, PeerSession, SyncEngine,
};
pub use errors::SyncError;
pub use events::{SyncEvent, SyncStatus};
pub use filter::BloomFilter;
pub use metrics::{no_op_metrics, NoOpMetrics, SharedMetrics, SyncMetrics};
pub use store::{MemoryStore, PutOutcome, Store};
pub use wire::SyncMessage;
