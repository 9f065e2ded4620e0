//! Cycle-level error types.
//!
//! Per-commit decode failures are deliberately *not* here: they are
//! skipped, counted through [`crate::metrics::SyncMetrics`], and logged —
//! one corrupted commit never poisons its batch. Everything below is fatal
//! to a single cycle at most; the engine degrades every cycle-level fault
//! to a skipped cycle.

use thiserror::Error as ThisError;

/// Errors of the sync codec and engine.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum SyncError {
    /// The envelope itself failed to parse.
    #[error("failed to decode sync envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// The envelope parsed but is not an object.
    #[error("sync envelope is not an object")]
    EnvelopeShape,

    /// The envelope has no `f` key. The filter must always reconstruct.
    #[error("sync envelope is missing the bloom filter")]
    FilterMissing,

    /// The filter was present but unusable. Fatal to the cycle; the engine
    /// carries the previous peer filter instead.
    #[error("failed to decode bloom filter: {0}")]
    FilterDecode(String),

    /// A message from a different organization reached this engine.
    #[error("organization mismatch: local {local}, peer {peer}")]
    OrgMismatch { local: String, peer: String },
}
