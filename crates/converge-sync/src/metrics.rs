//! Sync metrics collection.
//!
//! The [`SyncMetrics`] trait is the single observability seam of the
//! engine. Production embeddings hang a real collector off it; everything
//! else uses [`NoOpMetrics`], whose methods are inline no-ops the compiler
//! can erase.

use std::sync::Arc;
use std::time::Duration;

/// Collector for sync protocol measurements.
///
/// All methods must be cheap when metrics are disabled.
pub trait SyncMetrics: Send + Sync {
    /// A sync envelope was encoded for sending.
    fn record_message_encoded(&self, bytes: usize);

    /// A sync envelope was decoded.
    fn record_message_decoded(&self, bytes: usize);

    /// One commit inside an envelope failed to decode and was skipped.
    ///
    /// This is the counter behind the best-effort recovery policy: a
    /// corrupted commit never poisons its batch, but it must not vanish
    /// silently either.
    fn record_commit_decode_failure(&self);

    /// A fresh outbound filter was constructed.
    fn record_filter_built(&self, num_bits: u64, fpr: f64);

    /// Commits were persisted from an inbound message.
    fn record_commits_applied(&self, applied: usize, duplicates: usize);

    /// Ids withheld from an outbound message by authorization.
    fn record_access_denied(&self, count: usize);

    /// Inbound commits rejected by authorization.
    fn record_inbound_denied(&self, count: usize);

    /// A cycle completed end-to-end.
    fn record_cycle_complete(&self, duration: Duration, applied: usize);

    /// A cycle exceeded its ceiling and was abandoned.
    fn record_cycle_abandoned(&self);

    /// A cycle failed and was skipped.
    fn record_cycle_failed(&self);
}

/// No-op implementation for when metrics are disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetrics;

impl SyncMetrics for NoOpMetrics {
    #[inline]
    fn record_message_encoded(&self, _bytes: usize) {}

    #[inline]
    fn record_message_decoded(&self, _bytes: usize) {}

    #[inline]
    fn record_commit_decode_failure(&self) {}

    #[inline]
    fn record_filter_built(&self, _num_bits: u64, _fpr: f64) {}

    #[inline]
    fn record_commits_applied(&self, _applied: usize, _duplicates: usize) {}

    #[inline]
    fn record_access_denied(&self, _count: usize) {}

    #[inline]
    fn record_inbound_denied(&self, _count: usize) {}

    #[inline]
    fn record_cycle_complete(&self, _duration: Duration, _applied: usize) {}

    #[inline]
    fn record_cycle_abandoned(&self) {}

    #[inline]
    fn record_cycle_failed(&self) {}
}

/// A shared metrics collector.
pub type SharedMetrics = Arc<dyn SyncMetrics>;

/// Create a no-op metrics instance.
pub fn no_op_metrics() -> SharedMetrics {
    Arc::new(NoOpMetrics)
}
