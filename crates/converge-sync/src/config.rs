//! Synchronization configuration with sensible defaults.
//!
//! All magic numbers are extracted to named constants.

use std::time::Duration;

/// Default window of commits considered for sync (30 days).
pub const DEFAULT_TTL_MS: u64 = 2_592_000_000;

/// Default convergence budget: target expected round-trips to equality.
pub const DEFAULT_EXPECTED_SYNC_CYCLES: u32 = 3;

/// Default ceiling for one end-to-end cycle (30 seconds).
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 30;

/// Default minimum interval between cycles (5 seconds).
pub const DEFAULT_MIN_CYCLE_INTERVAL_SECS: u64 = 5;

/// Default maximum interval between cycles (5 minutes).
pub const DEFAULT_MAX_CYCLE_INTERVAL_SECS: u64 = 300;

/// Synchronization configuration.
///
/// Controls the TTL window, the FPR/bandwidth trade-off, and cycle timing.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Window of commits considered for sync; older commits are neither
    /// advertised nor shipped.
    pub ttl: Duration,

    /// Target `C` in the adaptive FPR formula: the expected number of
    /// round-trips before collections match.
    pub expected_sync_cycles: u32,

    /// Force `fpr = 0.5` to minimize bandwidth when high latency is
    /// acceptable.
    pub low_accuracy: bool,

    /// Whether outbound messages attach the missing-values payload.
    pub include_missing: bool,

    /// Ceiling for one end-to-end cycle; a cycle exceeding it is abandoned.
    pub timeout: Duration,

    /// Shortest interval pacing will ask for between cycles.
    pub min_interval: Duration,

    /// Longest interval pacing will ask for between cycles.
    pub max_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            expected_sync_cycles: DEFAULT_EXPECTED_SYNC_CYCLES,
            low_accuracy: false,
            include_missing: true,
            timeout: Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
            min_interval: Duration::from_secs(DEFAULT_MIN_CYCLE_INTERVAL_SECS),
            max_interval: Duration::from_secs(DEFAULT_MAX_CYCLE_INTERVAL_SECS),
        }
    }
}
