//! Sync events for observability.

use converge_primitives::RepoPath;
use serde::{Deserialize, Serialize};

/// One lifecycle event of a sync cycle.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SyncEvent {
    /// Repository being synchronized.
    pub repo: RepoPath,

    /// What happened.
    pub status: SyncStatus,

    /// End-to-end duration, where one is known.
    pub duration_ms: Option<u64>,

    /// Error message for failed cycles.
    pub error: Option<String>,
}

/// Cycle status.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Cycle started.
    Started,

    /// Cycle completed.
    Completed {
        /// Commits newly persisted this cycle.
        applied: usize,
        /// Commits received that were already present.
        duplicates: usize,
    },

    /// Cycle exceeded its ceiling and was abandoned.
    Abandoned,

    /// Cycle failed and was skipped.
    Failed,
}

impl SyncEvent {
    pub fn started(repo: RepoPath) -> Self {
        Self {
            repo,
            status: SyncStatus::Started,
            duration_ms: None,
            error: None,
        }
    }

    pub fn completed(repo: RepoPath, applied: usize, duplicates: usize, duration_ms: u64) -> Self {
        Self {
            repo,
            status: SyncStatus::Completed {
                applied,
                duplicates,
            },
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub fn abandoned(repo: RepoPath, duration_ms: u64) -> Self {
        Self {
            repo,
            status: SyncStatus::Abandoned,
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub fn failed(repo: RepoPath, error: String) -> Self {
        Self {
            repo,
            status: SyncStatus::Failed,
            duration_ms: None,
            error: Some(error),
        }
    }
}
