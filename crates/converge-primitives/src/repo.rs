//! Repository path normalization.
//!
//! A repository is a named container of commits, addressed by a `/`-rooted
//! path. Authorization rules key off the normalized form, and the matcher
//! sits on a per-item hot path, so comparisons against an already-normalized
//! rule path must not allocate — see [`matches_normalized`].

use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Normalize a repository path: leading slash enforced, duplicate slashes
/// collapsed, trailing slash stripped. The empty path normalizes to `/`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');

    for segment in segments(path) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }

    out
}

/// Compare a raw input path against an already-normalized path, segment by
/// segment, without allocating.
#[must_use]
pub fn matches_normalized(raw: &str, normalized: &str) -> bool {
    let mut raw_segments = segments(raw);
    let mut normalized_segments = segments(normalized);

    loop {
        match (raw_segments.next(), normalized_segments.next()) {
            (Some(a), Some(b)) if a == b => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether a path addresses a system repository (first segment `sys`).
#[must_use]
pub fn is_system(path: &str) -> bool {
    segments(path).next() == Some("sys")
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// A normalized repository path.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct RepoPath(String);

impl RepoPath {
    pub fn new(path: &str) -> Self {
        Self(normalize(path))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        is_system(&self.0)
    }
}

impl Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for RepoPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}
