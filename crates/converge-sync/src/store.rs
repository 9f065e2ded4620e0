//! The commit store interface consumed by the engine.
//!
//! The real store lives outside the core; the engine only scans, probes,
//! and inserts. [`MemoryStore`] is a reference implementation used by the
//! test suites and small embeddings.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use converge_primitives::{Commit, CommitId, OrgId, RepoPath};

/// Result of inserting a commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PutOutcome {
    /// The commit was new and is now persisted.
    Inserted,
    /// A commit with this id was already present; nothing changed.
    Duplicate,
}

/// Storage operations the sync core needs.
///
/// Commits are immutable and content-addressed, so `put_commit` is
/// idempotent on the commit id: a second insert of the same id is a
/// [`PutOutcome::Duplicate`] and must not rewrite the stored object.
pub trait Store: Send + Sync {
    /// Lazily iterate a repository's commits, in any stable order.
    fn scan(&self, repo: &RepoPath) -> Box<dyn Iterator<Item = (CommitId, Commit)> + Send + '_>;

    /// Whether a commit id exists in a repository.
    fn has_commit(&self, repo: &RepoPath, id: &CommitId) -> bool;

    /// Persist a commit, idempotently on its id.
    fn put_commit(&self, repo: &RepoPath, commit: Commit) -> eyre::Result<PutOutcome>;

    /// The organization this store belongs to.
    fn org_id(&self) -> &OrgId;
}

/// An in-memory [`Store`].
///
/// `scan` iterates a snapshot taken under the read lock, so a scan sees a
/// stable view and never holds the lock across the caller's suspension
/// points.
#[derive(Debug)]
pub struct MemoryStore {
    org_id: OrgId,
    repos: RwLock<HashMap<String, BTreeMap<CommitId, Commit>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(org_id: OrgId) -> Self {
        Self {
            org_id,
            repos: RwLock::new(HashMap::new()),
        }
    }

    /// Number of commits currently held for a repository.
    #[must_use]
    pub fn commit_count(&self, repo: &RepoPath) -> usize {
        self.repos
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(repo.as_str())
            .map_or(0, BTreeMap::len)
    }
}

impl Store for MemoryStore {
    fn scan(&self, repo: &RepoPath) -> Box<dyn Iterator<Item = (CommitId, Commit)> + Send + '_> {
        let snapshot: Vec<_> = self
            .repos
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(repo.as_str())
            .map(|commits| {
                commits
                    .iter()
                    .map(|(id, commit)| (id.clone(), commit.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Box::new(snapshot.into_iter())
    }

    fn has_commit(&self, repo: &RepoPath, id: &CommitId) -> bool {
        self.repos
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(repo.as_str())
            .is_some_and(|commits| commits.contains_key(id))
    }

    fn put_commit(&self, repo: &RepoPath, commit: Commit) -> eyre::Result<PutOutcome> {
        let mut repos = self.repos.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let commits = repos.entry(repo.as_str().to_owned()).or_default();

        if commits.contains_key(commit.id()) {
            return Ok(PutOutcome::Duplicate);
        }

        drop(commits.insert(commit.id().clone(), commit));
        Ok(PutOutcome::Inserted)
    }

    fn org_id(&self) -> &OrgId {
        &self.org_id
    }
}
