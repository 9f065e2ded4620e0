//! Core types shared by every crate in the converge workspace: commits,
//! sessions, repository paths, organization and protocol-version newtypes.
//!
//! Nothing in here performs I/O; these are plain data types plus the small
//! amount of parsing and normalization logic that keeps the rest of the
//! stack allocation-light on its hot paths.

pub mod commit;
pub mod org;
pub mod repo;
pub mod session;
pub mod version;

pub use commit::{Commit, CommitId, Payload};
pub use org::OrgId;
pub use repo::RepoPath;
pub use session::{Session, SessionId, ROOT};
pub use version::BuildVersion;
