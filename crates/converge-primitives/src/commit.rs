use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Digest;
use thiserror::Error as ThisError;

/// Opaque commit payload: a mapping from string keys to JSON values.
///
/// `serde_json::Map` keeps keys sorted, which makes content addressing
/// deterministic without a separate canonicalization pass.
pub type Payload = Map<String, Value>;

/// Stable identifier of a commit, unique within an organization.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-address a payload: sha2-256 over its JSON form, bs58-encoded.
    pub fn derive(payload: &Payload) -> serde_json::Result<Self> {
        let mut hasher = sha2::Sha256::default();

        serde_json::to_writer(&mut hasher, payload)?;

        Ok(Self(bs58::encode(hasher.finalize()).into_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

#[derive(Clone, Copy, Debug, ThisError)]
#[error("commit id must not be empty")]
pub struct EmptyCommitId;

impl FromStr for CommitId {
    type Err = EmptyCommitId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EmptyCommitId);
        }
        Ok(Self(s.to_owned()))
    }
}

/// An immutable, content-addressed data record.
///
/// Commits never change after construction: fields are private and there is
/// no mutating API. The schema marker is carried verbatim (`"null"` or
/// `"<ns>/<version>"`); interpreting it is the registry's job, and the
/// marker a commit was stored with is preserved even when the payload is
/// read through an upgrade chain.
///
/// The serde representation of a commit *is* its wire encoding: short keys,
/// stable layout.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Commit {
    id: CommitId,
    #[serde(rename = "sm")]
    schema_marker: String,
    #[serde(rename = "p")]
    payload: Payload,
    /// Insertion timestamp in milliseconds since the epoch; drives TTL
    /// windowing during sync.
    #[serde(rename = "t")]
    created_at_ms: u64,
}

impl Commit {
    pub fn new(
        id: CommitId,
        schema_marker: impl Into<String>,
        payload: Payload,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            schema_marker: schema_marker.into(),
            payload,
            created_at_ms,
        }
    }

    /// Construct a commit whose id is derived from its payload.
    pub fn with_derived_id(
        schema_marker: impl Into<String>,
        payload: Payload,
        created_at_ms: u64,
    ) -> serde_json::Result<Self> {
        let id = CommitId::derive(&payload)?;
        Ok(Self::new(id, schema_marker, payload, created_at_ms))
    }

    #[must_use]
    pub fn id(&self) -> &CommitId {
        &self.id
    }

    #[must_use]
    pub fn schema_marker(&self) -> &str {
        &self.schema_marker
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }
}
