//! Wire codec for sync messages.
//!
//! The envelope is a JSON-shaped object with a stable key layout:
//!
//! | key | contents |
//! |---|---|
//! | `ver` | sender's protocol build version |
//! | `f` | the sender's bloom filter (nested encoding) |
//! | `s` | sender's collection cardinality at send time |
//! | `c` | ordered array of serialized commits |
//! | `ad` | ids the sender refused to ship due to authorization |
//!
//! Decoding is tolerant: one corrupted commit is skipped (and counted)
//! without poisoning the batch, missing `c`/`ad` mean empty, and unknown
//! keys are ignored. Only the filter is load-bearing — an envelope whose
//! filter cannot be reconstructed kills the cycle.
//!
//! The organization id scopes an exchange but is not one of the wire keys;
//! it is established when the session is set up, and the decoder stamps the
//! expected org onto the reconstructed message.

use converge_primitives::{BuildVersion, Commit, CommitId, OrgId};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::filter::BloomFilter;
use crate::metrics::SyncMetrics;
use crate::sched::{self, Priority};

const KEY_VERSION: &str = "ver";
const KEY_FILTER: &str = "f";
const KEY_SIZE: &str = "s";
const KEY_VALUES: &str = "c";
const KEY_ACCESS_DENIED: &str = "ad";

/// One symmetric sync exchange message.
///
/// Lives for a single round-trip: built from a scan, shipped, applied,
/// dropped.
#[derive(Clone, Debug)]
pub struct SyncMessage {
    org_id: OrgId,
    build_version: BuildVersion,
    filter: BloomFilter,
    size: u64,
    values: Vec<Commit>,
    access_denied: Vec<CommitId>,
}

impl SyncMessage {
    pub fn new(
        org_id: OrgId,
        filter: BloomFilter,
        size: u64,
        values: Vec<Commit>,
        access_denied: Vec<CommitId>,
    ) -> Self {
        Self {
            org_id,
            build_version: BuildVersion::CURRENT,
            filter,
            size,
            values,
            access_denied,
        }
    }

    #[must_use]
    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }

    #[must_use]
    pub fn build_version(&self) -> BuildVersion {
        self.build_version
    }

    #[must_use]
    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn values(&self) -> &[Commit] {
        &self.values
    }

    #[must_use]
    pub fn access_denied(&self) -> &[CommitId] {
        &self.access_denied
    }

    /// Decompose for application: `(filter, size, values, access_denied)`.
    #[must_use]
    pub fn into_parts(self) -> (BloomFilter, u64, Vec<Commit>, Vec<CommitId>) {
        (self.filter, self.size, self.values, self.access_denied)
    }

    /// Encode to the wire layout.
    pub fn encode(&self, metrics: &dyn SyncMetrics) -> Result<Vec<u8>, SyncError> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            ver: BuildVersion,
            f: &'a BloomFilter,
            s: u64,
            #[serde(skip_serializing_if = "<[_]>::is_empty")]
            c: &'a [Commit],
            #[serde(skip_serializing_if = "<[_]>::is_empty")]
            ad: &'a [CommitId],
        }

        let bytes = serde_json::to_vec(&Envelope {
            ver: self.build_version,
            f: &self.filter,
            s: self.size,
            c: &self.values,
            ad: &self.access_denied,
        })?;

        metrics.record_message_encoded(bytes.len());
        Ok(bytes)
    }

    /// Decode an envelope, tolerantly.
    ///
    /// `org_id` is the org the receiving session was established for.
    pub fn decode(
        bytes: &[u8],
        org_id: OrgId,
        metrics: &dyn SyncMetrics,
    ) -> Result<Self, SyncError> {
        let (mut message, values) = Self::decode_envelope(bytes, org_id, metrics)?;

        for (index, value) in values.into_iter().enumerate() {
            if let Some(commit) = decode_commit(index, value, metrics) {
                message.values.push(commit);
            }
        }

        Ok(message)
    }

    /// Decode an envelope with many commits, yielding to the cooperative
    /// scheduler between commit constructions.
    pub async fn decode_streaming(
        bytes: &[u8],
        org_id: OrgId,
        metrics: &dyn SyncMetrics,
    ) -> Result<Self, SyncError> {
        let (mut message, values) = Self::decode_envelope(bytes, org_id, metrics)?;

        let commits = sched::map(
            values.into_iter().enumerate(),
            |(index, value)| decode_commit(index, value, metrics),
            Priority::Normal,
            "sync_decode_commits",
            true,
        )
        .await;
        message.values.extend(commits.into_iter().flatten());

        Ok(message)
    }

    /// Parse everything except the commits, which are returned raw.
    fn decode_envelope(
        bytes: &[u8],
        org_id: OrgId,
        metrics: &dyn SyncMetrics,
    ) -> Result<(Self, Vec<Value>), SyncError> {
        let envelope: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut envelope) = envelope else {
            return Err(SyncError::EnvelopeShape);
        };

        let filter = envelope.remove(KEY_FILTER).ok_or(SyncError::FilterMissing)?;
        let filter: BloomFilter = serde_json::from_value(filter)
            .map_err(|err| SyncError::FilterDecode(err.to_string()))?;

        let build_version = match envelope.get(KEY_VERSION).and_then(Value::as_u64) {
            Some(version) => BuildVersion::new(version as u32),
            None => {
                debug!("sync envelope carries no usable build version");
                BuildVersion::default()
            }
        };

        let size = envelope
            .get(KEY_SIZE)
            .and_then(Value::as_u64)
            .unwrap_or_default();

        let values = match envelope.remove(KEY_VALUES) {
            Some(Value::Array(values)) => values,
            Some(other) => {
                warn!(found = %kind(&other), "sync envelope `c` is not an array, ignoring");
                Vec::new()
            }
            None => Vec::new(),
        };

        let access_denied = match envelope.remove(KEY_ACCESS_DENIED) {
            Some(Value::Array(ids)) => ids
                .into_iter()
                .filter_map(|id| match id {
                    Value::String(id) if !id.is_empty() => Some(CommitId::new(id)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        metrics.record_message_decoded(bytes.len());

        let message = Self {
            org_id,
            build_version,
            filter,
            size,
            values: Vec::new(),
            access_denied,
        };

        Ok((message, values))
    }
}

/// Best-effort recovery: a commit that fails to decode is skipped and
/// counted, never fatal.
fn decode_commit(index: usize, value: Value, metrics: &dyn SyncMetrics) -> Option<Commit> {
    match serde_json::from_value::<Commit>(value) {
        Ok(commit) => Some(commit),
        Err(error) => {
            metrics.record_commit_decode_failure();
            warn!(index, %error, "skipping undecodable commit in sync message");
            None
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
