use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Tenant identifier scoping a sync exchange.
///
/// Commit ids are only guaranteed unique within one org, so the engine
/// refuses to mix state across org boundaries.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrgId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for OrgId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
