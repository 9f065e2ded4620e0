use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use converge_primitives::Payload;

/// The marker string of the universal empty schema.
pub const NULL_MARKER: &str = "null";

/// A pure migration step from one schema version's data to the next.
pub type UpgradeFn = Arc<dyn Fn(Payload) -> Payload + Send + Sync>;

/// Identity of a schema: a nullable namespace and a version.
///
/// `ns == None` is the universal empty schema at version 0. For named
/// namespaces versions start at 1 and form a dense chain within a registry.
#[derive(Clone)]
pub struct Schema {
    ns: Option<String>,
    version: u32,
    upgrade: Option<UpgradeFn>,
}

impl Schema {
    /// The universal empty schema.
    #[must_use]
    pub fn null() -> Self {
        Self {
            ns: None,
            version: 0,
            upgrade: None,
        }
    }

    pub fn new(ns: impl Into<String>, version: u32) -> Self {
        Self {
            ns: Some(ns.into()),
            version,
            upgrade: None,
        }
    }

    /// A schema entry with an upgrader from the previous version's data.
    pub fn with_upgrade(
        ns: impl Into<String>,
        version: u32,
        upgrade: impl Fn(Payload) -> Payload + Send + Sync + 'static,
    ) -> Self {
        Self {
            ns: Some(ns.into()),
            version,
            upgrade: Some(Arc::new(upgrade)),
        }
    }

    #[must_use]
    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.ns.is_none()
    }

    #[must_use]
    pub(crate) fn upgrade_fn(&self) -> Option<&UpgradeFn> {
        self.upgrade.as_ref()
    }

    /// Encode this schema's marker: `"null"` or `"<ns>/<version>"`.
    #[must_use]
    pub fn marker(&self) -> String {
        match &self.ns {
            None => NULL_MARKER.to_owned(),
            Some(ns) => format!("{ns}/{}", self.version),
        }
    }

    /// Parse a marker string into its `(ns, version)` identity.
    ///
    /// Returns `None` for anything that is not `"null"` or
    /// `"<ns>/<version>"` with a positive decimal version. Whether the
    /// identity is *known* is the registry's call, not the parser's.
    #[must_use]
    pub fn parse_marker(marker: &str) -> Option<(Option<&str>, u32)> {
        if marker == NULL_MARKER {
            return Some((None, 0));
        }

        let (ns, version) = marker.rsplit_once('/')?;
        if ns.is_empty() {
            return None;
        }

        let version: u32 = version.parse().ok()?;
        if version == 0 {
            return None;
        }

        Some((Some(ns), version))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        // Identity is (ns, version); upgraders don't participate.
        self.ns == other.ns && self.version == other.version
    }
}

impl Eq for Schema {}

impl Debug for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("ns", &self.ns)
            .field("version", &self.version)
            .field("upgrade", &self.upgrade.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_encoding() {
        assert_eq!(Schema::null().marker(), "null");
        assert_eq!(Schema::new("User", 3).marker(), "User/3");
    }

    #[test]
    fn test_marker_parsing() {
        assert_eq!(Schema::parse_marker("null"), Some((None, 0)));
        assert_eq!(Schema::parse_marker("User/3"), Some((Some("User"), 3)));
        assert_eq!(Schema::parse_marker("a/b/2"), Some((Some("a/b"), 2)));
        assert_eq!(Schema::parse_marker("User"), None);
        assert_eq!(Schema::parse_marker("User/0"), None);
        assert_eq!(Schema::parse_marker("/3"), None);
        assert_eq!(Schema::parse_marker("User/x"), None);
    }

    #[test]
    fn test_equality_ignores_upgrader() {
        let plain = Schema::new("User", 2);
        let upgraded = Schema::with_upgrade("User", 2, |data| data);

        assert_eq!(plain, upgraded);
    }
}
