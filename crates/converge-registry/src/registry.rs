use std::collections::HashMap;

use converge_primitives::Payload;
use tracing::{debug, warn};

use crate::schema::Schema;

/// The namespaces every registry knows about from construction.
const BUILTIN_NAMESPACES: [&str; 3] = ["Session", "User", "UserStats"];

/// Result of reading a payload through the registry: the (possibly
/// upgraded) data and the schema it is now at.
pub type ReadView = (Payload, Schema);

/// Maps `(ns, version)` identities to schemas and drives upgrade chains.
///
/// Read-mostly after startup: registration during steady state is forbidden
/// by contract, so the registry is shared by reference without interior
/// mutability. Prefer passing a registry explicitly; [`SchemaRegistry::default`]
/// exists for ergonomics, not as the only access path.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    /// Per-namespace entries, sorted by descending version.
    schemas: HashMap<String, Vec<Schema>>,
    null_schema: Schema,
}

impl SchemaRegistry {
    /// A registry with the builtin namespaces registered at version 1.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            schemas: HashMap::new(),
            null_schema: Schema::null(),
        };

        for ns in BUILTIN_NAMESPACES {
            registry.register(Schema::new(ns, 1));
        }

        registry
    }

    /// Register a schema. Idempotent on the `(ns, version)` pair: the first
    /// registration wins and later ones are no-ops.
    ///
    /// Registering the null schema is always a no-op; it exists implicitly.
    pub fn register(&mut self, schema: Schema) {
        let Some(ns) = schema.ns() else {
            return;
        };

        let entries = self.schemas.entry(ns.to_owned()).or_default();

        if entries.iter().any(|entry| entry.version() == schema.version()) {
            return;
        }

        let at = entries
            .iter()
            .position(|entry| entry.version() < schema.version())
            .unwrap_or(entries.len());
        entries.insert(at, schema);
    }

    /// Look up a schema: the named version, or the latest for `ns` when
    /// `version` is omitted. `ns == None` is the null schema.
    #[must_use]
    pub fn get(&self, ns: Option<&str>, version: Option<u32>) -> Option<&Schema> {
        let Some(ns) = ns else {
            return Some(&self.null_schema);
        };

        let entries = self.schemas.get(ns)?;

        match version {
            None => entries.first(),
            Some(version) => entries.iter().find(|entry| entry.version() == version),
        }
    }

    /// The highest registered version for a namespace.
    #[must_use]
    pub fn latest(&self, ns: &str) -> Option<&Schema> {
        self.get(Some(ns), None)
    }

    /// Encode a schema's marker. Inverse of [`SchemaRegistry::decode`].
    #[must_use]
    pub fn encode(schema: &Schema) -> String {
        schema.marker()
    }

    /// Decode a marker into a registered schema; unknown `(ns, version)`
    /// identities yield `None`.
    #[must_use]
    pub fn decode(&self, marker: &str) -> Option<Schema> {
        let (ns, version) = Schema::parse_marker(marker)?;

        match ns {
            None => Some(Schema::null()),
            Some(ns) => self.get(Some(ns), Some(version)).cloned(),
        }
    }

    /// Walk `data` forward from `from` through every registered step up to
    /// `target` (or the latest version of the namespace).
    ///
    /// The walk applies each step's upgrader where present, in version
    /// order, over a clone of `data` — the caller's copy is never touched,
    /// even by a walk that fails half way. Returns `None` when any
    /// intermediate version is missing from the registry, when the
    /// namespaces disagree, or when `target` is behind `from`.
    ///
    /// Null-schema data with no named target passes through unchanged.
    #[must_use]
    pub fn upgrade(
        &self,
        data: &Payload,
        from: &Schema,
        target: Option<&Schema>,
    ) -> Option<ReadView> {
        let ns = match (from.ns(), target.and_then(Schema::ns)) {
            (None, None) => return Some((data.clone(), Schema::null())),
            (Some(ns), Some(target_ns)) if ns != target_ns => return None,
            (Some(ns), _) => ns,
            (None, Some(target_ns)) => target_ns,
        };

        let target_version = match target {
            Some(target) => target.version(),
            None => self.latest(ns)?.version(),
        };

        if from.version() > target_version {
            return None;
        }

        let mut data = data.clone();
        let mut current = from.clone();

        for version in (from.version() + 1)..=target_version {
            let step = self.get(Some(ns), Some(version))?;

            if let Some(upgrade) = step.upgrade_fn() {
                data = upgrade(data);
            }
            current = step.clone();
        }

        Some((data, current))
    }

    /// Read a stored payload through its marker, upgrading to the latest
    /// known version where possible.
    ///
    /// Unknown markers read as the null schema; a chain with a missing step
    /// surfaces the data unchanged at its stored version. Neither case
    /// touches the stored object — the original marker stays with it.
    #[must_use]
    pub fn read_view(&self, marker: &str, payload: &Payload) -> ReadView {
        match self.decode(marker) {
            None => {
                debug!(marker, "unknown schema marker, reading as null schema");
                (payload.clone(), Schema::null())
            }
            Some(schema) if schema.is_null() => (payload.clone(), Schema::null()),
            Some(schema) => match self.upgrade(payload, &schema, None) {
                Some(view) => view,
                None => {
                    warn!(
                        marker,
                        "upgrade chain has a missing version, surfacing stored version"
                    );
                    (payload.clone(), schema)
                }
            },
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(kv: &[(&str, serde_json::Value)]) -> Payload {
        kv.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn user_chain() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();

        registry.register(Schema::with_upgrade("User", 2, |mut data| {
            let name = data
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            drop(data.insert("display_name".to_owned(), json!(name)));
            data
        }));
        registry.register(Schema::with_upgrade("User", 3, |mut data| {
            drop(data.insert("verified".to_owned(), json!(false)));
            data
        }));

        registry
    }

    #[test]
    fn test_builtins_registered_at_construction() {
        let registry = SchemaRegistry::new();

        for ns in ["Session", "User", "UserStats"] {
            assert_eq!(registry.latest(ns).map(Schema::version), Some(1));
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::new("User", 2));
        registry.register(Schema::new("User", 2));

        let entries: Vec<_> = (1..=3)
            .filter_map(|v| registry.get(Some("User"), Some(v)))
            .collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_entries_sorted_descending() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::new("User", 3));
        registry.register(Schema::new("User", 2));

        assert_eq!(registry.latest("User").map(Schema::version), Some(3));
    }

    #[test]
    fn test_get_named_and_latest() {
        let registry = user_chain();

        assert_eq!(registry.get(Some("User"), Some(2)).map(Schema::version), Some(2));
        assert_eq!(registry.get(Some("User"), None).map(Schema::version), Some(3));
        assert!(registry.get(Some("Nope"), None).is_none());
        assert!(registry.get(None, None).is_some());
    }

    #[test]
    fn test_decode_encode_roundtrip() {
        let registry = user_chain();

        for marker in ["null", "User/1", "User/2", "User/3"] {
            let schema = registry.decode(marker).unwrap();
            assert_eq!(SchemaRegistry::encode(&schema), marker);
        }

        assert!(registry.decode("User/9").is_none());
        assert!(registry.decode("Ghost/1").is_none());
    }

    #[test]
    fn test_upgrade_full_chain() {
        let registry = user_chain();
        let from = registry.decode("User/1").unwrap();
        let data = payload(&[("name", json!("alice"))]);

        let (upgraded, schema) = registry.upgrade(&data, &from, None).unwrap();

        assert_eq!(schema.version(), 3);
        assert_eq!(upgraded["display_name"], json!("alice"));
        assert_eq!(upgraded["verified"], json!(false));
        assert!(!upgraded.contains_key("name"));

        // The caller's copy is untouched.
        assert_eq!(data["name"], json!("alice"));
    }

    #[test]
    fn test_upgrade_equals_composition_of_steps() {
        let registry = user_chain();
        let v1 = registry.decode("User/1").unwrap();
        let v2 = registry.decode("User/2").unwrap();
        let v3 = registry.decode("User/3").unwrap();
        let data = payload(&[("name", json!("alice"))]);

        let (direct, _) = registry.upgrade(&data, &v1, Some(&v3)).unwrap();
        let (step1, _) = registry.upgrade(&data, &v1, Some(&v2)).unwrap();
        let (composed, _) = registry.upgrade(&step1, &v2, Some(&v3)).unwrap();

        assert_eq!(direct, composed);
    }

    #[test]
    fn test_upgrade_missing_intermediate_fails() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::with_upgrade("User", 3, |data| data));
        // Version 2 never registered: 1 -> 3 has a gap.

        let from = registry.decode("User/1").unwrap();
        let data = payload(&[("name", json!("alice"))]);

        assert!(registry.upgrade(&data, &from, None).is_none());
    }

    #[test]
    fn test_upgrade_null_passthrough() {
        let registry = SchemaRegistry::new();
        let data = payload(&[("k", json!("v"))]);

        let (out, schema) = registry.upgrade(&data, &Schema::null(), None).unwrap();

        assert_eq!(out, data);
        assert!(schema.is_null());
    }

    #[test]
    fn test_upgrade_same_version_is_noop() {
        let registry = user_chain();
        let v3 = registry.decode("User/3").unwrap();
        let data = payload(&[("k", json!("v"))]);

        let (out, schema) = registry.upgrade(&data, &v3, None).unwrap();

        assert_eq!(out, data);
        assert_eq!(schema.version(), 3);
    }

    #[test]
    fn test_read_view_upgrades_known_marker() {
        let registry = user_chain();
        let data = payload(&[("name", json!("alice"))]);

        let (view, schema) = registry.read_view("User/1", &data);

        assert_eq!(schema.version(), 3);
        assert_eq!(view["display_name"], json!("alice"));
    }

    #[test]
    fn test_read_view_unknown_marker_is_null_schema() {
        let registry = SchemaRegistry::new();
        let data = payload(&[("k", json!("v"))]);

        let (view, schema) = registry.read_view("Ghost/7", &data);

        assert_eq!(view, data);
        assert!(schema.is_null());
    }

    #[test]
    fn test_read_view_gap_surfaces_stored_version() {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::new("User", 3));
        // 1 -> 3 gap: version 2 missing.

        let data = payload(&[("name", json!("alice"))]);
        let (view, schema) = registry.read_view("User/1", &data);

        assert_eq!(view, data);
        assert_eq!(schema.version(), 1);
    }
}
