//! Schema identity and the upgrade engine.
//!
//! Every stored object carries a schema marker — `"null"` for the universal
//! empty schema, `"<ns>/<version>"` otherwise. The registry maps markers to
//! [`Schema`] values and walks objects forward through a dense chain of
//! per-version upgraders on read.
//!
//! # Architecture
//!
//! ```text
//! marker ("User/1") ──decode──► Schema ──upgrade chain──► (data', Schema@latest)
//!                                  │
//!                                  └── registry: ns → [vN, .., v2, v1]
//! ```
//!
//! Upgraders form a data-driven table, one optional pure function per
//! `(ns, version)` entry; there is no polymorphism. A missing intermediate
//! version fails the whole walk, and data is cloned before the first step so
//! a failed partial walk never mutates the caller's copy.

pub mod registry;
pub mod schema;

pub use registry::{ReadView, SchemaRegistry};
pub use schema::{Schema, UpgradeFn, NULL_MARKER};
