//! Per-repository authorization.
//!
//! Every item access resolves, by repository path, to a callable rule that
//! decides `(db, repo, item, session, op) -> bool`. Built-in rules cover the
//! `/sys/**` family and cannot be overridden; user rules are consulted after
//! them, in registration order. No rule matching ⇒ access granted — callers
//! that want closed-by-default register their own catch-all.
//!
//! Resolution is on the hot path (once per item access), so
//! [`AuthMatcher::rule_for_repo`] is linear in the number of rules and does
//! not allocate.

pub mod builtin;
pub mod matcher;

pub use builtin::BuiltinRule;
pub use matcher::{Access, AuthMatcher, ResolvedRule, Rule, RuleConflict};
