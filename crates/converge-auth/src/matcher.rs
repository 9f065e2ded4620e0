use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use converge_primitives::{repo, Session};
use regex::Regex;
use thiserror::Error as ThisError;
use tracing::warn;

use crate::builtin::BuiltinRule;

/// The two operations authorization distinguishes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// A user-registered authorization predicate.
///
/// `db` is whatever context the embedding application wants its rules to see
/// (a database handle, usually); the core never interprets it.
pub type Rule<D> = Arc<dyn Fn(&D, &str, &str, &Session, Access) -> bool + Send + Sync>;

enum Pattern {
    /// Matches when the normalized repository id equals this (normalized) path.
    Exact(String),
    /// Matches when the regex matches the raw input path.
    Regex(Regex),
}

impl Debug for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.debug_tuple("Exact").field(path).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
        }
    }
}

/// Raised when a second rule is registered for the same exact path.
#[derive(Debug, ThisError)]
#[error("an authorization rule is already registered for path `{path}`")]
pub struct RuleConflict {
    pub path: String,
}

/// A rule resolved for a repository: either one of the `/sys/**` builtins or
/// a borrowed user rule. The matcher resolves; the caller invokes.
pub enum ResolvedRule<'a, D> {
    Builtin(BuiltinRule),
    User(&'a Rule<D>),
}

impl<D> ResolvedRule<'_, D> {
    /// Invoke the rule for one item access.
    #[must_use]
    pub fn allows(
        &self,
        db: &D,
        repo_path: &str,
        item: &str,
        session: &Session,
        op: Access,
    ) -> bool {
        match self {
            Self::Builtin(rule) => rule.allows(item, session, op),
            Self::User(rule) => rule(db, repo_path, item, session, op),
        }
    }
}

/// Resolves repository paths to authorization rules.
///
/// Built-in `/sys/**` rules are consulted first and cannot be overridden;
/// user rules follow in registration order. Exact-path rules compare against
/// the normalized repository id, regex rules test the raw input.
/// [`AuthMatcher::rule_for_repo`] is linear in the rule count and performs
/// no per-call allocation.
pub struct AuthMatcher<D = ()> {
    rules: Vec<(Pattern, Rule<D>)>,
}

impl<D> AuthMatcher<D> {
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule for an exact repository path.
    ///
    /// The path is normalized before storage. Fails when a rule for the same
    /// exact path already exists. Paths under `/sys/**` are accepted but are
    /// permanently shadowed by the builtins.
    pub fn register_rule(&mut self, path: &str, rule: Rule<D>) -> Result<(), RuleConflict> {
        let path = repo::normalize(path);

        if repo::is_system(&path) {
            warn!(%path, "registered rule is shadowed by built-in system rules");
        }

        let conflict = self.rules.iter().any(|(pattern, _)| match pattern {
            Pattern::Exact(existing) => *existing == path,
            Pattern::Regex(_) => false,
        });
        if conflict {
            return Err(RuleConflict { path });
        }

        self.rules.push((Pattern::Exact(path), rule));
        Ok(())
    }

    /// Register a rule for every path the regex matches.
    ///
    /// Regex rules never conflict with each other; resolution order is
    /// registration order.
    pub fn register_regex_rule(&mut self, pattern: Regex, rule: Rule<D>) {
        self.rules.push((Pattern::Regex(pattern), rule));
    }

    /// Resolve the rule governing a repository path, if any.
    ///
    /// Built-ins first, then user rules in registration order, first match
    /// wins. `None` means no rule governs the path — access is open.
    #[must_use]
    pub fn rule_for_repo(&self, input: &str) -> Option<ResolvedRule<'_, D>> {
        if let Some(builtin) = BuiltinRule::for_repo(input) {
            return Some(ResolvedRule::Builtin(builtin));
        }

        for (pattern, rule) in &self.rules {
            let matched = match pattern {
                Pattern::Exact(path) => repo::matches_normalized(input, path),
                Pattern::Regex(re) => re.is_match(input),
            };
            if matched {
                return Some(ResolvedRule::User(rule));
            }
        }

        None
    }

    /// Convenience: resolve and evaluate in one call, defaulting to open
    /// when no rule matches.
    #[must_use]
    pub fn allows(
        &self,
        db: &D,
        repo_path: &str,
        item: &str,
        session: &Session,
        op: Access,
    ) -> bool {
        match self.rule_for_repo(repo_path) {
            Some(rule) => rule.allows(db, repo_path, item, session, op),
            None => true,
        }
    }
}

impl<D> Default for AuthMatcher<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Debug for AuthMatcher<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMatcher")
            .field("rules", &self.rules.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deny_all() -> Rule<()> {
        Arc::new(|_, _, _, _, _| false)
    }

    fn allow_all() -> Rule<()> {
        Arc::new(|_, _, _, _, _| true)
    }

    #[test]
    fn test_open_by_default() {
        let matcher = AuthMatcher::<()>::new();

        assert!(matcher.rule_for_repo("/app/notes").is_none());
        assert!(matcher.allows(&(), "/app/notes", "item", &Session::new("alice"), Access::Write));
    }

    #[test]
    fn test_exact_path_conflict() {
        let mut matcher = AuthMatcher::<()>::new();

        matcher.register_rule("/app/notes", deny_all()).unwrap();
        // Normalization makes these the same exact path.
        let err = matcher.register_rule("app//notes/", deny_all()).unwrap_err();

        assert_eq!(err.path, "/app/notes");
    }

    #[test]
    fn test_user_rules_resolve_in_registration_order() {
        let mut matcher = AuthMatcher::<()>::new();

        matcher
            .register_regex_rule(Regex::new("^/app/.*$").unwrap(), deny_all());
        matcher.register_rule("/app/notes", allow_all()).unwrap();

        // The regex was registered first, so it wins for /app/notes too.
        let session = Session::new("alice");
        let rule = matcher.rule_for_repo("/app/notes").unwrap();
        assert!(!rule.allows(&(), "/app/notes", "item", &session, Access::Read));
    }

    #[test]
    fn test_builtins_take_precedence_over_user_rules() {
        let mut matcher = AuthMatcher::<()>::new();
        matcher.register_rule("/sys/users", allow_all()).unwrap();

        let alice = Session::new("alice");
        let rule = matcher.rule_for_repo("/sys/users").unwrap();

        // The permissive user rule is shadowed: alice still cannot write bob.
        assert!(!rule.allows(&(), "/sys/users", "bob", &alice, Access::Write));
    }

    #[test]
    fn test_regex_rule_tests_raw_input() {
        let mut matcher = AuthMatcher::<()>::new();
        matcher.register_regex_rule(Regex::new("^/tenant/[0-9]+$").unwrap(), deny_all());

        assert!(matcher.rule_for_repo("/tenant/42").is_some());
        assert!(matcher.rule_for_repo("/tenant/abc").is_none());
    }

    #[test]
    fn test_rule_receives_context() {
        struct Db {
            banned: &'static str,
        }

        let mut matcher = AuthMatcher::<Db>::new();
        matcher
            .register_rule(
                "/app/notes",
                Arc::new(|db: &Db, _, item, _, _| item != db.banned),
            )
            .unwrap();

        let db = Db { banned: "n42" };
        let session = Session::new("alice");

        assert!(!matcher.allows(&db, "/app/notes", "n42", &session, Access::Read));
        assert!(matcher.allows(&db, "/app/notes", "n7", &session, Access::Read));
    }
}
