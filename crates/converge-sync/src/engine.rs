//! The sync engine: adaptive FPR, message builds, message application, and
//! the cycle driver.
//!
//! The engine is stateless across peers by design — everything one pairing
//! accumulates (the peer's last filter, size estimates, pacing
//! measurements) lives in a [`PeerSession`] owned by the caller. Dropping a
//! session is equivalent to first contact.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use converge_auth::{Access, AuthMatcher};
use converge_primitives::{BuildVersion, Commit, CommitId, Payload, RepoPath, Session};
use converge_registry::{Schema, SchemaRegistry};
use eyre::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::events::SyncEvent;
use crate::filter::{BloomFilter, MAX_FPR};
use crate::metrics::{no_op_metrics, SharedMetrics};
use crate::pacing::CyclePacer;
use crate::sched::{self, Priority};
use crate::store::{PutOutcome, Store};
use crate::wire::SyncMessage;

/// Compute the target false-positive rate for one cycle.
///
/// Two peers exchanging filters of FPR `p` over `n` elements converge in
/// roughly `2·log_p(n)` exchanges; solving for `p` at a target budget of
/// `expected_cycles` round-trips gives
///
/// ```text
/// fpr = min(0.5, n ^ (-1 / (0.5 · C)))
/// ```
///
/// with `n = max(1, local, peer)`. `low_accuracy` short-circuits to 0.5,
/// trading round-trips for the smallest possible filter.
#[must_use]
pub fn adaptive_fpr(local: u64, peer: u64, expected_cycles: u32, low_accuracy: bool) -> f64 {
    if low_accuracy {
        return MAX_FPR;
    }

    let n = local.max(peer).max(1) as f64;
    let budget = f64::from(expected_cycles.max(1));

    n.powf(-1.0 / (0.5 * budget)).min(MAX_FPR)
}

/// Per-peer protocol state, owned by the caller.
#[derive(Debug)]
pub struct PeerSession {
    peer_filter: Option<BloomFilter>,
    peer_size: u64,
    /// Local cardinality as of the last scan; `None` until first build.
    local_size: Option<u64>,
    /// Set when the previous cycle blew its ceiling; the next build uses
    /// the cheapest possible filter.
    degraded: bool,
    denied_by_peer: Vec<CommitId>,
    pacer: CyclePacer,
}

impl PeerSession {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            peer_filter: None,
            peer_size: 0,
            local_size: None,
            degraded: false,
            denied_by_peer: Vec::new(),
            pacer: CyclePacer::new(config.min_interval, config.max_interval, config.timeout),
        }
    }

    /// Ids the peer refused to ship in its last message, for diagnostics
    /// and UI surfaces.
    #[must_use]
    pub fn denied_by_peer(&self) -> &[CommitId] {
        &self.denied_by_peer
    }

    /// The pacing-derived interval to wait before the next cycle.
    #[must_use]
    pub fn next_cycle_in(&self) -> Duration {
        self.pacer.interval()
    }
}

/// Result of applying one inbound message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ApplyOutcome {
    /// Commits newly persisted.
    pub applied: usize,
    /// Commits received that were already present.
    pub duplicates: usize,
    /// Inbound commits rejected by authorization.
    pub denied: usize,
    /// Commits whose persistence failed (logged, not fatal).
    pub failed: usize,
}

/// Result of one driven cycle.
#[derive(Clone, Debug)]
pub enum CycleOutcome {
    /// The cycle ran end-to-end.
    Applied(ApplyOutcome),
    /// The cycle failed and was skipped; state is as if it never ran.
    Skipped { reason: String },
    /// The cycle exceeded the configured ceiling and was abandoned.
    Abandoned,
}

/// One request/response leg against a peer. The transport behind it is the
/// embedding's business; the engine only sees messages.
#[async_trait]
pub trait PeerExchange {
    /// Deliver an outbound message and return the peer's reply.
    async fn round_trip(&mut self, outbound: SyncMessage) -> Result<SyncMessage>;
}

/// Drives anti-entropy exchanges between the local store and one peer at a
/// time.
pub struct SyncEngine<S, D = ()> {
    store: S,
    db: D,
    registry: SchemaRegistry,
    matcher: AuthMatcher<D>,
    config: SyncConfig,
    metrics: SharedMetrics,
    events: Option<UnboundedSender<SyncEvent>>,
}

impl<S, D> SyncEngine<S, D>
where
    S: Store,
    D: Send + Sync,
{
    pub fn new(
        store: S,
        db: D,
        registry: SchemaRegistry,
        matcher: AuthMatcher<D>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            db,
            registry,
            matcher,
            config,
            metrics: no_op_metrics(),
            events: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Emit [`SyncEvent`]s on this channel as cycles run.
    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fresh per-peer state for this engine's configuration.
    #[must_use]
    pub fn new_peer_session(&self) -> PeerSession {
        PeerSession::new(&self.config)
    }

    /// Read a commit's payload through the schema registry, upgrading to
    /// the latest known version. The stored commit is untouched.
    #[must_use]
    pub fn read_commit(&self, commit: &Commit) -> (Payload, Schema) {
        self.registry
            .read_view(commit.schema_marker(), commit.payload())
    }

    /// Build the outbound message for one cycle.
    ///
    /// Scans the repository once: every readable id goes into a freshly
    /// seeded filter, ids the peer's last filter lacks are collected as
    /// missing values, unreadable ids land in the denial list, and the
    /// local cardinality is recounted — the iterator is the source of
    /// truth. Without a peer filter (first contact) or with
    /// `include_missing` off, only the filter is sent.
    pub async fn build_message(
        &self,
        repo: &RepoPath,
        session: &Session,
        peer: &mut PeerSession,
    ) -> Result<SyncMessage> {
        // On first contact the collection has never been scanned for this
        // peer, so take a counting pass; afterwards the last scan's recount
        // is the estimate.
        let local_estimate = match peer.local_size {
            Some(size) => size,
            None => self.store.scan(repo).count() as u64,
        };

        let fpr = if peer.degraded {
            MAX_FPR
        } else {
            adaptive_fpr(
                local_estimate,
                peer.peer_size,
                self.config.expected_sync_cycles,
                self.config.low_accuracy,
            )
        };
        let expected = local_estimate.max(peer.peer_size).max(1);

        let mut filter = BloomFilter::new(expected, fpr);
        let rule = self.matcher.rule_for_repo(repo.as_str());
        let cutoff = now_ms().saturating_sub(ttl_ms(&self.config.ttl));
        let include_missing = self.config.include_missing && peer.peer_filter.is_some();

        let mut values = Vec::new();
        let mut access_denied = Vec::new();
        let mut count: u64 = 0;

        {
            let peer_filter = peer.peer_filter.as_ref();

            sched::for_each(
                self.store.scan(repo),
                |(id, commit): (CommitId, Commit)| {
                    if commit.created_at_ms() < cutoff {
                        return;
                    }

                    if let Some(rule) = &rule {
                        if !rule.allows(&self.db, repo.as_str(), id.as_str(), session, Access::Read)
                        {
                            access_denied.push(id);
                            return;
                        }
                    }

                    filter.add(id.as_str());
                    count += 1;

                    if include_missing {
                        if let Some(peer_filter) = peer_filter {
                            if !peer_filter.has(id.as_str()) {
                                values.push(commit);
                            }
                        }
                    }
                },
                Priority::Normal,
                "sync_build_scan",
                false,
            )
            .await;
        }

        peer.local_size = Some(count);
        self.metrics.record_filter_built(filter.num_bits(), fpr);
        self.metrics.record_access_denied(access_denied.len());

        debug!(
            %repo,
            size = count,
            fpr,
            missing = values.len(),
            denied = access_denied.len(),
            "built sync message"
        );

        Ok(SyncMessage::new(
            self.store.org_id().clone(),
            filter,
            count,
            values,
            access_denied,
        ))
    }

    /// Apply one inbound message.
    ///
    /// Persists received values idempotently, records the peer's denial
    /// list, and retains the peer's filter for the next outbound build.
    pub async fn apply_message(
        &self,
        repo: &RepoPath,
        session: &Session,
        message: SyncMessage,
        peer: &mut PeerSession,
    ) -> Result<ApplyOutcome> {
        if message.org_id() != self.store.org_id() {
            return Err(SyncError::OrgMismatch {
                local: self.store.org_id().to_string(),
                peer: message.org_id().to_string(),
            }
            .into());
        }

        let local = BuildVersion::CURRENT;
        if message.build_version().is_newer_than(local) {
            debug!(
                peer_build = %message.build_version(),
                local_build = %local,
                "peer runs a newer build, proceeding"
            );
        } else if local.is_newer_than(message.build_version()) {
            warn!(
                peer_build = %message.build_version(),
                local_build = %local,
                "peer runs an older build; its envelopes may fail to decode"
            );
        }

        let rule = self.matcher.rule_for_repo(repo.as_str());
        let (filter, size, values, peer_denied) = message.into_parts();

        let mut outcome = ApplyOutcome::default();

        sched::for_each(
            values.into_iter(),
            |commit: Commit| {
                if let Some(rule) = &rule {
                    if !rule.allows(
                        &self.db,
                        repo.as_str(),
                        commit.id().as_str(),
                        session,
                        Access::Write,
                    ) {
                        debug!(%repo, id = %commit.id(), "rejecting unauthorized inbound commit");
                        outcome.denied += 1;
                        return;
                    }
                }

                let id = commit.id().clone();
                match self.store.put_commit(repo, commit) {
                    Ok(PutOutcome::Inserted) => outcome.applied += 1,
                    Ok(PutOutcome::Duplicate) => outcome.duplicates += 1,
                    Err(error) => {
                        warn!(%repo, %id, %error, "failed to persist synced commit");
                        outcome.failed += 1;
                    }
                }
            },
            Priority::Normal,
            "sync_apply",
            false,
        )
        .await;

        self.metrics
            .record_commits_applied(outcome.applied, outcome.duplicates);
        self.metrics.record_inbound_denied(outcome.denied);

        if !filter.is_valid() {
            // Keep the previous peer filter; a bad one would only manufacture
            // false "they have it" answers.
            warn!(%repo, "inbound filter failed validation, keeping previous");
        } else {
            peer.peer_filter = Some(filter);
        }
        peer.peer_size = size;
        peer.denied_by_peer = peer_denied;

        debug!(
            %repo,
            applied = outcome.applied,
            duplicates = outcome.duplicates,
            denied = outcome.denied,
            "applied sync message"
        );

        Ok(outcome)
    }

    /// Drive one full cycle: build, round-trip through `exchange`, apply.
    ///
    /// Runs under the configured ceiling. A cycle that exceeds it is
    /// abandoned — the partially built state is discarded with the future,
    /// the last good peer filter survives, and the next build degrades to
    /// the cheapest filter. A cycle that fails is skipped; neither outcome
    /// escapes as an error.
    pub async fn run_cycle<X>(
        &self,
        repo: &RepoPath,
        session: &Session,
        peer: &mut PeerSession,
        exchange: &mut X,
    ) -> CycleOutcome
    where
        X: PeerExchange + Send,
    {
        self.emit(SyncEvent::started(repo.clone()));
        let started = Instant::now();

        let cycle = async {
            let outbound = self.build_message(repo, session, peer).await?;
            let inbound = exchange.round_trip(outbound).await?;
            self.apply_message(repo, session, inbound, peer).await
        };
        let result = tokio::time::timeout(self.config.timeout, cycle).await;

        match result {
            Err(_) => {
                peer.degraded = true;
                self.metrics.record_cycle_abandoned();
                warn!(%repo, ceiling = ?self.config.timeout, "sync cycle exceeded ceiling, abandoned");
                self.emit(SyncEvent::abandoned(
                    repo.clone(),
                    started.elapsed().as_millis() as u64,
                ));
                CycleOutcome::Abandoned
            }
            Ok(Err(error)) => {
                self.metrics.record_cycle_failed();
                warn!(%repo, %error, "sync cycle failed, skipped");
                self.emit(SyncEvent::failed(repo.clone(), error.to_string()));
                CycleOutcome::Skipped {
                    reason: error.to_string(),
                }
            }
            Ok(Ok(outcome)) => {
                peer.degraded = false;
                let latency = started.elapsed();
                peer.pacer.observe(latency, outcome.applied as u64);
                self.metrics.record_cycle_complete(latency, outcome.applied);
                info!(
                    %repo,
                    applied = outcome.applied,
                    duplicates = outcome.duplicates,
                    latency_ms = latency.as_millis() as u64,
                    "sync cycle complete"
                );
                self.emit(SyncEvent::completed(
                    repo.clone(),
                    outcome.applied,
                    outcome.duplicates,
                    latency.as_millis() as u64,
                ));
                CycleOutcome::Applied(outcome)
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is listening.
            drop(events.send(event));
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn ttl_ms(ttl: &Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}
