//! Two-phase optimistic committer
//!
//! The publication sequence is check-write-check: a client wins only if no
//! peer file is observed after either of its two writes. Between a client's
//! phase-one write and its listing another client may also have entered
//! phase one; the second check after phase two catches peers that slipped in
//! between the writes.
//!
//! Losing clients do not clean up their own marker files. The adjudicator's
//! EXPIRED marker fences a contended attempt wholesale, and GC eventually
//! removes the whole version workspace.

use crate::adjudicate::{adjudicate, classify, AttemptState};
use crate::client_id::ClientId;
use crate::config::CommitterConfig;
use crate::error::{CommitError, Result};
use crate::layout::{commit_name, hint_body, pre_commit_name, CatalogLayout};
use crate::resolve::{resolve_attempt, resolve_version};
use crate::retention::{archive_old_trackers, clean_expired_commits};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tidelock_core::{Clock, Storage, SystemClock};
use tracing::debug;

/// Result of a successful publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The version that became visible.
    pub version: u64,
    /// The attempt under which it was published.
    pub attempt: u64,
    /// This invocation's client id (named in the COMMIT-HINT body).
    pub client: ClientId,
}

/// A strategy for publishing the next catalog version.
///
/// `commit` either makes exactly one new version durable and visible or
/// errors; [`CommitError::ConcurrentCommit`] is the retryable outcome, and
/// each retry re-resolves the target version from storage.
#[async_trait]
pub trait CommitStrategy: Debug + Send + Sync {
    /// Attempt to publish the next version.
    async fn commit(&self) -> Result<CommitOutcome>;
}

/// File-system-based commit coordinator.
///
/// An aggressive optimistic strategy: at most one client is expected to
/// drive a two-phase commit for a given version, and any trace of another
/// client observed mid-flight fails the attempt immediately. Coordination
/// happens purely through filenames on the shared storage substrate; there
/// is no lock service and no leader.
#[derive(Debug)]
pub struct FileCommitter<S> {
    storage: S,
    layout: CatalogLayout,
    config: CommitterConfig,
    clock: Arc<dyn Clock>,
}

impl<S: Storage> FileCommitter<S> {
    /// Create a committer over the given storage, rooted at `root`, with
    /// default configuration and the wall clock.
    pub fn new(storage: S, root: impl Into<String>) -> Self {
        Self::with_config(storage, root, CommitterConfig::default())
    }

    /// Create a committer with explicit configuration.
    pub fn with_config(storage: S, root: impl Into<String>, config: CommitterConfig) -> Self {
        Self {
            storage,
            layout: CatalogLayout::new(root),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (tests drive a `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one full commit: resolve the target version and attempt, claim
    /// the attempt with the two-phase sequence, publish, then retire old
    /// versions.
    pub async fn commit(&self) -> Result<CommitOutcome> {
        let version = resolve_version(&self.storage, &self.layout).await?;
        let attempt = resolve_attempt(&self.storage, &self.layout, &version).await?;

        let listing = self.storage.list_files(&attempt.attempt_dir, false).await?;
        if let AttemptState::InFlight {
            groups,
            latest_mtime,
        } = classify(&listing)
        {
            return Err(adjudicate(
                &self.storage,
                &self.layout,
                &self.config,
                self.clock.as_ref(),
                &version,
                &attempt,
                &groups,
                latest_mtime,
            )
            .await);
        }

        let client = ClientId::generate();
        let pre_name = pre_commit_name(&client);
        let commit_file_name = commit_name(&client);

        // Phase one: stake a claim, then look for peers.
        let pre_path = self
            .layout
            .pre_commit_file(version.version, attempt.attempt, &client);
        self.storage
            .write_without_guarantees(&pre_path, &pre_name)
            .await?;

        let peers = self
            .storage
            .list_files(&attempt.attempt_dir, false)
            .await?
            .into_iter()
            .filter(|e| e.file_name != pre_name)
            .count();
        if peers > 0 {
            debug!(
                version = version.version,
                attempt = attempt.attempt,
                peers,
                "peer observed after pre-commit; aborting"
            );
            return Err(CommitError::ConcurrentCommit);
        }

        // Phase two: complete the pair, then recheck. Anything beyond our
        // own pair — a peer's marker or a racing EXPIRED — kills the attempt.
        let commit_path = self
            .layout
            .commit_file(version.version, attempt.attempt, &client);
        self.storage
            .write_without_guarantees(&commit_path, client.as_str())
            .await?;

        let peers = self
            .storage
            .list_files(&attempt.attempt_dir, false)
            .await?
            .into_iter()
            .filter(|e| e.file_name != pre_name && e.file_name != commit_file_name)
            .count();
        if peers > 0 {
            debug!(
                version = version.version,
                attempt = attempt.attempt,
                peers,
                "peer observed after commit; aborting"
            );
            return Err(CommitError::ConcurrentCommit);
        }

        // Publish. The hint's appearance is the irreversible event that
        // makes this version visible and rolls the target forward.
        self.storage
            .write_without_guarantees(
                &version.commit_hint_file,
                &hint_body(client.as_str(), attempt.attempt),
            )
            .await?;
        self.storage
            .write_without_guarantees(
                &self.layout.witness_file(version.version, client.as_str()),
                client.as_str(),
            )
            .await?;
        debug!(
            version = version.version,
            attempt = attempt.attempt,
            client = %client,
            "published catalog version"
        );

        let trackers = self
            .storage
            .list_files(&self.layout.tracker_dir(), false)
            .await?;
        archive_old_trackers(
            &self.storage,
            &self.layout,
            &self.config,
            self.clock.as_ref(),
            &trackers,
            version.version,
        )
        .await?;
        clean_expired_commits(&self.storage, &self.layout, &self.config, self.clock.as_ref())
            .await?;

        Ok(CommitOutcome {
            version: version.version,
            attempt: attempt.attempt,
            client,
        })
    }
}

#[async_trait]
impl<S: Storage> CommitStrategy for FileCommitter<S> {
    async fn commit(&self) -> Result<CommitOutcome> {
        FileCommitter::commit(self).await
    }
}
