//! Contention adjudication
//!
//! Entered when an attempt workspace is found non-empty before this client
//! has written anything: a prior client, or its crash, left state behind.
//! The adjudicator classifies the debris from a single listing and decides
//! whether to recover a crashed finisher's publication, fence the attempt,
//! or simply fail so the caller retries.
//!
//! Every outcome surfaces `ConcurrentCommit` to this client; adjudication
//! only changes what the *next* client will observe.

use crate::config::CommitterConfig;
use crate::error::CommitError;
use crate::layout::{client_key, hint_body, CatalogLayout, EXPIRED_BODY, EXPIRED_HINT};
use crate::resolve::{ResolvedAttempt, ResolvedVersion};
use std::collections::BTreeMap;
use tidelock_core::{Clock, FileEntry, Storage};
use tracing::{debug, warn};

/// State of an attempt workspace, computed from one directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptState {
    /// No files; this client may be the first writer.
    Empty,
    /// Files from prior or concurrent clients are present.
    InFlight {
        /// Commit files grouped by client key (`PRE_COMMIT-<U>.txt` and
        /// `<U>.txt` share the key `<U>`). The EXPIRED marker is excluded.
        groups: BTreeMap<String, usize>,
        /// Max `last_modified` across the raw listing.
        latest_mtime: i64,
    },
}

/// Group an attempt listing by client key.
pub(crate) fn classify(entries: &[FileEntry]) -> AttemptState {
    if entries.is_empty() {
        return AttemptState::Empty;
    }
    let latest_mtime = entries.iter().map(|e| e.last_modified).max().unwrap_or(0);
    let mut groups: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        if entry.file_name == EXPIRED_HINT {
            continue;
        }
        *groups
            .entry(client_key(&entry.file_name).to_string())
            .or_default() += 1;
    }
    AttemptState::InFlight {
        groups,
        latest_mtime,
    }
}

/// Decide what to do about a non-empty attempt workspace.
///
/// Always produces the error the current client must surface; storage
/// failures while writing markers take precedence over the
/// `ConcurrentCommit` outcome.
pub(crate) async fn adjudicate<S: Storage + ?Sized>(
    storage: &S,
    layout: &CatalogLayout,
    config: &CommitterConfig,
    clock: &dyn Clock,
    version: &ResolvedVersion,
    attempt: &ResolvedAttempt,
    groups: &BTreeMap<String, usize>,
    latest_mtime: i64,
) -> CommitError {
    // Two or more clients are mid-phase-one; none can safely advance.
    let singletons = groups.values().filter(|count| **count == 1).count();
    if singletons == groups.len() && groups.len() > 1 {
        warn!(
            version = version.version,
            attempt = attempt.attempt,
            clients = groups.len(),
            "multiple in-flight writers; fencing attempt"
        );
        if let Err(e) = storage
            .write_without_guarantees(&attempt.expired_hint_file, EXPIRED_BODY)
            .await
        {
            return e.into();
        }
        return CommitError::ConcurrentCommit;
    }

    // Backend mtimes ahead of our clock only delay expiry, never trigger it.
    let elapsed = (clock.now_millis() - latest_mtime).max(0);
    if elapsed > config.ttl_pre_commit_ms {
        match storage.exists(&version.commit_hint_file).await {
            Err(e) => return e.into(),
            Ok(true) => {
                // Published while we were looking; nothing to repair.
            }
            Ok(false) => {
                let sole_finisher = (groups.len() == 1)
                    .then(|| groups.iter().next())
                    .flatten()
                    .filter(|(_, count)| **count == 2)
                    .map(|(key, _)| key.clone());

                if let Some(client) = sole_finisher {
                    // A predecessor completed both phases but died before
                    // publishing; any client may finish its hint.
                    warn!(
                        version = version.version,
                        attempt = attempt.attempt,
                        client = %client,
                        "completing publication of a crashed finisher"
                    );
                    let body = hint_body(&client, attempt.attempt);
                    if let Err(e) = storage
                        .write_without_guarantees(&version.commit_hint_file, &body)
                        .await
                    {
                        return e.into();
                    }
                    let witness = layout.witness_file(version.version, &client);
                    if let Err(e) = storage.write_without_guarantees(&witness, &client).await {
                        return e.into();
                    }
                } else {
                    warn!(
                        version = version.version,
                        attempt = attempt.attempt,
                        "stale partial progress cannot be completed; fencing attempt"
                    );
                    if let Err(e) = storage
                        .write_without_guarantees(&attempt.expired_hint_file, EXPIRED_BODY)
                        .await
                    {
                        return e.into();
                    }
                }
            }
        }
    } else {
        debug!(
            version = version.version,
            attempt = attempt.attempt,
            elapsed,
            "attempt is contended but live; failing without fencing"
        );
    }

    CommitError::ConcurrentCommit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{resolve_attempt, resolve_version};
    use std::sync::Arc;
    use tidelock_core::{ManualClock, MemoryStorage, StorageRead, StorageWrite};

    fn entry(name: &str, mtime: i64) -> FileEntry {
        FileEntry::new(name, mtime)
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[]), AttemptState::Empty);
    }

    #[test]
    fn test_classify_groups_pairs_and_excludes_expired() {
        let state = classify(&[
            entry("PRE_COMMIT-u1.txt", 10),
            entry("u1.txt", 20),
            entry("PRE_COMMIT-u2.txt", 30),
            entry("EXPIRED-HINT.TXT", 40),
        ]);
        let AttemptState::InFlight {
            groups,
            latest_mtime,
        } = state
        else {
            panic!("expected InFlight");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["u1"], 2);
        assert_eq!(groups["u2"], 1);
        // The fencing marker still counts toward recency.
        assert_eq!(latest_mtime, 40);
    }

    struct Fixture {
        storage: MemoryStorage,
        layout: CatalogLayout,
        clock: Arc<ManualClock>,
        config: CommitterConfig,
    }

    async fn fixture() -> (Fixture, ResolvedVersion, ResolvedAttempt) {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = MemoryStorage::with_clock(clock.clone());
        let layout = CatalogLayout::new("root");
        let version = resolve_version(&storage, &layout).await.unwrap();
        let attempt = resolve_attempt(&storage, &layout, &version).await.unwrap();
        let fx = Fixture {
            storage,
            layout,
            clock,
            config: CommitterConfig::default(),
        };
        (fx, version, attempt)
    }

    #[tokio::test]
    async fn test_two_singleton_groups_fence_immediately() {
        let (fx, version, attempt) = fixture().await;
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 1);
        groups.insert("u2".to_string(), 1);

        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            1_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        // Fenced without waiting for the TTL.
        assert!(fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_live_singleton_fails_without_fencing() {
        let (fx, version, attempt) = fixture().await;
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 1);

        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            1_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        assert!(!fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
        assert!(!fx
            .storage
            .exists("root/commit/0/sub-hint/COMMIT-HINT.TXT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_pair_recovers_publication() {
        let (fx, version, attempt) = fixture().await;
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 2);
        fx.clock.set(1_000 + fx.config.ttl_pre_commit_ms + 1);

        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            1_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        assert_eq!(
            fx.storage
                .content("root/commit/0/sub-hint/COMMIT-HINT.TXT")
                .unwrap(),
            "u1@0"
        );
        assert_eq!(
            fx.storage.content("root/commit/0/sub-hint/u1.txt").unwrap(),
            "u1"
        );
        assert!(!fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_singleton_fences() {
        let (fx, version, attempt) = fixture().await;
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 1);
        fx.clock.set(1_000 + fx.config.ttl_pre_commit_ms + 1);

        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            1_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        assert!(fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_pair_with_existing_hint_left_alone() {
        let (fx, version, attempt) = fixture().await;
        fx.storage
            .write_without_guarantees("root/commit/0/sub-hint/COMMIT-HINT.TXT", "u9@0")
            .await
            .unwrap();
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 2);
        fx.clock.set(1_000 + fx.config.ttl_pre_commit_ms + 1);

        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            1_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        // The published hint is never rewritten.
        assert_eq!(
            fx.storage
                .content("root/commit/0/sub-hint/COMMIT-HINT.TXT")
                .unwrap(),
            "u9@0"
        );
        assert!(!fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mtime_ahead_of_clock_is_not_stale() {
        let (fx, version, attempt) = fixture().await;
        let mut groups = BTreeMap::new();
        groups.insert("u1".to_string(), 2);
        // Backend stamped the debris far in our future.
        let err = adjudicate(
            &fx.storage,
            &fx.layout,
            &fx.config,
            fx.clock.as_ref(),
            &version,
            &attempt,
            &groups,
            fx.clock.now_millis() + 3_600_000,
        )
        .await;
        assert!(matches!(err, CommitError::ConcurrentCommit));
        assert!(!fx
            .storage
            .exists("root/commit/0/sub-hint/COMMIT-HINT.TXT")
            .await
            .unwrap());
        assert!(!fx
            .storage
            .exists("root/commit/0/0/EXPIRED-HINT.TXT")
            .await
            .unwrap());
    }
}
