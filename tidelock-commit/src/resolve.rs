//! Version and attempt resolution
//!
//! The tracker is a hint, not a source of truth: the authoritative proof
//! that a version is published is its COMMIT-HINT, and a tracker may lag
//! behind reality because sentinel writes carry no atomicity guarantee. Both
//! resolvers therefore reconcile with a single roll-forward step — never
//! more, never a loop.

use crate::error::Result;
use crate::layout::{version_stem, CatalogLayout};
use tidelock_core::{FileEntry, Storage};
use tracing::debug;

/// Target version and its derived paths.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedVersion {
    pub version: u64,
    pub tracker_file: String,
    pub version_dir: String,
    pub sub_tracker_dir: String,
    pub sub_hint_dir: String,
    pub commit_hint_file: String,
}

impl ResolvedVersion {
    fn derive(layout: &CatalogLayout, version: u64) -> Self {
        Self {
            version,
            tracker_file: layout.tracker_file(version),
            version_dir: layout.version_dir(version),
            sub_tracker_dir: layout.sub_tracker_dir(version),
            sub_hint_dir: layout.sub_hint_dir(version),
            commit_hint_file: layout.commit_hint_file(version),
        }
    }
}

/// Current attempt under one version, and its derived paths.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedAttempt {
    pub attempt: u64,
    pub attempt_dir: String,
    pub expired_hint_file: String,
}

/// Largest integer stem across a listing, or 0 when empty.
fn max_stem(entries: &[FileEntry]) -> Result<u64> {
    let mut max = 0;
    for entry in entries {
        max = max.max(version_stem(&entry.file_name)?);
    }
    Ok(max)
}

/// Pick the target version: max tracker sentinel, rolled forward once if
/// that version is already sealed by a COMMIT-HINT. Ensures the version's
/// workspace directories and tracker sentinel exist on return.
pub(crate) async fn resolve_version<S: Storage + ?Sized>(
    storage: &S,
    layout: &CatalogLayout,
) -> Result<ResolvedVersion> {
    storage.create_dir(&layout.tracker_dir()).await?;
    storage.create_dir(&layout.commit_root()).await?;
    storage.create_dir(&layout.archive_dir()).await?;

    let trackers = storage.list_files(&layout.tracker_dir(), false).await?;
    let mut version = max_stem(&trackers)?;
    let mut resolved = ResolvedVersion::derive(layout, version);

    if storage.exists(&resolved.commit_hint_file).await? {
        // Sealed; the tracker for version+1 may simply not exist yet.
        version += 1;
        debug!(version, "tracker lags a published version; rolling forward");
        resolved = ResolvedVersion::derive(layout, version);
    }

    if !storage.exists(&resolved.tracker_file).await? {
        storage
            .write_without_guarantees(&resolved.tracker_file, &version.to_string())
            .await?;
    }

    storage.create_dir(&resolved.version_dir).await?;
    storage.create_dir(&resolved.sub_tracker_dir).await?;
    storage.create_dir(&resolved.sub_hint_dir).await?;

    Ok(resolved)
}

/// Pick the current attempt under a resolved version: max attempt sentinel,
/// rolled forward once if that attempt is fenced by an EXPIRED marker.
/// Ensures the attempt workspace and its sentinel exist on return.
pub(crate) async fn resolve_attempt<S: Storage + ?Sized>(
    storage: &S,
    layout: &CatalogLayout,
    version: &ResolvedVersion,
) -> Result<ResolvedAttempt> {
    let sub_trackers = storage.list_files(&version.sub_tracker_dir, false).await?;
    let mut attempt = max_stem(&sub_trackers)?;
    let mut expired_hint_file = layout.expired_hint_file(version.version, attempt);

    if storage.exists(&expired_hint_file).await? {
        attempt += 1;
        debug!(
            version = version.version,
            attempt, "previous attempt is fenced; rolling forward"
        );
        expired_hint_file = layout.expired_hint_file(version.version, attempt);
    }

    let attempt_tracker = layout.attempt_tracker_file(version.version, attempt);
    if !storage.exists(&attempt_tracker).await? {
        storage
            .write_without_guarantees(&attempt_tracker, &attempt.to_string())
            .await?;
    }

    let attempt_dir = layout.attempt_dir(version.version, attempt);
    storage.create_dir(&attempt_dir).await?;

    Ok(ResolvedAttempt {
        attempt,
        attempt_dir,
        expired_hint_file,
    })
}
