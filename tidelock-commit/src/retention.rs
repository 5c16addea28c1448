//! Tracker archival and commit-workspace garbage collection
//!
//! Retirement is folded into the commit protocol so no single successful
//! writer is responsible for cleanup: every publishing client archives aged
//! tracker sentinels and collects a bounded number of expired workspaces.
//! Both passes are idempotent; failures are left for the next client's run
//! to re-observe.

use crate::config::CommitterConfig;
use crate::error::Result;
use crate::layout::{parse_tombstone, tombstone_name, version_stem, CatalogLayout};
use tidelock_core::{Clock, FileEntry, Storage};
use tracing::debug;

/// Migrate tracker sentinels older than `max_save` versions below current
/// into `archive/` tombstones, stamping each with an expiration.
///
/// Concurrent archivers may mint different-expiration tombstones for the
/// same version; that at worst delays cleanup.
pub(crate) async fn archive_old_trackers<S: Storage + ?Sized>(
    storage: &S,
    layout: &CatalogLayout,
    config: &CommitterConfig,
    clock: &dyn Clock,
    trackers: &[FileEntry],
    current_version: u64,
) -> Result<()> {
    for tracker in trackers {
        let version = version_stem(&tracker.file_name)?;
        if current_version.saturating_sub(version) <= config.max_save {
            continue;
        }

        let expire_at = clock.now_millis() + config.clean_ttl_ms;
        let tombstone = layout.archive_file(&tombstone_name(&tracker.file_name, expire_at));
        if !storage.exists(&tombstone).await? {
            storage
                .write_without_guarantees(&tombstone, &expire_at.to_string())
                .await?;
        }
        storage.delete(&layout.tracker_file(version), false).await?;
        debug!(version, expire_at, "archived aged tracker sentinel");
    }
    Ok(())
}

/// Delete commit workspaces whose tombstones have expired, oldest versions
/// first.
///
/// Examines one tombstone per call, switching to batches of
/// `archive_batch_clean_max_size` once the archive holds more than
/// `max_archive_size` entries so deletion keeps up with write pressure.
pub(crate) async fn clean_expired_commits<S: Storage + ?Sized>(
    storage: &S,
    layout: &CatalogLayout,
    config: &CommitterConfig,
    clock: &dyn Clock,
) -> Result<()> {
    let mut tombstones = Vec::new();
    for entry in storage.list_files(&layout.archive_dir(), false).await? {
        let (version, expire_at) = parse_tombstone(&entry.file_name)?;
        tombstones.push((version, expire_at, entry.file_name));
    }
    tombstones.sort_by_key(|(version, ..)| *version);

    let batch = if tombstones.len() > config.max_archive_size {
        config.archive_batch_clean_max_size.min(tombstones.len())
    } else {
        tombstones.len().min(1)
    };

    let now = clock.now_millis();
    for (version, expire_at, name) in tombstones.into_iter().take(batch) {
        if now > expire_at {
            storage.delete(&layout.version_dir(version), true).await?;
            storage.delete(&layout.archive_file(&name), false).await?;
            debug!(version, "collected expired commit workspace");
        }
    }
    Ok(())
}
