//! # Tidelock Commit
//!
//! Optimistic, file-system-based commit coordination for a versioned
//! catalog.
//!
//! Multiple independent clients publish new catalog versions concurrently by
//! writing files into a shared storage substrate. For any version number at
//! most one client's commit becomes durable and visible; every other client
//! observably fails with [`CommitError::ConcurrentCommit`] and retries at
//! the next version. There is no lock service, no leader, and no shared
//! memory — coordination happens purely through filenames.
//!
//! ## Protocol sketch
//!
//! 1. **Resolve** the target version from `tracker/` sentinels, rolling
//!    forward once past a version already sealed by a COMMIT-HINT, then the
//!    current attempt from `sub-tracker/`, rolling once past a fenced
//!    attempt.
//! 2. **Adjudicate** a non-empty attempt workspace: recover a crashed
//!    finisher's publication, fence stale debris with an EXPIRED marker, or
//!    fail and let the caller retry.
//! 3. **Two-phase commit**: write a `PRE_COMMIT-<U>.txt` marker, check for
//!    peers; write `<U>.txt`, check again; only a client that saw no peer at
//!    either checkpoint publishes the COMMIT-HINT.
//! 4. **Retire**: archive aged tracker sentinels as expiring tombstones and
//!    garbage-collect workspaces whose tombstones have lapsed.
//!
//! The read path is not implemented here. A reader should take the maximum
//! tracker version, step back one version if its COMMIT-HINT is absent, and
//! treat a second miss as corruption.
//!
//! ## Safety requirements on storage
//!
//! Safe on any backend giving read-your-writes, monotonic listing, and
//! collision-free filenames (see `tidelock-core`). Write atomicity is NOT
//! required: filenames, never contents, carry protocol meaning.

mod adjudicate;
mod client_id;
mod committer;
mod config;
mod error;
mod layout;
mod resolve;
mod retention;

pub use client_id::ClientId;
pub use committer::{CommitOutcome, CommitStrategy, FileCommitter};
pub use config::CommitterConfig;
pub use error::{CommitError, Result};
pub use layout::{CatalogLayout, COMMIT_HINT, EXPIRED_HINT, PRE_COMMIT_PREFIX};
