//! Catalog tree layout and filename conventions
//!
//! Defines the directory structure and path derivation for the coordinator's
//! three subtrees under a root path. This struct is stateless — it only
//! computes paths, never performs I/O.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── tracker/<V>.txt                     # version sentinel, body "<V>"
//! ├── archive/<V>.txt@<expireMillis>      # tombstone, body "<expireMillis>"
//! └── commit/<V>/
//!     ├── sub-tracker/<S>.txt             # attempt sentinel, body "<S>"
//!     ├── sub-hint/COMMIT-HINT.TXT        # publication marker, body "<U>@<S>"
//!     ├── sub-hint/<U>.txt                # debug witness, body "<U>"
//!     └── <S>/
//!         ├── PRE_COMMIT-<U>.txt          # phase-one marker
//!         ├── <U>.txt                     # phase-two marker
//!         └── EXPIRED-HINT.TXT            # fencing marker, body "EXPIRED!"
//! ```
//!
//! `<V>` and `<S>` are unpadded decimal integers; filenames, not bodies,
//! carry protocol meaning.

use crate::client_id::ClientId;
use crate::error::{CommitError, Result};

/// Publication marker filename. Its presence makes a version visible.
pub const COMMIT_HINT: &str = "COMMIT-HINT.TXT";

/// Fencing marker filename. Its presence kills an attempt.
pub const EXPIRED_HINT: &str = "EXPIRED-HINT.TXT";

/// Prefix of a phase-one marker file.
pub const PRE_COMMIT_PREFIX: &str = "PRE_COMMIT-";

/// Body written into fencing markers.
pub(crate) const EXPIRED_BODY: &str = "EXPIRED!";

/// Deterministic path generator for the catalog tree.
#[derive(Debug, Clone)]
pub struct CatalogLayout {
    root: String,
}

impl CatalogLayout {
    /// Create a layout rooted at the given path (trailing `/` tolerated).
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// The root path this layout was built from.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// `<root>/tracker`
    pub fn tracker_dir(&self) -> String {
        format!("{}/tracker", self.root)
    }

    /// `<root>/commit`
    pub fn commit_root(&self) -> String {
        format!("{}/commit", self.root)
    }

    /// `<root>/archive`
    pub fn archive_dir(&self) -> String {
        format!("{}/archive", self.root)
    }

    /// `<root>/tracker/<V>.txt`
    pub fn tracker_file(&self, version: u64) -> String {
        format!("{}/tracker/{}.txt", self.root, version)
    }

    /// `<root>/commit/<V>`
    pub fn version_dir(&self, version: u64) -> String {
        format!("{}/commit/{}", self.root, version)
    }

    /// `<root>/commit/<V>/sub-tracker`
    pub fn sub_tracker_dir(&self, version: u64) -> String {
        format!("{}/commit/{}/sub-tracker", self.root, version)
    }

    /// `<root>/commit/<V>/sub-hint`
    pub fn sub_hint_dir(&self, version: u64) -> String {
        format!("{}/commit/{}/sub-hint", self.root, version)
    }

    /// `<root>/commit/<V>/sub-hint/COMMIT-HINT.TXT`
    pub fn commit_hint_file(&self, version: u64) -> String {
        format!("{}/commit/{}/sub-hint/{}", self.root, version, COMMIT_HINT)
    }

    /// `<root>/commit/<V>/sub-hint/<U>.txt` — debug witness. At most one per
    /// version in a correct history.
    pub fn witness_file(&self, version: u64, client: &str) -> String {
        format!("{}/commit/{}/sub-hint/{}.txt", self.root, version, client)
    }

    /// `<root>/commit/<V>/sub-tracker/<S>.txt`
    pub fn attempt_tracker_file(&self, version: u64, attempt: u64) -> String {
        format!(
            "{}/commit/{}/sub-tracker/{}.txt",
            self.root, version, attempt
        )
    }

    /// `<root>/commit/<V>/<S>`
    pub fn attempt_dir(&self, version: u64, attempt: u64) -> String {
        format!("{}/commit/{}/{}", self.root, version, attempt)
    }

    /// `<root>/commit/<V>/<S>/EXPIRED-HINT.TXT`
    pub fn expired_hint_file(&self, version: u64, attempt: u64) -> String {
        format!("{}/commit/{}/{}/{}", self.root, version, attempt, EXPIRED_HINT)
    }

    /// `<root>/commit/<V>/<S>/PRE_COMMIT-<U>.txt`
    pub fn pre_commit_file(&self, version: u64, attempt: u64, client: &ClientId) -> String {
        format!(
            "{}/commit/{}/{}/{}",
            self.root,
            version,
            attempt,
            pre_commit_name(client)
        )
    }

    /// `<root>/commit/<V>/<S>/<U>.txt`
    pub fn commit_file(&self, version: u64, attempt: u64, client: &ClientId) -> String {
        format!(
            "{}/commit/{}/{}/{}",
            self.root,
            version,
            attempt,
            commit_name(client)
        )
    }

    /// `<root>/archive/<name>` for a tombstone filename.
    pub fn archive_file(&self, tombstone_name: &str) -> String {
        format!("{}/archive/{}", self.root, tombstone_name)
    }
}

/// Phase-one marker filename for a client.
pub(crate) fn pre_commit_name(client: &ClientId) -> String {
    format!("{}{}.txt", PRE_COMMIT_PREFIX, client)
}

/// Phase-two marker filename for a client.
pub(crate) fn commit_name(client: &ClientId) -> String {
    format!("{}.txt", client)
}

/// COMMIT-HINT body naming the winning client and attempt.
pub(crate) fn hint_body(client: &str, attempt: u64) -> String {
    format!("{}@{}", client, attempt)
}

/// Tombstone filename scheduling a tracker for deletion at `expire_at`.
///
/// The expiration rides in the name so GC never has to read the body.
pub(crate) fn tombstone_name(tracker_file_name: &str, expire_at: i64) -> String {
    format!("{}@{}", tracker_file_name, expire_at)
}

/// Client key of a commit-file name: `PRE_COMMIT-<U>.txt` and `<U>.txt` both
/// map to `<U>`, grouping a client's pair together.
pub(crate) fn client_key(file_name: &str) -> &str {
    let stem = file_name
        .strip_prefix(PRE_COMMIT_PREFIX)
        .unwrap_or(file_name);
    stem.strip_suffix(".txt").unwrap_or(stem)
}

/// Parse the integer stem of a sentinel filename (`"7.txt"` → 7).
pub(crate) fn version_stem(file_name: &str) -> Result<u64> {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.parse::<u64>().map_err(|_| {
        CommitError::corrupt(format!(
            "expected integer-stemmed filename, found '{}'",
            file_name
        ))
    })
}

/// Parse a tombstone filename (`"7.txt@1700000000000"` → `(7, 1700000000000)`).
pub(crate) fn parse_tombstone(file_name: &str) -> Result<(u64, i64)> {
    let (stem, expire) = file_name.split_once('@').ok_or_else(|| {
        CommitError::corrupt(format!(
            "archive entry '{}' is missing its '@<expire>' suffix",
            file_name
        ))
    })?;
    let version = version_stem(stem)?;
    let expire_at = expire.parse::<i64>().map_err(|_| {
        CommitError::corrupt(format!(
            "archive entry '{}' has a non-numeric expiration",
            file_name
        ))
    })?;
    Ok((version, expire_at))
}
