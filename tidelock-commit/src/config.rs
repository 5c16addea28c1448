//! Committer configuration
//!
//! All knobs are liveness/retention tuning only; safety of the protocol does
//! not depend on any of them.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the commit coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterConfig {
    /// How many versions below current stay in `tracker/` before the
    /// archiver migrates them.
    #[serde(default = "default_max_save")]
    pub max_save: u64,

    /// Archive size above which GC switches to batch mode.
    #[serde(default = "default_max_archive_size")]
    pub max_archive_size: usize,

    /// Tombstones examined per GC call in batch mode.
    #[serde(default = "default_archive_batch_clean_max_size")]
    pub archive_batch_clean_max_size: usize,

    /// Staleness threshold for adjudicating abandoned attempts (ms).
    #[serde(default = "default_ttl_pre_commit_ms")]
    pub ttl_pre_commit_ms: i64,

    /// Lifetime of an archive tombstone before GC may delete its commit
    /// subtree (ms).
    #[serde(default = "default_clean_ttl_ms")]
    pub clean_ttl_ms: i64,
}

fn default_max_save() -> u64 {
    2
}

fn default_max_archive_size() -> usize {
    100
}

fn default_archive_batch_clean_max_size() -> usize {
    20
}

fn default_ttl_pre_commit_ms() -> i64 {
    30_000
}

fn default_clean_ttl_ms() -> i64 {
    600_000
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            max_save: default_max_save(),
            max_archive_size: default_max_archive_size(),
            archive_batch_clean_max_size: default_archive_batch_clean_max_size(),
            ttl_pre_commit_ms: default_ttl_pre_commit_ms(),
            clean_ttl_ms: default_clean_ttl_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CommitterConfig::default();
        assert_eq!(config.max_save, 2);
        assert_eq!(config.max_archive_size, 100);
        assert_eq!(config.archive_batch_clean_max_size, 20);
        assert_eq!(config.ttl_pre_commit_ms, 30_000);
        assert_eq!(config.clean_ttl_ms, 600_000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CommitterConfig = serde_json::from_str(r#"{"max_save": 5}"#).unwrap();
        assert_eq!(config.max_save, 5);
        assert_eq!(config.ttl_pre_commit_ms, 30_000);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = CommitterConfig {
            max_save: 1,
            max_archive_size: 10,
            archive_batch_clean_max_size: 4,
            ttl_pre_commit_ms: 1_000,
            clean_ttl_ms: 2_000,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CommitterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
