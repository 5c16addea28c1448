//! Per-invocation client identifiers
//!
//! Each commit attempt generates a fresh id; two retries by the same process
//! use distinct ids. Ids must be unique across hosts with overwhelming
//! probability — a clash would silently corrupt contention adjudication — so
//! generation uses UUID v4.

use crate::error::{CommitError, Result};
use crate::layout::{COMMIT_HINT, EXPIRED_HINT, PRE_COMMIT_PREFIX};
use std::fmt;
use uuid::Uuid;

/// Unique id of one commit invocation.
///
/// The id appears as the stem of the client's file pair
/// (`PRE_COMMIT-<id>.txt` / `<id>.txt`) and in the COMMIT-HINT body, so the
/// constructor rejects anything that would collide with protocol filenames:
/// a `PRE_COMMIT-` prefix, an `@`, a path separator, or a reserved marker
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh id (UUID v4, simple format).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate an externally supplied id (e.g. recovered from a filename).
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(CommitError::corrupt("client id must not be empty"));
        }
        if s.starts_with(PRE_COMMIT_PREFIX) {
            return Err(CommitError::corrupt(format!(
                "client id '{}' must not start with '{}'",
                s, PRE_COMMIT_PREFIX
            )));
        }
        if s.contains('@') || s.contains('/') {
            return Err(CommitError::corrupt(format!(
                "client id '{}' must not contain '@' or '/'",
                s
            )));
        }
        if s == COMMIT_HINT || s == EXPIRED_HINT {
            return Err(CommitError::corrupt(format!(
                "client id '{}' is a reserved marker name",
                s
            )));
        }
        Ok(Self(s))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_ids_pass_validation() {
        let id = ClientId::generate();
        assert!(ClientId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_protocol_collisions() {
        assert!(ClientId::parse("").is_err());
        assert!(ClientId::parse("PRE_COMMIT-abc").is_err());
        assert!(ClientId::parse("a@b").is_err());
        assert!(ClientId::parse("a/b").is_err());
        assert!(ClientId::parse("COMMIT-HINT.TXT").is_err());
        assert!(ClientId::parse("EXPIRED-HINT.TXT").is_err());
        assert!(ClientId::parse("u1").is_ok());
    }
}
