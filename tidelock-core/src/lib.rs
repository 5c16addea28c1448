//! # Tidelock Core
//!
//! Storage driver contract for the tidelock commit coordinator.
//!
//! This crate provides:
//! - The narrow storage traits the commit protocol consumes
//!   ([`StorageRead`], [`StorageWrite`], [`Storage`])
//! - Built-in backends: [`MemoryStorage`] (tests) and [`FileStorage`]
//!   (local filesystem)
//! - The millisecond [`Clock`] abstraction used for mtime stamping and
//!   staleness decisions
//!
//! Any backend meeting the ordering requirements documented on the storage
//! traits (read-your-writes, monotonic listing, no silent rename) can drive
//! the coordinator: local POSIX filesystems, HDFS, or object stores with
//! strongly-consistent listing.

pub mod clock;
pub mod error;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use storage::{FileEntry, FileStorage, MemoryStorage, Storage, StorageRead, StorageWrite};
