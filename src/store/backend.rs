//! Backend trait for versioned bucket storage.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was committed at the new version.
    Committed,
    /// Another writer changed the record since it was loaded.
    VersionConflict,
}

/// A versioned record as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    /// Opaque payload bytes.
    pub bytes: Vec<u8>,
    /// The version the payload was written at.
    pub version: u64,
}

/// Key-value storage with atomic conditional writes and key expiry.
///
/// This is the crate's only outbound dependency. Any store offering a
/// compare-and-swap primitive qualifies; it does not need to understand the
/// payload. Version `0` is reserved to mean "not yet persisted": a
/// conditional write with `expected_version == 0` must succeed only if the
/// key is absent.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Load the record for a key. Absent and expired keys both read as
    /// `None`.
    async fn load(&self, key: &str) -> Result<Option<VersionedRecord>>;

    /// Write `bytes` at `new_version` if and only if the stored version
    /// still equals `expected_version`. Every committed write refreshes the
    /// record's TTL.
    async fn compare_and_swap(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected_version: u64,
        new_version: u64,
        ttl: Duration,
    ) -> Result<CasOutcome>;

    /// Remove a key unconditionally.
    async fn remove(&self, key: &str) -> Result<()>;
}
