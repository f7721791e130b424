//! In-process store backend.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

use crate::error::Result;

use super::backend::{CasOutcome, StoreBackend, VersionedRecord};

#[derive(Debug)]
struct StoredEntry {
    bytes: Vec<u8>,
    version: u64,
    expires_at_ms: u64,
}

/// An in-process backend backed by a concurrent map.
///
/// Suitable for single-instance deployments and as the test substrate.
/// Expired entries are reclaimed lazily on access; the map's per-key locking
/// makes the conditional write atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (unexpired) record exists for the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.expires_at_ms > now_millis())
            .unwrap_or(false)
    }

    /// Number of records, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<VersionedRecord>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at_ms <= now_millis() {
                drop(entry);
                self.entries.remove(key);
                trace!(key, "Reclaimed expired record on load");
                return Ok(None);
            }
            return Ok(Some(VersionedRecord {
                bytes: entry.bytes.clone(),
                version: entry.version,
            }));
        }
        Ok(None)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected_version: u64,
        new_version: u64,
        ttl: Duration,
    ) -> Result<CasOutcome> {
        let now = now_millis();
        let expires_at_ms = now + ttl.as_millis() as u64;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                // An expired record reads as absent, so it swaps like one.
                let current_version = if occupied.get().expires_at_ms > now {
                    occupied.get().version
                } else {
                    0
                };
                if current_version != expected_version {
                    return Ok(CasOutcome::VersionConflict);
                }
                occupied.insert(StoredEntry {
                    bytes,
                    version: new_version,
                    expires_at_ms,
                });
                Ok(CasOutcome::Committed)
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(CasOutcome::VersionConflict);
                }
                vacant.insert(StoredEntry {
                    bytes,
                    version: new_version,
                    expires_at_ms,
                });
                Ok(CasOutcome::Committed)
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
