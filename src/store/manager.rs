//! The atomicity boundary: resolve a key to a bucket, apply the token math,
//! and commit the transition with compare-and-swap semantics.
//!
//! Every operation is load, pure compute, conditional write. The backend is
//! the single source of truth; the in-process state is a disposable snapshot
//! loaded fresh for each attempt, which eliminates in-process data races by
//! construction. Concurrent writers, in this process or another one sharing
//! the backend, are serialized only by the version check.

use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use crate::bucket::{Bucket, BucketConfiguration, BucketState, Decision};
use crate::config::{CorruptStatePolicy, StoreSettings};
use crate::error::{Result, TollgateError};

use super::backend::{CasOutcome, StoreBackend};

/// Resolves keys to buckets and persists state transitions against a shared
/// backend.
pub struct BucketStore<B: StoreBackend> {
    backend: B,
    settings: StoreSettings,
}

impl<B: StoreBackend> BucketStore<B> {
    /// Create a store with default settings.
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, StoreSettings::default())
    }

    /// Create a store with explicit settings.
    pub fn with_settings(backend: B, settings: StoreSettings) -> Self {
        Self { backend, settings }
    }

    /// Direct access to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume `cost` tokens from the bucket identified by `key`.
    ///
    /// The bucket is created lazily on first use. A denial never mutates
    /// stored state; a grant is committed only if no concurrent writer
    /// touched the key since it was loaded, retrying on conflict within the
    /// configured budget. An exhausted budget surfaces as
    /// [`TollgateError::StoreContention`], which is transient and distinct
    /// from a rate-limit denial — retrying the whole call is safe.
    pub async fn consume(
        &self,
        key: &str,
        config: &BucketConfiguration,
        cost: u64,
    ) -> Result<Decision> {
        if cost == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "consume cost must be greater than zero".to_string(),
            ));
        }

        let ttl = self.ttl_for(config);
        let bucket = Bucket::new(config);

        for attempt in 1..=self.settings.cas_retry_budget {
            let now_ms = epoch_millis();
            let (state, version) = self.load_state(key, config, now_ms).await?;

            let (decision, new_state) = bucket.try_consume(&state, now_ms, cost);

            if !decision.allowed {
                // Nothing changed that a later read cannot recompute from
                // the stored timestamps, so skip the write entirely.
                trace!(key, cost, "Denied without write");
                return Ok(decision);
            }

            let bytes = new_state
                .to_bytes()
                .map_err(|e| TollgateError::CorruptState(format!("{}: {}", key, e)))?;

            match self
                .backend
                .compare_and_swap(key, bytes, version, version + 1, ttl)
                .await?
            {
                CasOutcome::Committed => {
                    trace!(key, cost, version = version + 1, "Committed consumption");
                    return Ok(decision);
                }
                CasOutcome::VersionConflict => {
                    debug!(key, attempt, "Concurrent writer updated bucket, retrying");
                    self.backoff().await;
                }
            }
        }

        warn!(
            key,
            attempts = self.settings.cas_retry_budget,
            "Compare-and-swap retry budget exhausted"
        );
        Err(TollgateError::StoreContention {
            key: key.to_string(),
            attempts: self.settings.cas_retry_budget,
        })
    }

    /// Consume a single token, the common case.
    pub async fn consume_one(&self, key: &str, config: &BucketConfiguration) -> Result<Decision> {
        self.consume(key, config, 1).await
    }

    /// Drop all state for a key. The next consume behaves as first use.
    pub async fn reset(&self, key: &str) -> Result<()> {
        debug!(key, "Resetting bucket");
        self.backend.remove(key).await
    }

    async fn load_state(
        &self,
        key: &str,
        config: &BucketConfiguration,
        now_ms: u64,
    ) -> Result<(BucketState, u64)> {
        match self.backend.load(key).await? {
            Some(record) => match BucketState::from_bytes(&record.bytes) {
                Ok(state) if state.matches(config) => Ok((state, record.version)),
                Ok(_) => {
                    // The configuration changed shape under this key; the
                    // old slots are meaningless. Start fresh, still fenced
                    // by the stored version.
                    debug!(key, "Stored state does not match configuration, reinitializing");
                    Ok((BucketState::initial(config, now_ms), record.version))
                }
                Err(e) => match self.settings.corrupt_state_policy {
                    CorruptStatePolicy::Recreate => {
                        warn!(key, error = %e, "Discarding corrupt bucket state");
                        Ok((BucketState::initial(config, now_ms), record.version))
                    }
                    CorruptStatePolicy::Reject => {
                        Err(TollgateError::CorruptState(key.to_string()))
                    }
                },
            },
            None => Ok((BucketState::initial(config, now_ms), 0)),
        }
    }

    /// TTL for a record: long enough that an active bucket is never evicted
    /// mid-use, short enough that idle buckets are reclaimed. An idle bucket
    /// older than its slowest full refill holds no information a fresh one
    /// would not.
    fn ttl_for(&self, config: &BucketConfiguration) -> Duration {
        config.slowest_full_refill() * self.settings.ttl_margin.max(1)
    }

    async fn backoff(&self) {
        let millis = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.settings.backoff_min_ms..=self.settings.backoff_max_ms)
        };
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
