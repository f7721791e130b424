//! Redis store backend.
//!
//! Bucket records live in a Redis hash per key: a `version` field for the
//! optimistic-concurrency token and a `state` field for the encoded bucket
//! state. The conditional write runs as a server-side script so the
//! version check and the write are a single atomic step, which is what lets
//! independent service instances share one set of buckets safely.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{Result, TollgateError};

use super::backend::{CasOutcome, StoreBackend, VersionedRecord};

/// Compare-and-swap over the bucket hash.
///
/// KEYS[1] = bucket key
/// ARGV[1] = expected version ("0" when the key must be absent)
/// ARGV[2] = new version
/// ARGV[3] = encoded bucket state
/// ARGV[4] = TTL in milliseconds
///
/// Returns 1 on commit, 0 on version conflict.
const CAS_SCRIPT: &str = r#"
local version = redis.call('HGET', KEYS[1], 'version')
if version == false then
    version = '0'
end
if version ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[2], 'state', ARGV[3])
redis.call('PEXPIRE', KEYS[1], ARGV[4])
return 1
"#;

/// A Redis-backed store shared by every service instance pointed at the
/// same server.
pub struct RedisStore {
    connection: ConnectionManager,
    cas: Script,
}

impl RedisStore {
    /// Connect to a Redis server.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        debug!(url = %redis_url, "Connecting to Redis store");
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            cas: Script::new(CAS_SCRIPT),
        })
    }

    /// Round-trip check against the server.
    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn load(&self, key: &str) -> Result<Option<VersionedRecord>> {
        let mut connection = self.connection.clone();
        let (version, state): (Option<String>, Option<Vec<u8>>) = redis::cmd("HMGET")
            .arg(key)
            .arg("version")
            .arg("state")
            .query_async(&mut connection)
            .await?;

        match (version, state) {
            (Some(version), Some(bytes)) => {
                let version = version.parse::<u64>().map_err(|_| {
                    TollgateError::CorruptState(format!("{}: non-numeric version", key))
                })?;
                Ok(Some(VersionedRecord { bytes, version }))
            }
            _ => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected_version: u64,
        new_version: u64,
        ttl: Duration,
    ) -> Result<CasOutcome> {
        let mut connection = self.connection.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let committed: i64 = self
            .cas
            .key(key)
            .arg(expected_version)
            .arg(new_version)
            .arg(&bytes)
            .arg(ttl_ms)
            .invoke_async(&mut connection)
            .await?;

        if committed == 1 {
            trace!(key, new_version, "Committed bucket state");
            Ok(CasOutcome::Committed)
        } else {
            Ok(CasOutcome::VersionConflict)
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut connection).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance.
    // Run with: cargo test -- --ignored

    async fn connect() -> RedisStore {
        RedisStore::connect("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis")
    }

    fn unique_key(prefix: &str) -> String {
        format!("tollgate:test:{}:{}", prefix, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_ping() {
        let store = connect().await;
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_create_load_round_trip() {
        let store = connect().await;
        let key = unique_key("roundtrip");

        assert_eq!(store.load(&key).await.unwrap(), None);

        let outcome = store
            .compare_and_swap(&key, b"payload".to_vec(), 0, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Committed);

        let record = store.load(&key).await.unwrap().unwrap();
        assert_eq!(record.bytes, b"payload");
        assert_eq!(record.version, 1);

        store.remove(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_version_conflict() {
        let store = connect().await;
        let key = unique_key("conflict");

        store
            .compare_and_swap(&key, b"v1".to_vec(), 0, 1, Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = store
            .compare_and_swap(&key, b"stale".to_vec(), 0, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::VersionConflict);

        let record = store.load(&key).await.unwrap().unwrap();
        assert_eq!(record.bytes, b"v1");

        store.remove(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_ttl_expiry() {
        let store = connect().await;
        let key = unique_key("expiry");

        store
            .compare_and_swap(&key, b"v1".to_vec(), 0, 1, Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.load(&key).await.unwrap(), None);
    }
}
