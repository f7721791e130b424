//! Mutable per-key bucket state and its wire encoding.

use serde::{Deserialize, Serialize};

use super::bandwidth::BucketConfiguration;

/// The numeric state of one bucket: current token counts and last-refill
/// marks, one slot per configured bandwidth, in configuration order.
///
/// State is created lazily on the first consume call for a key, mutated on
/// every allowed consume, and reclaimed by the backend's TTL once idle. It is
/// owned exclusively by the store layer; callers only ever see decisions
/// computed from a privately loaded copy, never a live handle.
///
/// The wire format is the serde encoding of this struct: token counts are
/// exact integers and timestamps are epoch milliseconds, both of which
/// round-trip losslessly. Refill math is sensitive to rounding, so nothing
/// here may pass through a float. The optimistic-concurrency version travels
/// next to the payload in the backend record, not inside the state itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub(crate) tokens: Vec<u64>,
    pub(crate) last_refill_at: Vec<u64>,
}

impl BucketState {
    /// Synthesize the state of a bucket that has never been written:
    /// each bandwidth starts at its initial token count, refill marks at now.
    pub fn initial(config: &BucketConfiguration, now_ms: u64) -> Self {
        let bandwidths = config.bandwidths();
        Self {
            tokens: bandwidths.iter().map(|b| b.initial_tokens()).collect(),
            last_refill_at: vec![now_ms; bandwidths.len()],
        }
    }

    /// Whether this state has one slot per bandwidth of `config`.
    ///
    /// A mismatch means the configuration changed shape since the state was
    /// written; the store treats such records as absent.
    pub fn matches(&self, config: &BucketConfiguration) -> bool {
        let n = config.bandwidths().len();
        self.tokens.len() == n && self.last_refill_at.len() == n
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode from storage.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
