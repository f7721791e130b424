//! Bandwidth definitions: one capacity-plus-refill rule within a bucket.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TollgateError};

/// How tokens flow back into a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefillStrategy {
    /// Spread the refill continuously, proportional to elapsed time.
    Greedy,
    /// Add the full refill amount only when a whole period has elapsed,
    /// never fractionally.
    Interval,
}

/// An immutable rate-limit definition: capacity plus a refill rule.
///
/// A bandwidth on its own says nothing about current token counts; that
/// lives in [`super::BucketState`]. Invariant: a bucket's token count for
/// this bandwidth stays within `0..=capacity` at all observable times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    capacity: u64,
    refill_tokens: u64,
    refill_period: Duration,
    strategy: RefillStrategy,
    initial_tokens: u64,
}

impl Bandwidth {
    /// Create a bandwidth that refills continuously, proportional to
    /// elapsed time.
    pub fn greedy(capacity: u64, refill_tokens: u64, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens,
            refill_period,
            strategy: RefillStrategy::Greedy,
            initial_tokens: capacity,
        }
    }

    /// Create a bandwidth that refills in whole batches at fixed period
    /// boundaries.
    pub fn interval(capacity: u64, refill_tokens: u64, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_tokens,
            refill_period,
            strategy: RefillStrategy::Interval,
            initial_tokens: capacity,
        }
    }

    /// Override the number of tokens a freshly created bucket starts with.
    ///
    /// Defaults to `capacity`. Must be within `0..=capacity`, checked when
    /// the bandwidth is assembled into a [`BucketConfiguration`].
    pub fn with_initial_tokens(mut self, initial_tokens: u64) -> Self {
        self.initial_tokens = initial_tokens;
        self
    }

    /// Maximum number of tokens this bandwidth can hold.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens added per refill period.
    pub fn refill_tokens(&self) -> u64 {
        self.refill_tokens
    }

    /// The refill period.
    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// The refill strategy.
    pub fn strategy(&self) -> RefillStrategy {
        self.strategy
    }

    /// Tokens a freshly created bucket starts with.
    pub fn initial_tokens(&self) -> u64 {
        self.initial_tokens
    }

    pub(crate) fn period_millis(&self) -> u64 {
        self.refill_period.as_millis() as u64
    }

    /// Time for this bandwidth to refill an empty bucket to capacity.
    ///
    /// Used to derive storage TTLs: an idle bucket older than this holds no
    /// information a fresh one would not.
    pub fn full_refill_time(&self) -> Duration {
        let capacity = self.capacity as u128;
        let refill = self.refill_tokens.max(1) as u128;
        let period = self.period_millis() as u128;
        let millis = match self.strategy {
            RefillStrategy::Greedy => (capacity * period).div_ceil(refill),
            RefillStrategy::Interval => capacity.div_ceil(refill) * period,
        };
        Duration::from_millis(millis as u64)
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "bandwidth capacity must be greater than zero".to_string(),
            ));
        }
        if self.refill_tokens == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "bandwidth refill amount must be greater than zero".to_string(),
            ));
        }
        if self.refill_period.is_zero() {
            return Err(TollgateError::InvalidConfiguration(
                "bandwidth refill period must be greater than zero".to_string(),
            ));
        }
        if self.initial_tokens > self.capacity {
            return Err(TollgateError::InvalidConfiguration(format!(
                "initial tokens ({}) exceed capacity ({})",
                self.initial_tokens, self.capacity
            )));
        }
        Ok(())
    }
}

/// An ordered, non-empty list of bandwidths evaluated together.
///
/// Every bandwidth must admit a consumption for it to succeed, which is what
/// makes steady-rate + burst compositions work: pair a slow bandwidth with a
/// larger, faster-refilling one and the burst is capped by the second while
/// the sustained rate is capped by the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfiguration {
    bandwidths: Vec<Bandwidth>,
}

impl BucketConfiguration {
    /// Assemble a configuration, validating every bandwidth.
    ///
    /// Invalid input is rejected here, at configuration time, never during a
    /// consume call.
    pub fn new(bandwidths: Vec<Bandwidth>) -> Result<Self> {
        if bandwidths.is_empty() {
            return Err(TollgateError::InvalidConfiguration(
                "bucket configuration requires at least one bandwidth".to_string(),
            ));
        }
        for bandwidth in &bandwidths {
            bandwidth.validate()?;
        }
        Ok(Self { bandwidths })
    }

    /// Convenience constructor for the common single-limit case.
    pub fn of(bandwidth: Bandwidth) -> Result<Self> {
        Self::new(vec![bandwidth])
    }

    /// The configured bandwidths, in evaluation order.
    pub fn bandwidths(&self) -> &[Bandwidth] {
        &self.bandwidths
    }

    /// Full-refill time of the slowest bandwidth.
    pub fn slowest_full_refill(&self) -> Duration {
        self.bandwidths
            .iter()
            .map(Bandwidth::full_refill_time)
            .max()
            .unwrap_or_default()
    }
}
