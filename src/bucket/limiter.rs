//! Multi-limit token consumption over a refilled bucket state.
//!
//! This is the only place token math happens. It has no knowledge of storage
//! or concurrency; the store layer feeds it a state snapshot and commits
//! whatever it returns.

use std::time::Duration;
use tracing::trace;

use super::bandwidth::BucketConfiguration;
use super::refill;
use super::state::BucketState;

/// The outcome of one consume attempt, handed back to the caller as plain
/// data. Mapping to protocol headers or status codes is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the consumption was admitted.
    pub allowed: bool,
    /// Minimum remaining token count across all bandwidths after the attempt.
    pub remaining_tokens: u64,
    /// Time until `cost` tokens are available on the most-constraining
    /// bandwidth. `Some` only when the attempt was denied.
    pub retry_after: Option<Duration>,
}

impl Decision {
    fn allowed(remaining_tokens: u64) -> Self {
        Self {
            allowed: true,
            remaining_tokens,
            retry_after: None,
        }
    }

    fn denied(remaining_tokens: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining_tokens,
            retry_after: Some(retry_after),
        }
    }
}

/// One bucket: a configuration's bandwidths applied to one state snapshot.
pub struct Bucket<'a> {
    config: &'a BucketConfiguration,
}

impl<'a> Bucket<'a> {
    pub fn new(config: &'a BucketConfiguration) -> Self {
        Self { config }
    }

    /// Attempt to subtract `cost` tokens from every bandwidth at once.
    ///
    /// Each bandwidth is first refilled to `now_ms` independently. The
    /// consumption is admitted only if every bandwidth holds at least `cost`
    /// tokens after refill; otherwise nothing is subtracted from any of them.
    /// Partial consumption would let a denied request leak capacity from the
    /// limits that could have served it.
    ///
    /// Returns the decision together with the successor state. On denial the
    /// successor carries refill-only updates; the caller may persist or
    /// discard it, since a later read recomputes the same refill from the
    /// stored timestamps.
    pub fn try_consume(
        &self,
        state: &BucketState,
        now_ms: u64,
        cost: u64,
    ) -> (Decision, BucketState) {
        let bandwidths = self.config.bandwidths();
        let mut tokens = Vec::with_capacity(bandwidths.len());
        let mut last_refill_at = Vec::with_capacity(bandwidths.len());

        for (i, bandwidth) in bandwidths.iter().enumerate() {
            let (t, l) = refill::advance(
                bandwidth,
                state.tokens.get(i).copied().unwrap_or(0),
                state.last_refill_at.get(i).copied().unwrap_or(now_ms),
                now_ms,
            );
            tokens.push(t);
            last_refill_at.push(l);
        }

        let admitted = tokens.iter().all(|&t| t >= cost);

        if admitted {
            for t in &mut tokens {
                *t -= cost;
            }
            let remaining = tokens.iter().copied().min().unwrap_or(0);
            trace!(cost, remaining, "Consumption admitted");
            (
                Decision::allowed(remaining),
                BucketState {
                    tokens,
                    last_refill_at,
                },
            )
        } else {
            // The most-constraining bandwidth decides the retry hint.
            let mut retry_after = Duration::ZERO;
            for (i, bandwidth) in bandwidths.iter().enumerate() {
                if tokens[i] < cost {
                    let wait =
                        refill::wait_for(bandwidth, tokens[i], last_refill_at[i], now_ms, cost);
                    retry_after = retry_after.max(wait);
                }
            }
            let remaining = tokens.iter().copied().min().unwrap_or(0);
            trace!(cost, remaining, retry_after_ms = retry_after.as_millis() as u64, "Consumption denied");
            (
                Decision::denied(remaining, retry_after),
                BucketState {
                    tokens,
                    last_refill_at,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::bandwidth::Bandwidth;

    fn single(capacity: u64) -> BucketConfiguration {
        BucketConfiguration::of(Bandwidth::greedy(
            capacity,
            capacity,
            Duration::from_secs(60),
        ))
        .unwrap()
    }

    #[test]
    fn test_exactly_capacity_consumptions_succeed() {
        let config = single(5);
        let bucket = Bucket::new(&config);
        let mut state = BucketState::initial(&config, 0);

        for i in 0..5 {
            let (decision, next) = bucket.try_consume(&state, 0, 1);
            assert!(decision.allowed, "consumption {} should be admitted", i);
            assert_eq!(decision.remaining_tokens, 4 - i);
            state = next;
        }

        let (decision, _) = bucket.try_consume(&state, 0, 1);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining_tokens, 0);
        assert!(decision.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_denial_subtracts_nothing() {
        let config = BucketConfiguration::new(vec![
            Bandwidth::greedy(10, 10, Duration::from_secs(60)),
            Bandwidth::greedy(3, 3, Duration::from_secs(60)),
        ])
        .unwrap();
        let bucket = Bucket::new(&config);
        let state = BucketState::initial(&config, 0);

        // Cost 5 clears the first bandwidth but not the second.
        let (decision, next) = bucket.try_consume(&state, 0, 5);
        assert!(!decision.allowed);
        assert_eq!(next.tokens, vec![10, 3]);

        // An immediate retry sees identical remaining tokens.
        let (retry, _) = bucket.try_consume(&next, 0, 5);
        assert_eq!(retry.remaining_tokens, decision.remaining_tokens);
    }

    #[test]
    fn test_steady_plus_burst_composition() {
        // Steady 100/min, burst bucket of 150 refilling at the same rate.
        let config = BucketConfiguration::new(vec![
            Bandwidth::greedy(100, 100, Duration::from_secs(60)),
            Bandwidth::greedy(150, 100, Duration::from_secs(60)),
        ])
        .unwrap();
        let bucket = Bucket::new(&config);
        let mut state = BucketState::initial(&config, 0);

        // The steady bandwidth caps the immediate burst at 100.
        for _ in 0..100 {
            let (decision, next) = bucket.try_consume(&state, 0, 1);
            assert!(decision.allowed);
            state = next;
        }
        let (decision, _) = bucket.try_consume(&state, 0, 1);
        assert!(!decision.allowed);

        // Half a minute later the steady side has earned 50 back; the burst
        // side still has 50 in hand, so 50 more go through before denial.
        let half_minute = 30_000;
        for i in 0..50 {
            let (decision, next) = bucket.try_consume(&state, half_minute, 1);
            assert!(decision.allowed, "consumption {} within refill", i);
            state = next;
        }
        let (decision, _) = bucket.try_consume(&state, half_minute, 1);
        assert!(!decision.allowed);
    }

    #[test]
    fn test_remaining_is_minimum_across_bandwidths() {
        let config = BucketConfiguration::new(vec![
            Bandwidth::greedy(10, 10, Duration::from_secs(60)),
            Bandwidth::greedy(4, 4, Duration::from_secs(60)),
        ])
        .unwrap();
        let bucket = Bucket::new(&config);
        let state = BucketState::initial(&config, 0);

        let (decision, _) = bucket.try_consume(&state, 0, 1);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_tokens, 3);
    }

    #[test]
    fn test_retry_after_tracks_most_constraining_bandwidth() {
        // Both empty after the drain; the interval bandwidth keeps the
        // caller waiting longer than the greedy one.
        let config = BucketConfiguration::new(vec![
            Bandwidth::greedy(1, 1, Duration::from_secs(1)),
            Bandwidth::interval(1, 1, Duration::from_secs(10)),
        ])
        .unwrap();
        let bucket = Bucket::new(&config);
        let state = BucketState::initial(&config, 0);

        let (decision, next) = bucket.try_consume(&state, 0, 1);
        assert!(decision.allowed);

        let (decision, _) = bucket.try_consume(&next, 0, 1);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_multi_token_cost() {
        let config = single(10);
        let bucket = Bucket::new(&config);
        let state = BucketState::initial(&config, 0);

        let (decision, next) = bucket.try_consume(&state, 0, 7);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_tokens, 3);

        let (decision, _) = bucket.try_consume(&next, 0, 7);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining_tokens, 3);
    }
}
