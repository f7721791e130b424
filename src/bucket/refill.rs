//! Pure refill math for a single bandwidth.
//!
//! Everything here is a deterministic function of the bandwidth, the stored
//! numeric state, and a caller-supplied clock reading. There is no background
//! refill task anywhere in the crate: tokens are replenished lazily, which is
//! what keeps the algorithm stateless between calls and safe to distribute.

use std::time::Duration;

use super::bandwidth::{Bandwidth, RefillStrategy};

/// Advance one bandwidth's `(tokens, last_refill_at)` pair to `now_ms`.
///
/// Timestamps are epoch milliseconds. A clock reading earlier than
/// `last_refill_at` is treated as zero elapsed time, so skew can never
/// decrease tokens. Token counts are clamped to capacity, so overflow is
/// impossible.
pub(crate) fn advance(
    bandwidth: &Bandwidth,
    tokens: u64,
    last_refill_at: u64,
    now_ms: u64,
) -> (u64, u64) {
    let elapsed = now_ms.saturating_sub(last_refill_at);
    if elapsed == 0 {
        return (tokens, last_refill_at);
    }

    let period = bandwidth.period_millis() as u128;
    let refill = bandwidth.refill_tokens() as u128;
    let capacity = bandwidth.capacity() as u128;

    match bandwidth.strategy() {
        RefillStrategy::Greedy => {
            let added = elapsed as u128 * refill / period;
            if added == 0 {
                return (tokens, last_refill_at);
            }
            // Advance the refill mark only by the time the added tokens
            // actually took, so the fractional remainder keeps accruing
            // across calls.
            let consumed_ms = (added * period / refill) as u64;
            let new_tokens = (tokens as u128 + added).min(capacity) as u64;
            (new_tokens, last_refill_at + consumed_ms)
        }
        RefillStrategy::Interval => {
            let periods = elapsed as u128 / period;
            if periods == 0 {
                return (tokens, last_refill_at);
            }
            let new_tokens = (tokens as u128 + periods * refill).min(capacity) as u64;
            (new_tokens, last_refill_at + (periods * period) as u64)
        }
    }
}

/// Time until `cost` tokens are available on a bandwidth whose state has
/// already been advanced to `now_ms`.
///
/// Inverted analytically from the refill formulas; no polling or simulation.
/// Returns zero when the tokens are already there.
pub(crate) fn wait_for(
    bandwidth: &Bandwidth,
    tokens: u64,
    last_refill_at: u64,
    now_ms: u64,
    cost: u64,
) -> Duration {
    if tokens >= cost {
        return Duration::ZERO;
    }
    let deficit = (cost - tokens) as u128;
    let period = bandwidth.period_millis() as u128;
    let refill = bandwidth.refill_tokens() as u128;

    let ready_at = match bandwidth.strategy() {
        RefillStrategy::Greedy => last_refill_at as u128 + (deficit * period).div_ceil(refill),
        RefillStrategy::Interval => {
            last_refill_at as u128 + deficit.div_ceil(refill) * period
        }
    };
    Duration::from_millis(ready_at.saturating_sub(now_ms as u128) as u64)
}
