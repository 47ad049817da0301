//! When an asset is due for a price refresh.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{Asset, AssetType, FailureReason, PriceState};

/// Retry delay after consecutive failures: `base * factor^(n-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = self.factor.max(1);
        factor
            .checked_pow(consecutive_failures - 1)
            .and_then(|multiplier| self.base.checked_mul(multiplier))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(15 * 60),
            factor: 2,
            max: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// A successful price older than this is refreshed again.
    pub interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 60 * 60),
            backoff: BackoffPolicy::default(),
        }
    }
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

impl RefreshPolicy {
    pub fn is_due(&self, state: &PriceState, now: DateTime<Utc>) -> bool {
        if state.price_update_failed {
            if state.failure_reason == Some(FailureReason::AmbiguousMatch) {
                return true;
            }
            return match state.last_attempt_at {
                Some(at) => age(at, now) >= self.backoff.delay(state.consecutive_failures),
                None => true,
            };
        }

        match state.last_price_update {
            Some(at) => age(at, now) >= self.interval,
            None => true,
        }
    }
}

/// Selection criteria handed to the asset store for one cycle.
#[derive(Debug, Clone)]
pub struct DueCriteria {
    pub policy: RefreshPolicy,
    /// Types some source serves. Others are never selected.
    pub refreshable_types: HashSet<AssetType>,
}

impl DueCriteria {
    pub fn selects(&self, asset: &Asset, now: DateTime<Utc>) -> bool {
        asset.auto_refresh
            && self.refreshable_types.contains(&asset.asset_type)
            && self.policy.is_due(&asset.price_state, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    #[test]
    fn delay_doubles_then_caps() {
        let backoff = BackoffPolicy {
            base: Duration::from_secs(60),
            factor: 2,
            max: Duration::from_secs(600),
        };
        let delays: Vec<u64> = (0..7).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 60, 120, 240, 480, 600, 600]);
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn never_priced_is_due() {
        assert!(RefreshPolicy::default().is_due(&PriceState::default(), t0()));
    }

    #[test]
    fn fresh_price_waits_for_interval() {
        let policy = RefreshPolicy::default();
        let mut state = PriceState::default();
        state.record_success(dec!(10), t0());

        assert!(!policy.is_due(&state, t0() + minutes(60)));
        assert!(policy.is_due(&state, t0() + minutes(6 * 60)));
    }

    #[test]
    fn failure_waits_for_backoff_window() {
        let policy = RefreshPolicy::default();
        let mut state = PriceState::default();
        state.record_failure(FailureReason::SourceUnavailable, "HTTP 503", t0());
        state.record_failure(FailureReason::SourceUnavailable, "HTTP 503", t0());

        // Two failures: 15m * 2.
        assert!(!policy.is_due(&state, t0() + minutes(29)));
        assert!(policy.is_due(&state, t0() + minutes(30)));
    }

    #[test]
    fn ambiguous_match_is_always_due() {
        let policy = RefreshPolicy::default();
        let mut state = PriceState::default();
        state.record_failure(FailureReason::AmbiguousMatch, "2 candidates", t0());
        assert!(policy.is_due(&state, t0()));
    }

    #[test]
    fn criteria_exclude_opted_out_and_unserved_types() {
        let criteria = DueCriteria {
            policy: RefreshPolicy::default(),
            refreshable_types: [AssetType::MutualFund].into_iter().collect(),
        };
        let fund = Asset::new("Fund", AssetType::MutualFund);
        let gratuity = Asset::new("Gratuity", AssetType::Gratuity);
        let opted_out = Asset::new("Fund", AssetType::MutualFund).excluded_from_refresh();

        assert!(criteria.selects(&fund, t0()));
        assert!(!criteria.selects(&gratuity, t0()));
        assert!(!criteria.selects(&opted_out, t0()));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(
            base_secs in 1u64..3_600,
            factor in 0u32..6,
            max_secs in 1u64..200_000,
            n in 0u32..200,
        ) {
            let backoff = BackoffPolicy {
                base: Duration::from_secs(base_secs),
                factor,
                max: Duration::from_secs(max_secs),
            };
            prop_assert!(backoff.delay(n) <= backoff.delay(n + 1));
            prop_assert!(backoff.delay(n + 1) <= backoff.max);
        }
    }
}
