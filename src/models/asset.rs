use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetType, Id};
use crate::taxonomy::{ConversionError, ConversionRules};

/// An asset record as far as the pricing core is concerned.
///
/// The portfolio service owns quantities, accounts and valuation; this
/// struct only carries the identity fields used for lookup and the
/// persisted price state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Id,
    pub display_name: String,
    pub asset_type: AssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_symbol: Option<String>,
    /// Identifier the last successful lookup matched (e.g. a resolved ISIN).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_identifier: Option<String>,
    /// False when the user excluded the asset from scheduled refresh.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    #[serde(default)]
    pub price_state: PriceState,
}

fn default_auto_refresh() -> bool {
    true
}

impl Asset {
    pub fn new(display_name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: Id::new(),
            display_name: display_name.into(),
            asset_type,
            isin: None,
            api_symbol: None,
            matched_identifier: None,
            auto_refresh: true,
            price_state: PriceState::default(),
        }
    }

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = id;
        self
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.isin = Some(isin.into());
        self
    }

    pub fn with_api_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.api_symbol = Some(symbol.into());
        self
    }

    pub fn excluded_from_refresh(mut self) -> Self {
        self.auto_refresh = false;
        self
    }

    /// Reclassify the asset, rejecting changes the taxonomy does not declare.
    pub fn change_type(
        &mut self,
        to: AssetType,
        rules: &ConversionRules,
    ) -> Result<(), ConversionError> {
        if to == self.asset_type {
            return Ok(());
        }
        rules.validate_conversion(self.asset_type, to)?;
        self.asset_type = to;
        // A match against the old type's source means nothing for the new one.
        self.matched_identifier = None;
        Ok(())
    }
}

/// Why the last refresh attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoMatch,
    AmbiguousMatch,
    SourceUnavailable,
    Timeout,
}

impl FailureReason {
    /// Machine-readable code written to `price_update_error`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoMatch => "no_match",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::SourceUnavailable => "source_unavailable",
            Self::Timeout => "timeout",
        }
    }

    /// Ambiguity is a data problem, not a source problem: it is retried every
    /// cycle instead of backing off.
    pub fn escalates_backoff(&self) -> bool {
        !matches!(self, Self::AmbiguousMatch)
    }
}

/// Persisted price state of an asset.
///
/// Invariant: `price_update_failed` implies a non-empty `price_update_error`
/// and a `failure_reason`. Only the methods below mutate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price_update_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_update_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Failures since the last success that count towards backoff.
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PriceState {
    pub fn record_success(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.current_price = Some(price);
        self.last_price_update = Some(now);
        self.last_attempt_at = Some(now);
        self.price_update_failed = false;
        self.price_update_error = None;
        self.failure_reason = None;
        self.consecutive_failures = 0;
    }

    /// Mark the attempt failed. `current_price` is left alone: a stale price
    /// is more useful to the portfolio view than no price.
    pub fn record_failure(&mut self, reason: FailureReason, detail: &str, now: DateTime<Utc>) {
        let detail = detail.trim();
        self.price_update_error = Some(if detail.is_empty() {
            reason.code().to_string()
        } else {
            format!("{}: {detail}", reason.code())
        });
        self.price_update_failed = true;
        self.failure_reason = Some(reason);
        self.last_attempt_at = Some(now);
        if reason.escalates_backoff() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn failure_keeps_price_and_sets_error() {
        let mut state = PriceState::default();
        state.record_success(dec!(101.5), now());
        state.record_failure(FailureReason::SourceUnavailable, "HTTP 503", now());

        assert_eq!(state.current_price, Some(dec!(101.5)));
        assert!(state.price_update_failed);
        assert_eq!(
            state.price_update_error.as_deref(),
            Some("source_unavailable: HTTP 503")
        );
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn success_clears_failure_flags() {
        let mut state = PriceState::default();
        state.record_failure(FailureReason::NoMatch, "", now());
        assert_eq!(state.price_update_error.as_deref(), Some("no_match"));

        state.record_success(dec!(12), now());
        assert!(!state.price_update_failed);
        assert!(state.price_update_error.is_none());
        assert!(state.failure_reason.is_none());
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_price_update, Some(now()));
    }

    #[test]
    fn ambiguity_does_not_escalate_backoff() {
        let mut state = PriceState::default();
        state.record_failure(FailureReason::NoMatch, "", now());
        state.record_failure(FailureReason::AmbiguousMatch, "2 candidates", now());
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.failure_reason, Some(FailureReason::AmbiguousMatch));
    }

    #[test]
    fn asset_deserializes_with_defaults() {
        let asset: Asset = serde_json::from_str(
            r#"{"id":"a1","display_name":"HDFC Bank","asset_type":"Stocks","api_symbol":"HDFCBANK"}"#,
        )
        .unwrap();
        assert_eq!(asset.asset_type, AssetType::Stock);
        assert!(asset.auto_refresh);
        assert_eq!(asset.price_state, PriceState::default());
    }
}
