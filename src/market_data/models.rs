use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Asset, AssetType, FailureReason};

/// Which family of source produced a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ListedEquity,
    UsEquity,
    MutualFundNav,
    Crypto,
    Static,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListedEquity => "listed_equity",
            Self::UsEquity => "us_equity",
            Self::MutualFundNav => "mutual_fund_nav",
            Self::Crypto => "crypto",
            Self::Static => "static",
        };
        f.write_str(name)
    }
}

/// Lookup input derived from an [`Asset`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIdentity {
    pub asset_type: AssetType,
    pub isin: Option<String>,
    pub api_symbol: Option<String>,
    pub display_name: String,
    /// Identifier the previous successful lookup matched, if any.
    pub matched_identifier: Option<String>,
}

impl AssetIdentity {
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            asset_type: asset.asset_type,
            isin: non_blank(asset.isin.as_deref()).map(|s| s.to_uppercase()),
            api_symbol: non_blank(asset.api_symbol.as_deref()).map(str::to_string),
            display_name: asset.display_name.trim().to_string(),
            matched_identifier: non_blank(asset.matched_identifier.as_deref()).map(str::to_string),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub value: Decimal,
    pub as_of: DateTime<Utc>,
    /// What the source actually matched; may differ from the stored identity.
    pub matched_identifier: String,
    pub source_kind: SourceKind,
    /// Name of the adapter instance (e.g. "amfi").
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// One of several equally plausible matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier: String,
    pub name: String,
    pub value: Decimal,
    pub as_of: DateTime<Utc>,
}

impl Candidate {
    pub fn into_quote(self, source_kind: SourceKind, source: &str) -> PriceQuote {
        PriceQuote {
            value: self.value,
            as_of: self.as_of,
            matched_identifier: self.identifier,
            source_kind,
            source: source.to_string(),
            currency: None,
        }
    }
}

/// Result of one refresh attempt for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Success { quote: PriceQuote },
    NoMatch,
    AmbiguousMatch { candidates: Vec<Candidate> },
    SourceUnavailable { reason: String },
    Skipped { reason: String },
}

impl RefreshOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::NoMatch => "no_match",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// The failure to record, or `None` for success and skip.
    pub fn failure(&self) -> Option<(FailureReason, String)> {
        match self {
            Self::Success { .. } | Self::Skipped { .. } => None,
            Self::NoMatch => Some((FailureReason::NoMatch, String::new())),
            Self::AmbiguousMatch { candidates } => Some((
                FailureReason::AmbiguousMatch,
                format!(
                    "{} candidates ({})",
                    candidates.len(),
                    candidates
                        .iter()
                        .map(|c| c.identifier.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
            Self::SourceUnavailable { reason } => {
                Some((FailureReason::SourceUnavailable, reason.clone()))
            }
        }
    }
}
