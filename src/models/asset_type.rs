//! Closed set of asset types understood by the pricing core.
//!
//! Upstream records carry asset types as free strings whose spelling has
//! drifted over time ("Stocks", "US Stock", "MF", "Fixed Deposit", ...).
//! [`AssetType::parse`] maps every historical spelling onto one variant so
//! the rest of the crate only ever matches on the enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetType {
    Stock,
    UsStock,
    Etf,
    MutualFund,
    EquityFund,
    DebtFund,
    HybridFund,
    IndexFund,
    Crypto,
    FixedDeposit,
    RecurringDeposit,
    Ppf,
    Epf,
    Nps,
    Gratuity,
    Gold,
    SovereignGoldBond,
    Commodity,
    Bond,
    RealEstate,
    Cash,
}

/// Broad grouping used by the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Equity,
    Debt,
    Hybrid,
    Commodity,
    Crypto,
    Deposit,
    Retirement,
    RealEstate,
    Cash,
}

/// Canonical name for each variant. The canonical form is what gets written back.
const CANONICAL: &[(AssetType, &str)] = &[
    (AssetType::Stock, "stock"),
    (AssetType::UsStock, "us_stock"),
    (AssetType::Etf, "etf"),
    (AssetType::MutualFund, "mutual_fund"),
    (AssetType::EquityFund, "equity_fund"),
    (AssetType::DebtFund, "debt_fund"),
    (AssetType::HybridFund, "hybrid_fund"),
    (AssetType::IndexFund, "index_fund"),
    (AssetType::Crypto, "crypto"),
    (AssetType::FixedDeposit, "fixed_deposit"),
    (AssetType::RecurringDeposit, "recurring_deposit"),
    (AssetType::Ppf, "ppf"),
    (AssetType::Epf, "epf"),
    (AssetType::Nps, "nps"),
    (AssetType::Gratuity, "gratuity"),
    (AssetType::Gold, "gold"),
    (AssetType::SovereignGoldBond, "sovereign_gold_bond"),
    (AssetType::Commodity, "commodity"),
    (AssetType::Bond, "bond"),
    (AssetType::RealEstate, "real_estate"),
    (AssetType::Cash, "cash"),
];

/// Legacy spellings seen in stored records, matched after folding case and
/// separators (see [`fold`]).
const ALIASES: &[(&str, AssetType)] = &[
    ("stocks", AssetType::Stock),
    ("equity", AssetType::Stock),
    ("equity_share", AssetType::Stock),
    ("usstock", AssetType::UsStock),
    ("us_stocks", AssetType::UsStock),
    ("us_equity", AssetType::UsStock),
    ("international_stock", AssetType::UsStock),
    ("etfs", AssetType::Etf),
    ("mf", AssetType::MutualFund),
    ("mutualfund", AssetType::MutualFund),
    ("mutual_funds", AssetType::MutualFund),
    ("equity_mutual_fund", AssetType::EquityFund),
    ("debt_mutual_fund", AssetType::DebtFund),
    ("hybrid_mutual_fund", AssetType::HybridFund),
    ("cryptocurrency", AssetType::Crypto),
    ("crypto_currency", AssetType::Crypto),
    ("fd", AssetType::FixedDeposit),
    ("fixeddeposit", AssetType::FixedDeposit),
    ("rd", AssetType::RecurringDeposit),
    ("recurringdeposit", AssetType::RecurringDeposit),
    ("public_provident_fund", AssetType::Ppf),
    ("provident_fund", AssetType::Epf),
    ("pf", AssetType::Epf),
    ("national_pension_system", AssetType::Nps),
    ("sgb", AssetType::SovereignGoldBond),
    ("gold_bond", AssetType::SovereignGoldBond),
    ("commodities", AssetType::Commodity),
    ("bonds", AssetType::Bond),
    ("property", AssetType::RealEstate),
    ("realestate", AssetType::RealEstate),
    ("savings", AssetType::Cash),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset type {0:?}")]
pub struct UnknownAssetType(pub String);

impl AssetType {
    pub fn all() -> impl Iterator<Item = AssetType> {
        CANONICAL.iter().map(|(t, _)| *t)
    }

    pub fn as_str(&self) -> &'static str {
        CANONICAL
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Parse any canonical or historical spelling.
    pub fn parse(raw: &str) -> Result<Self, UnknownAssetType> {
        let folded = fold(raw);
        CANONICAL
            .iter()
            .find(|(_, name)| *name == folded)
            .map(|(t, _)| *t)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == folded)
                    .map(|(_, t)| *t)
            })
            .ok_or_else(|| UnknownAssetType(raw.to_string()))
    }

    pub fn category(&self) -> AssetCategory {
        match self {
            Self::Stock | Self::UsStock | Self::Etf | Self::EquityFund | Self::IndexFund => {
                AssetCategory::Equity
            }
            Self::DebtFund | Self::Bond => AssetCategory::Debt,
            Self::MutualFund | Self::HybridFund => AssetCategory::Hybrid,
            Self::Gold | Self::SovereignGoldBond | Self::Commodity => AssetCategory::Commodity,
            Self::Crypto => AssetCategory::Crypto,
            Self::FixedDeposit | Self::RecurringDeposit => AssetCategory::Deposit,
            Self::Ppf | Self::Epf | Self::Nps | Self::Gratuity => AssetCategory::Retirement,
            Self::RealEstate => AssetCategory::RealEstate,
            Self::Cash => AssetCategory::Cash,
        }
    }
}

/// Lowercase, trim, and turn spaces/dashes into underscores.
fn fold(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = UnknownAssetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AssetType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AssetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
