//! `price_sources/{name}/source.toml`: which adapter a directory builds and
//! the knobs it takes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::AssetType;

/// Adapter families a `source.toml` can name in `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceType {
    /// Bulk mutual fund NAV feed (AMFI `NAVAll.txt`)
    NavFeed,
    /// Exchange-listed equity via a chart endpoint, with an exchange suffix
    ListedEquity,
    /// US equity via the same chart endpoint, no suffix
    UsEquity,
    /// CoinGecko simple price
    Crypto,
    /// Manually maintained price table
    Static,
}

impl PriceSourceType {
    /// Asset types served when `asset_types` is not set in `source.toml`.
    pub fn default_asset_types(&self) -> &'static [AssetType] {
        use AssetType::*;
        match self {
            Self::NavFeed => &[MutualFund, EquityFund, DebtFund, HybridFund, IndexFund],
            Self::ListedEquity => &[Stock, Etf],
            Self::UsEquity => &[UsStock],
            Self::Crypto => &[Crypto],
            Self::Static => &[Gold, SovereignGoldBond],
        }
    }
}

/// One `source.toml`. The directory name is the source's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSourceConfig {
    #[serde(rename = "type")]
    pub source_type: PriceSourceType,

    /// Disabled sources are ignored by the registry.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Priority when two sources serve one asset type (lower wins).
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Override the source's endpoint (mirrors, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub timeout: Option<Duration>,

    /// Override which asset types this source answers for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_types: Option<Vec<AssetType>>,

    /// Source-specific configuration options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| crate::duration::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

impl PriceSourceConfig {
    pub fn new(source_type: PriceSourceType) -> Self {
        Self {
            source_type,
            enabled: true,
            priority: default_priority(),
            base_url: None,
            timeout: None,
            asset_types: None,
            config: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source config: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse source config: {}", path.display()))
    }

    /// `None` when the directory has no `source.toml`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    pub fn served_types(&self) -> Vec<AssetType> {
        self.asset_types
            .clone()
            .unwrap_or_else(|| self.source_type.default_asset_types().to_vec())
    }

    /// Deserialize the `[config]` table, or the type's default when absent.
    pub fn options<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match &self.config {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("Invalid [config] for {:?} source", self.source_type)),
            None => Ok(T::default()),
        }
    }
}

/// A `source.toml` paired with the directory it came from.
#[derive(Debug, Clone)]
pub struct LoadedPriceSource {
    pub name: String,
    pub config: PriceSourceConfig,
}
