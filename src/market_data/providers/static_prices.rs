//! Manually maintained prices (physical gold, SGB units and the like).

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::market_data::{AssetIdentity, PriceQuote, PriceSource, RefreshOutcome, SourceKind};
use crate::models::AssetType;

/// `[config]` of a `static` source:
///
/// ```toml
/// [config]
/// currency = "INR"
///
/// [config.prices]
/// GOLD24K = "7250.50"
/// SGBAUG28 = 7190
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticPriceOptions {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub prices: HashMap<String, toml::Value>,
}

pub struct StaticPriceSource {
    name: String,
    prices: HashMap<String, Decimal>,
    currency: Option<String>,
    asset_types: Vec<AssetType>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self {
            name: "manual".to_string(),
            prices: HashMap::new(),
            currency: Some("INR".to_string()),
            asset_types: vec![AssetType::Gold, AssetType::SovereignGoldBond],
        }
    }

    pub fn from_options(options: StaticPriceOptions) -> Result<Self> {
        let mut source = Self::new();
        if let Some(currency) = options.currency {
            source.currency = Some(currency.to_uppercase());
        }
        for (key, value) in options.prices {
            let price = parse_price(&value).with_context(|| format!("Invalid price for {key}"))?;
            source = source.with_price(key, price);
        }
        Ok(source)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_price(mut self, key: impl AsRef<str>, price: Decimal) -> Self {
        self.prices
            .insert(key.as_ref().trim().to_uppercase(), price);
        self
    }

    pub fn with_asset_types(mut self, asset_types: Vec<AssetType>) -> Self {
        self.asset_types = asset_types;
        self
    }
}

impl Default for StaticPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_price(value: &toml::Value) -> Result<Decimal> {
    let price = match value {
        toml::Value::String(s) => Decimal::from_str(s.trim())?,
        toml::Value::Integer(i) => Decimal::from(*i),
        toml::Value::Float(f) => Decimal::from_str(&f.to_string())?,
        other => return Err(anyhow!("expected a number or string, got {}", other.type_str())),
    };
    if price <= Decimal::ZERO {
        return Err(anyhow!("price must be positive"));
    }
    Ok(price)
}

#[async_trait::async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Static
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn lookup(&self, identity: &AssetIdentity) -> RefreshOutcome {
        let keys = [identity.api_symbol.as_deref(), identity.isin.as_deref()];
        for key in keys.into_iter().flatten() {
            let key = key.to_uppercase();
            if let Some(price) = self.prices.get(&key) {
                return RefreshOutcome::Success {
                    quote: PriceQuote {
                        value: *price,
                        as_of: Utc::now(),
                        matched_identifier: key,
                        source_kind: SourceKind::Static,
                        source: self.name.clone(),
                        currency: self.currency.clone(),
                    },
                };
            }
        }
        RefreshOutcome::NoMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Asset;
    use rust_decimal_macros::dec;

    fn options(toml_text: &str) -> StaticPriceOptions {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn prices_accept_strings_and_numbers() -> Result<()> {
        let source = StaticPriceSource::from_options(options(
            "currency = \"inr\"\n[prices]\ngold24k = \"7250.50\"\nSGB = 7190\n",
        ))?;
        assert_eq!(source.prices.get("GOLD24K"), Some(&dec!(7250.50)));
        assert_eq!(source.prices.get("SGB"), Some(&dec!(7190)));
        assert_eq!(source.currency.as_deref(), Some("INR"));
        Ok(())
    }

    #[test]
    fn non_positive_prices_are_rejected() {
        let err = StaticPriceSource::from_options(options("[prices]\nX = \"-1\"\n")).err();
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn symbol_then_isin() {
        let source = StaticPriceSource::new()
            .with_price("IN0020160035", dec!(7100))
            .with_price("GOLD", dec!(7250));

        let by_isin = Asset::new("SGB 2016", AssetType::SovereignGoldBond).with_isin("in0020160035");
        let outcome = source.lookup(&AssetIdentity::from_asset(&by_isin)).await;
        let RefreshOutcome::Success { quote } = &outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(quote.value, dec!(7100));
        assert_eq!(quote.matched_identifier, "IN0020160035");

        let unknown = Asset::new("Silver", AssetType::Gold).with_api_symbol("SILVER");
        assert_eq!(
            source.lookup(&AssetIdentity::from_asset(&unknown)).await,
            RefreshOutcome::NoMatch
        );
    }
}
