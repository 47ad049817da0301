//! CoinGecko crypto price provider.
//!
//! Uses the free `/simple/price` endpoint. No API key is required for basic
//! usage, though rate limits apply (HTTP 429 is reported as unavailable).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::market_data::sources::{describe_request_error, http_client, price_from_f64};
use crate::market_data::{AssetIdentity, PriceQuote, PriceSource, RefreshOutcome, SourceKind};
use crate::models::AssetType;

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options accepted in the `[config]` table of a `crypto` source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoinGeckoOptions {
    #[serde(default)]
    pub quote_currency: Option<String>,
    /// Symbol to CoinGecko id overrides, e.g. `PEPE = "pepe"`.
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

pub struct CoinGeckoPriceSource {
    name: String,
    client: reqwest::Client,
    base_url: String,
    /// Quote currency for prices (e.g., "inr", "usd")
    quote_currency: String,
    /// Custom symbol to CoinGecko ID mappings (overrides defaults)
    custom_mappings: HashMap<String, String>,
    asset_types: Vec<AssetType>,
}

impl CoinGeckoPriceSource {
    /// Creates a new CoinGecko provider quoting in INR.
    pub fn new() -> Result<Self> {
        Ok(Self {
            name: "coingecko".to_string(),
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url: COINGECKO_API_BASE.to_string(),
            quote_currency: "inr".to_string(),
            custom_mappings: HashMap::new(),
            asset_types: vec![AssetType::Crypto],
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    /// Sets the quote currency for price lookups.
    pub fn with_quote_currency(mut self, currency: impl Into<String>) -> Self {
        self.quote_currency = currency.into().to_lowercase();
        self
    }

    /// Adds custom symbol to CoinGecko ID mappings.
    pub fn with_custom_mappings(mut self, mappings: HashMap<String, String>) -> Self {
        self.custom_mappings = mappings
            .into_iter()
            .map(|(symbol, id)| (symbol.to_uppercase(), id))
            .collect();
        self
    }

    pub fn with_asset_types(mut self, asset_types: Vec<AssetType>) -> Self {
        self.asset_types = asset_types;
        self
    }

    pub fn with_options(self, options: CoinGeckoOptions) -> Self {
        let source = self.with_custom_mappings(options.mappings);
        match options.quote_currency {
            Some(currency) => source.with_quote_currency(currency),
            None => source,
        }
    }

    /// Maps a crypto symbol to a CoinGecko coin ID.
    ///
    /// Custom mappings win over the built-in table; unknown symbols are
    /// tried as a coin id verbatim.
    fn coin_id(&self, symbol: &str) -> String {
        let symbol_upper = symbol.trim().to_uppercase();

        if let Some(id) = self.custom_mappings.get(&symbol_upper) {
            return id.clone();
        }

        let id = match symbol_upper.as_str() {
            "BTC" => "bitcoin",
            "ETH" => "ethereum",
            "USDT" => "tether",
            "USDC" => "usd-coin",
            "BNB" => "binancecoin",
            "XRP" => "ripple",
            "ADA" => "cardano",
            "DOGE" => "dogecoin",
            "SOL" => "solana",
            "DOT" => "polkadot",
            "MATIC" | "POL" => "matic-network",
            "LTC" => "litecoin",
            "SHIB" => "shiba-inu",
            "TRX" => "tron",
            "AVAX" => "avalanche-2",
            "LINK" => "chainlink",
            "ATOM" => "cosmos",
            "UNI" => "uniswap",
            "XLM" => "stellar",
            "BCH" => "bitcoin-cash",
            "NEAR" => "near",
            "APT" => "aptos",
            "ARB" => "arbitrum",
            "OP" => "optimism",
            "XMR" => "monero",
            "WBTC" => "wrapped-bitcoin",
            _ => return symbol.trim().to_lowercase(),
        };

        id.to_string()
    }

    async fn fetch_price(&self, coin_id: &str) -> RefreshOutcome {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_last_updated_at=true",
            self.base_url,
            urlencoding::encode(coin_id),
            self.quote_currency
        );

        let response = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return RefreshOutcome::unavailable(describe_request_error(&e)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return RefreshOutcome::unavailable("rate limited (HTTP 429)");
        }
        if !status.is_success() {
            return RefreshOutcome::unavailable(format!("HTTP {status}"));
        }

        let data: HashMap<String, HashMap<String, serde_json::Value>> = match response.json().await
        {
            Ok(data) => data,
            Err(e) => return RefreshOutcome::unavailable(format!("invalid response: {e}")),
        };

        // Unknown ids come back as an empty object.
        let Some(fields) = data.get(coin_id) else {
            return RefreshOutcome::NoMatch;
        };
        let Some(value) = fields
            .get(&self.quote_currency)
            .and_then(serde_json::Value::as_f64)
            .and_then(price_from_f64)
        else {
            return RefreshOutcome::NoMatch;
        };
        let as_of = fields
            .get("last_updated_at")
            .and_then(serde_json::Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        RefreshOutcome::Success {
            quote: PriceQuote {
                value,
                as_of,
                matched_identifier: coin_id.to_string(),
                source_kind: SourceKind::Crypto,
                source: self.name.clone(),
                currency: Some(self.quote_currency.to_uppercase()),
            },
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for CoinGeckoPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Crypto
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn lookup(&self, identity: &AssetIdentity) -> RefreshOutcome {
        let keys = [identity.api_symbol.as_deref(), identity.isin.as_deref()];
        for key in keys.into_iter().flatten() {
            match self.fetch_price(&self.coin_id(key)).await {
                RefreshOutcome::NoMatch => continue,
                other => return other,
            }
        }
        RefreshOutcome::NoMatch
    }
}
