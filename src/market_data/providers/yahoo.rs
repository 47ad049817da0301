//! Equity quotes from Yahoo Finance's public chart endpoint.
//!
//! One implementation serves both exchange-listed (NSE/BSE) and US equity:
//! listed instances append an exchange suffix (`.NS` by default) to bare
//! symbols. An ISIN with no symbol is resolved through the search endpoint
//! first.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::market_data::sources::{describe_request_error, http_client, price_from_f64};
use crate::market_data::{AssetIdentity, PriceQuote, PriceSource, RefreshOutcome, SourceKind};
use crate::models::AssetType;

const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const NSE_SUFFIX: &str = ".NS";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuote {
    symbol: String,
    #[serde(default)]
    quote_type: Option<String>,
}

/// Options accepted in the `[config]` table of a `listed_equity` source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartSourceOptions {
    /// Exchange suffix for bare symbols, e.g. ".BO" for BSE.
    #[serde(default)]
    pub suffix: Option<String>,
}

enum Fetch<T> {
    Found(T),
    Missing,
    Failed(String),
}

pub struct YahooChartSource {
    name: String,
    kind: SourceKind,
    client: reqwest::Client,
    base_url: String,
    suffix: Option<String>,
    asset_types: Vec<AssetType>,
}

impl YahooChartSource {
    /// Indian listed equity and ETFs (NSE).
    pub fn listed() -> Result<Self> {
        Ok(Self {
            name: "nse".to_string(),
            kind: SourceKind::ListedEquity,
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url: YAHOO_API_BASE.to_string(),
            suffix: Some(NSE_SUFFIX.to_string()),
            asset_types: vec![AssetType::Stock, AssetType::Etf],
        })
    }

    pub fn us() -> Result<Self> {
        Ok(Self {
            name: "us".to_string(),
            kind: SourceKind::UsEquity,
            client: http_client(DEFAULT_TIMEOUT)?,
            base_url: YAHOO_API_BASE.to_string(),
            suffix: None,
            asset_types: vec![AssetType::UsStock],
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

    pub fn with_suffix(mut self, suffix: Option<String>) -> Self {
        self.suffix = suffix.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_asset_types(mut self, asset_types: Vec<AssetType>) -> Self {
        self.asset_types = asset_types;
        self
    }

    /// Symbol as the chart endpoint expects it.
    fn exchange_symbol(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_uppercase();
        match &self.suffix {
            Some(suffix) if !symbol.contains('.') && !symbol.starts_with('^') => {
                format!("{symbol}{}", suffix.to_uppercase())
            }
            _ => symbol,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Fetch<T> {
        let response = match self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Fetch::Failed(describe_request_error(&e)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Fetch::Missing;
        }
        if !status.is_success() {
            return Fetch::Failed(format!("HTTP {status}"));
        }

        match response.json::<T>().await {
            Ok(body) => Fetch::Found(body),
            Err(e) => Fetch::Failed(format!("invalid response: {e}")),
        }
    }

    async fn fetch_chart(&self, symbol: &str) -> Fetch<ChartMeta> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url,
            urlencoding::encode(symbol)
        );
        match self.get_json::<ChartEnvelope>(&url).await {
            Fetch::Found(envelope) => envelope
                .chart
                .result
                .and_then(|results| results.into_iter().next())
                .map_or(Fetch::Missing, |r| Fetch::Found(r.meta)),
            Fetch::Missing => Fetch::Missing,
            Fetch::Failed(reason) => Fetch::Failed(reason),
        }
    }

    /// Resolve an ISIN to a chart symbol, preferring this exchange's suffix.
    async fn search_isin(&self, isin: &str) -> Fetch<String> {
        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount=5&newsCount=0",
            self.base_url,
            urlencoding::encode(isin)
        );
        let response = match self.get_json::<SearchResponse>(&url).await {
            Fetch::Found(response) => response,
            Fetch::Missing => return Fetch::Missing,
            Fetch::Failed(reason) => return Fetch::Failed(reason),
        };

        let tradable: Vec<&SearchQuote> = response
            .quotes
            .iter()
            .filter(|q| {
                q.quote_type
                    .as_deref()
                    .map_or(true, |t| matches!(t, "EQUITY" | "ETF"))
            })
            .collect();
        let preferred = self.suffix.as_deref().and_then(|suffix| {
            let suffix = suffix.to_uppercase();
            tradable
                .iter()
                .find(|q| q.symbol.to_uppercase().ends_with(&suffix))
        });

        match preferred.or_else(|| tradable.first()) {
            Some(quote) => Fetch::Found(quote.symbol.clone()),
            None => Fetch::Missing,
        }
    }

    fn to_outcome(&self, meta: ChartMeta, matched_identifier: String) -> RefreshOutcome {
        let Some(value) = meta.regular_market_price.and_then(price_from_f64) else {
            return RefreshOutcome::unavailable(format!("no market price for {}", meta.symbol));
        };
        let as_of = meta
            .regular_market_time
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        RefreshOutcome::Success {
            quote: PriceQuote {
                value,
                as_of,
                matched_identifier,
                source_kind: self.kind,
                source: self.name.clone(),
                currency: meta.currency,
            },
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for YahooChartSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn lookup(&self, identity: &AssetIdentity) -> RefreshOutcome {
        let mut tried = None;
        if let Some(symbol) = &identity.api_symbol {
            let symbol = self.exchange_symbol(symbol);
            match self.fetch_chart(&symbol).await {
                Fetch::Found(meta) => return self.to_outcome(meta, symbol),
                Fetch::Failed(reason) => return RefreshOutcome::unavailable(reason),
                Fetch::Missing => debug!(symbol = %symbol, "Symbol not found, trying ISIN"),
            }
            tried = Some(symbol);
        }

        // The symbol recorded on the last success is already exchange-qualified.
        if let Some(matched) = &identity.matched_identifier {
            let symbol = matched.trim().to_uppercase();
            if tried.as_deref() != Some(symbol.as_str()) {
                match self.fetch_chart(&symbol).await {
                    Fetch::Found(meta) => return self.to_outcome(meta, symbol),
                    Fetch::Failed(reason) => return RefreshOutcome::unavailable(reason),
                    Fetch::Missing => debug!(symbol = %symbol, "Previous match not found"),
                }
            }
        }

        let Some(isin) = &identity.isin else {
            return RefreshOutcome::NoMatch;
        };

        let symbol = match self.search_isin(isin).await {
            Fetch::Found(symbol) => symbol,
            Fetch::Missing => return RefreshOutcome::NoMatch,
            Fetch::Failed(reason) => return RefreshOutcome::unavailable(reason),
        };

        match self.fetch_chart(&symbol).await {
            Fetch::Found(meta) => self.to_outcome(meta, symbol),
            Fetch::Missing => RefreshOutcome::NoMatch,
            Fetch::Failed(reason) => RefreshOutcome::unavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_symbols_get_the_exchange_suffix() -> Result<()> {
        let source = YahooChartSource::listed()?;
        assert_eq!(source.exchange_symbol("reliance"), "RELIANCE.NS");
        assert_eq!(source.exchange_symbol("TCS.BO"), "TCS.BO");
        assert_eq!(source.exchange_symbol("^NSEI"), "^NSEI");
        assert_eq!(YahooChartSource::us()?.exchange_symbol("aapl"), "AAPL");
        Ok(())
    }

    #[test]
    fn chart_meta_parses() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"INR","symbol":"INFY.NS",
            "regularMarketPrice":1502.35,"regularMarketTime":1760500800}}],"error":null}}"#;
        let envelope: ChartEnvelope = serde_json::from_str(body).unwrap();
        let meta = &envelope.chart.result.unwrap()[0].meta;
        assert_eq!(meta.symbol, "INFY.NS");
        assert_eq!(meta.regular_market_price, Some(1502.35));
    }

    #[test]
    fn unknown_symbol_body_has_no_result() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let envelope: ChartEnvelope = serde_json::from_str(body).unwrap();
        assert!(envelope.chart.result.is_none());
    }
}
