//! Mutual fund NAV source backed by AMFI's daily `NAVAll.txt`.
//!
//! The whole feed is downloaded once and shared as an immutable snapshot
//! until it is older than the TTL. A failed download is remembered for a
//! short cool-down so a cycle with many funds does not hammer a dead feed.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::market_data::nav_feed::{NavRecord, NavSnapshot};
use crate::market_data::sources::{describe_request_error, http_client};
use crate::market_data::{
    AssetIdentity, Candidate, PriceQuote, PriceSource, RefreshOutcome, SourceKind,
};
use crate::models::AssetType;

pub const AMFI_NAV_URL: &str = "https://www.amfiindia.com/spages/NAVAll.txt";
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
struct FeedState {
    snapshot: Option<Arc<NavSnapshot>>,
    last_failure: Option<(DateTime<Utc>, String)>,
}

pub struct AmfiNavSource {
    name: String,
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    retry_after: Duration,
    asset_types: Vec<AssetType>,
    clock: Arc<dyn Clock>,
    state: RwLock<FeedState>,
}

impl AmfiNavSource {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            name: "amfi".to_string(),
            client: http_client(DEFAULT_TIMEOUT)?,
            url: AMFI_NAV_URL.to_string(),
            ttl: DEFAULT_TTL,
            retry_after: DEFAULT_RETRY_AFTER,
            asset_types: vec![
                AssetType::MutualFund,
                AssetType::EquityFund,
                AssetType::DebtFund,
                AssetType::HybridFund,
                AssetType::IndexFund,
            ],
            clock: Arc::new(SystemClock),
            state: RwLock::new(FeedState::default()),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn with_asset_types(mut self, asset_types: Vec<AssetType>) -> Self {
        self.asset_types = asset_types;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn is_within(&self, since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
        // A timestamp in the future counts as fresh.
        (now - since).to_std().map_or(true, |age| age < window)
    }

    /// Current snapshot, downloading a new one when the cached copy expired.
    async fn snapshot(&self) -> Result<Arc<NavSnapshot>, String> {
        let now = self.clock.now();
        {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if let Some(snapshot) = &state.snapshot {
                if self.is_within(snapshot.fetched_at(), now, self.ttl) {
                    return Ok(Arc::clone(snapshot));
                }
            }
            if let Some((failed_at, reason)) = &state.last_failure {
                if self.is_within(*failed_at, now, self.retry_after) {
                    return Err(format!("NAV feed unavailable: {reason}"));
                }
            }
        }

        match self.download(now).await {
            Ok(snapshot) => {
                info!(
                    source = %self.name,
                    rows = snapshot.len(),
                    malformed = snapshot.malformed_rows(),
                    "Loaded NAV feed"
                );
                let snapshot = Arc::new(snapshot);
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.snapshot = Some(Arc::clone(&snapshot));
                state.last_failure = None;
                Ok(snapshot)
            }
            Err(reason) => {
                warn!(source = %self.name, error = %reason, "NAV feed download failed");
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.last_failure = Some((now, reason.clone()));
                Err(format!("NAV feed unavailable: {reason}"))
            }
        }
    }

    async fn download(&self, now: DateTime<Utc>) -> Result<NavSnapshot, String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| describe_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| describe_request_error(&e))?;
        let snapshot = NavSnapshot::parse(&body, now);
        if snapshot.is_empty() {
            return Err("feed contained no NAV rows".to_string());
        }
        Ok(snapshot)
    }

    fn quote(&self, record: &NavRecord, matched_identifier: String) -> PriceQuote {
        PriceQuote {
            value: record.nav,
            as_of: record.as_of(),
            matched_identifier,
            source_kind: SourceKind::MutualFundNav,
            source: self.name.clone(),
            currency: Some("INR".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for AmfiNavSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MutualFundNav
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn lookup(&self, identity: &AssetIdentity) -> RefreshOutcome {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(reason) => return RefreshOutcome::unavailable(reason),
        };

        if let Some(isin) = &identity.isin {
            if let Some(record) = snapshot.find_by_isin(isin) {
                return RefreshOutcome::Success {
                    quote: self.quote(record, isin.clone()),
                };
            }
            debug!(isin = %isin, "ISIN not in NAV feed, matching by name");
        }

        // A scheme renamed since the last match still carries its identifier.
        if let Some(matched) = &identity.matched_identifier {
            if let Some(record) = snapshot.find_by_identifier(matched) {
                return RefreshOutcome::Success {
                    quote: self.quote(record, record.primary_identifier().to_string()),
                };
            }
            debug!(identifier = %matched, "Previous match not in NAV feed");
        }

        match snapshot.search_by_name(&identity.display_name).as_slice() {
            [] => RefreshOutcome::NoMatch,
            [record] => RefreshOutcome::Success {
                quote: self.quote(record, record.primary_identifier().to_string()),
            },
            records => RefreshOutcome::AmbiguousMatch {
                candidates: records
                    .iter()
                    .map(|record| Candidate {
                        identifier: record.primary_identifier().to_string(),
                        name: record.scheme_name.clone(),
                        value: record.nav,
                        as_of: record.as_of(),
                    })
                    .collect(),
            },
        }
    }

    async fn warm_up(&self) -> anyhow::Result<()> {
        self.snapshot().await.map(|_| ()).map_err(|reason| anyhow!(reason))
    }
}
