use std::time::Duration;

use anyhow::{Context, Result};

use super::{AssetIdentity, RefreshOutcome, SourceKind};
use crate::models::AssetType;

/// One external price source.
///
/// `lookup` never returns an error: transport problems, bad payloads and
/// misses are all expressed as a [`RefreshOutcome`] so a failing source stays
/// local to the asset being refreshed.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Instance name, e.g. the `price_sources/<name>` directory.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Asset types this source answers for.
    fn asset_types(&self) -> &[AssetType];

    async fn lookup(&self, identity: &AssetIdentity) -> RefreshOutcome;

    /// Load shared state (e.g. a bulk feed) ahead of a cycle.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) const USER_AGENT: &str = concat!("pricekeep/", env!("CARGO_PKG_VERSION"));

/// Client with a hard per-request timeout. Every adapter goes through here.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")
}

/// Describe a transport error for `price_update_error`.
pub(crate) fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if let Some(status) = err.status() {
        format!("HTTP {status}")
    } else {
        err.to_string()
    }
}

/// Convert a JSON float price via its shortest decimal rendering so
/// `83.12` stays `83.12`. Non-finite and non-positive values are rejected.
pub(crate) fn price_from_f64(value: f64) -> Option<rust_decimal::Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    value.to_string().parse().ok()
}
