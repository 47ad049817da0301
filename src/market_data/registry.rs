//! Price source registry.
//!
//! Loads and manages price sources from the data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use super::providers::{
    AmfiNavSource, ChartSourceOptions, CoinGeckoOptions, CoinGeckoPriceSource, StaticPriceOptions,
    StaticPriceSource, YahooChartSource,
};
use super::source_config::{LoadedPriceSource, PriceSourceConfig, PriceSourceType};
use super::PriceSource;
use crate::config::NavFeedConfig;

/// Registry of configured price sources.
///
/// Loads sources from `{data_dir}/price_sources/*/source.toml` and builds
/// the appropriate implementations. With nothing configured the built-in
/// set from [`default_sources`] is used.
pub struct PriceSourceRegistry {
    sources_dir: PathBuf,
    loaded: Vec<LoadedPriceSource>,
}

/// One source per type, each under the name it logs with.
pub fn default_sources() -> Vec<LoadedPriceSource> {
    [
        ("amfi", PriceSourceType::NavFeed),
        ("nse", PriceSourceType::ListedEquity),
        ("us", PriceSourceType::UsEquity),
        ("coingecko", PriceSourceType::Crypto),
        ("manual", PriceSourceType::Static),
    ]
    .into_iter()
    .map(|(name, source_type)| LoadedPriceSource {
        name: name.to_string(),
        config: PriceSourceConfig::new(source_type),
    })
    .collect()
}

impl PriceSourceRegistry {
    /// Create a new registry pointing to the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            sources_dir: data_dir.join("price_sources"),
            loaded: Vec::new(),
        }
    }

    /// Load all source configurations from the price_sources directory.
    ///
    /// A `source.toml` that fails to parse is logged and skipped.
    pub fn load(&mut self) -> Result<()> {
        self.loaded.clear();

        if self.sources_dir.exists() {
            let entries = std::fs::read_dir(&self.sources_dir)
                .with_context(|| format!("Failed to read {}", self.sources_dir.display()))?;

            for entry in entries {
                let path = entry?.path();
                if !path.is_dir() {
                    continue;
                }

                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.to_string())
                    .unwrap_or_default();

                let source_toml = path.join("source.toml");
                match PriceSourceConfig::load_optional(&source_toml) {
                    Ok(Some(config)) if config.enabled => {
                        self.loaded.push(LoadedPriceSource { name, config });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(path = %source_toml.display(), error = %format!("{e:#}"), "Skipping price source");
                    }
                }
            }
        }

        if self.loaded.is_empty() {
            self.loaded = default_sources();
        }

        // Lower priority value wins; name breaks ties so the order is stable.
        self.loaded
            .sort_by(|a, b| (a.config.priority, &a.name).cmp(&(b.config.priority, &b.name)));

        Ok(())
    }

    /// Get all loaded source configurations.
    pub fn sources(&self) -> &[LoadedPriceSource] {
        &self.loaded
    }

    /// Build every loaded source, in priority order.
    pub fn build(&self, nav_feed: &NavFeedConfig) -> Result<Vec<Arc<dyn PriceSource>>> {
        self.loaded
            .iter()
            .map(|loaded| {
                build_source(loaded, nav_feed)
                    .with_context(|| format!("Failed to build price source {}", loaded.name))
            })
            .collect()
    }

    /// Get the path to the price_sources directory.
    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }
}

fn build_source(loaded: &LoadedPriceSource, nav_feed: &NavFeedConfig) -> Result<Arc<dyn PriceSource>> {
    let config = &loaded.config;
    let asset_types = config.served_types();

    let source: Arc<dyn PriceSource> = match config.source_type {
        PriceSourceType::NavFeed => {
            let mut source = AmfiNavSource::new()?
                .with_name(&loaded.name)
                .with_url(config.base_url.clone().unwrap_or_else(|| nav_feed.url.clone()))
                .with_ttl(nav_feed.ttl)
                .with_retry_after(nav_feed.retry_after)
                .with_asset_types(asset_types);
            if let Some(timeout) = config.timeout {
                source = source.with_timeout(timeout)?;
            }
            Arc::new(source)
        }
        PriceSourceType::ListedEquity | PriceSourceType::UsEquity => {
            let base = if config.source_type == PriceSourceType::ListedEquity {
                YahooChartSource::listed()?
            } else {
                YahooChartSource::us()?
            };
            let mut source = base.with_name(&loaded.name).with_asset_types(asset_types);
            let options: ChartSourceOptions = config.options()?;
            if options.suffix.is_some() {
                source = source.with_suffix(options.suffix);
            }
            if let Some(url) = &config.base_url {
                source = source.with_base_url(url);
            }
            if let Some(timeout) = config.timeout {
                source = source.with_timeout(timeout)?;
            }
            Arc::new(source)
        }
        PriceSourceType::Crypto => {
            let options: CoinGeckoOptions = config.options()?;
            let mut source = CoinGeckoPriceSource::new()?
                .with_name(&loaded.name)
                .with_options(options)
                .with_asset_types(asset_types);
            if let Some(url) = &config.base_url {
                source = source.with_base_url(url);
            }
            if let Some(timeout) = config.timeout {
                source = source.with_timeout(timeout)?;
            }
            Arc::new(source)
        }
        PriceSourceType::Static => {
            let options: StaticPriceOptions = config.options()?;
            let source = StaticPriceSource::from_options(options)?
                .with_name(&loaded.name)
                .with_asset_types(asset_types);
            Arc::new(source)
        }
    };

    Ok(source)
}
