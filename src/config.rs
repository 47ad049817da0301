use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::{deserialize_duration, serialize_duration};
use crate::market_data::providers::amfi;
use crate::refresh::{BackoffPolicy, RefreshPolicy};

fn default_interval() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrency() -> usize {
    8
}

fn default_cycle_period() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_jitter() -> Duration {
    Duration::from_secs(60)
}

fn default_run_on_start() -> bool {
    true
}

/// Refresh cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// How old a successful price can be before the asset is due again.
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub interval: Duration,

    /// Upper bound on one asset's lookup, including retries inside a source.
    #[serde(
        default = "default_lookup_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub lookup_timeout: Duration,

    /// Lookups in flight at once within a cycle.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Time between scheduled cycles.
    #[serde(
        default = "default_cycle_period",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub cycle_period: Duration,

    /// Random offset in `[-jitter, +jitter]` applied to each period.
    #[serde(
        default = "default_jitter",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub jitter: Duration,

    /// Run a cycle immediately when the scheduler starts.
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            lookup_timeout: default_lookup_timeout(),
            max_concurrency: default_max_concurrency(),
            cycle_period: default_cycle_period(),
            jitter: default_jitter(),
            run_on_start: default_run_on_start(),
        }
    }
}

/// Failure backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub base: Duration,

    pub factor: u32,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base: policy.base,
            factor: policy.factor,
            max: policy.max,
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base: config.base,
            factor: config.factor,
            max: config.max,
        }
    }
}

/// Bulk NAV feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavFeedConfig {
    pub url: String,

    /// How long a downloaded feed is reused.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub ttl: Duration,

    /// How long a failed download is remembered before trying again.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_after: Duration,
}

impl Default for NavFeedConfig {
    fn default() -> Self {
        Self {
            url: amfi::AMFI_NAV_URL.to_string(),
            ttl: amfi::DEFAULT_TTL,
            retry_after: amfi::DEFAULT_RETRY_AFTER,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    pub refresh: RefreshConfig,

    pub backoff: BackoffConfig,

    pub nav_feed: NavFeedConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.refresh.cycle_period.is_zero() {
            bail!("refresh.cycle_period must be greater than zero");
        }
        if self.refresh.lookup_timeout.is_zero() {
            bail!("refresh.lookup_timeout must be greater than zero");
        }
        Ok(())
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,
    pub refresh: RefreshConfig,
    pub backoff: BackoffConfig,
    pub nav_feed: NavFeedConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./pricekeep.toml` if it exists in current directory
/// 2. `pricekeep/pricekeep.toml` under the platform data directory
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("pricekeep.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("pricekeep").join("pricekeep.toml");
    }

    local_config
}

impl ResolvedConfig {
    fn from_config(config: Config, config_dir: &Path) -> Self {
        Self {
            data_dir: config.resolve_data_dir(config_dir),
            refresh: config.refresh,
            backoff: config.backoff,
            nav_feed: config.nav_feed,
        }
    }

    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Without a file, the directory the config would live in is the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            interval: self.refresh.interval,
            backoff: BackoffPolicy::from(&self.backoff),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/finances")
        );
    }

    #[test]
    fn test_relative_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_data_dir(Path::new("/home/user/finances")),
            PathBuf::from("/home/user/finances/data")
        );
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, None);
        assert_eq!(config.refresh.max_concurrency, 8);
        assert_eq!(config.nav_feed.url, amfi::AMFI_NAV_URL);

        Ok(())
    }

    #[test]
    fn test_load_refresh_and_backoff() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[refresh]")?;
        writeln!(file, "interval = \"1d\"")?;
        writeln!(file, "lookup_timeout = \"10s\"")?;
        writeln!(file, "max_concurrency = 2")?;
        writeln!(file, "jitter = \"0s\"")?;
        writeln!(file, "[backoff]")?;
        writeln!(file, "base = \"5m\"")?;
        writeln!(file, "factor = 3")?;
        writeln!(file, "max = \"12h\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.refresh.interval, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.refresh.lookup_timeout, Duration::from_secs(10));
        assert_eq!(config.refresh.max_concurrency, 2);
        assert_eq!(config.refresh.jitter, Duration::ZERO);
        // Unset keys keep their defaults.
        assert_eq!(config.refresh.cycle_period, Duration::from_secs(15 * 60));
        assert_eq!(config.backoff.factor, 3);
        assert_eq!(config.backoff.max, Duration::from_secs(12 * 60 * 60));

        Ok(())
    }

    #[test]
    fn test_invalid_duration_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");
        std::fs::write(&config_path, "[refresh]\ninterval = \"soon\"\n")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_zero_cycle_period_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");
        std::fs::write(&config_path, "[refresh]\ncycle_period = \"0s\"\n")?;

        let err = ResolvedConfig::load(&config_path).unwrap_err();
        assert!(
            format!("{err:#}").contains("cycle_period must be greater than zero"),
            "{err:#}"
        );
        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());
        assert_eq!(resolved.refresh_policy(), RefreshPolicy::default());

        Ok(())
    }

    #[test]
    fn test_resolved_config_resolves_relative_data_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("pricekeep.toml");
        std::fs::write(&config_path, "data_dir = \"./data\"\n")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path().canonicalize()?.join("data"));

        Ok(())
    }
}
