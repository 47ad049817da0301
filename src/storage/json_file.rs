use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tracing::warn;

use super::{AssetStore, PriceStateUpdate};
use crate::models::{Asset, AssetType, Id};
use crate::taxonomy::{AssetTypeMaster, ConversionRules};

/// JSON file-based asset store.
///
/// Directory structure:
/// ```text
/// data/
///   asset_types.toml      (optional, overrides the built-in taxonomy)
///   assets/
///     {id}/
///       asset.json
/// ```
pub struct JsonFileAssetStore {
    base_path: PathBuf,
    rules: ConversionRules,
}

impl JsonFileAssetStore {
    pub fn new(base_path: impl AsRef<Path>, rules: ConversionRules) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            rules,
        }
    }

    /// Open a data directory, loading its taxonomy override if present.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        let rules = ConversionRules::load_or_seed(&base_path.join("asset_types.toml"))?;
        Ok(Self::new(base_path, rules))
    }

    pub fn rules(&self) -> &ConversionRules {
        &self.rules
    }

    fn assets_dir(&self) -> PathBuf {
        self.base_path.join("assets")
    }

    fn asset_file(&self, id: &Id) -> Result<PathBuf> {
        if !Id::is_path_safe(id.as_str()) {
            bail!("Asset id is not a valid path segment: {id:?}");
        }
        Ok(self.assets_dir().join(id.as_str()).join("asset.json"))
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        Ok(())
    }

    async fn read_json<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Write via a sibling temp file and rename, so a reader never sees half a record.
    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir(path).await?;
        let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<Id>> {
        let mut ids = Vec::new();

        let mut entries = match fs::read_dir(path).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e).context("Failed to read directory"),
        };

        while let Some(entry) = entries.next_entry().await.context("Failed to read entry")? {
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                match Id::parse(name) {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!(error = %e, "Skipping asset directory"),
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl AssetStore for JsonFileAssetStore {
    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();
        for id in self.list_dirs(&self.assets_dir()).await? {
            // One unreadable record must not hide the rest.
            match self.get_asset(&id).await {
                Ok(Some(asset)) => assets.push(asset),
                Ok(None) => {}
                Err(e) => warn!(asset_id = %id, error = %format!("{e:#}"), "Skipping unreadable asset"),
            }
        }
        Ok(assets)
    }

    async fn get_asset(&self, id: &Id) -> Result<Option<Asset>> {
        self.read_json(&self.asset_file(id)?).await
    }

    async fn save_asset(&self, asset: &Asset) -> Result<()> {
        self.write_json(&self.asset_file(&asset.id)?, asset).await
    }

    async fn update_asset_price_state(&self, id: &Id, update: &PriceStateUpdate) -> Result<()> {
        let path = self.asset_file(id)?;
        let Some(mut asset) = self.read_json::<Asset>(&path).await? else {
            bail!("Asset not found: {id}");
        };
        update.apply(&mut asset);
        self.write_json(&path, &asset).await
    }

    async fn get_asset_type_master(&self, asset_type: AssetType) -> Result<Option<AssetTypeMaster>> {
        Ok(self.rules.master(asset_type).cloned())
    }
}
