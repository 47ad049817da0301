//! In-memory asset store for tests and embedding.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use super::{AssetStore, PriceStateUpdate};
use crate::models::{Asset, AssetType, Id};
use crate::taxonomy::{AssetTypeMaster, ConversionRules};

pub struct MemoryAssetStore {
    assets: Mutex<HashMap<Id, Asset>>,
    rules: ConversionRules,
    price_writes: StdMutex<HashMap<Id, usize>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::with_rules(ConversionRules::seeded())
    }

    pub fn with_rules(rules: ConversionRules) -> Self {
        Self {
            assets: Mutex::new(HashMap::new()),
            rules,
            price_writes: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, asset: Asset) {
        self.assets.lock().await.insert(asset.id.clone(), asset);
    }

    /// How many price-state updates hit `id`.
    pub fn price_writes(&self, id: &Id) -> usize {
        let writes = self.price_writes.lock().unwrap_or_else(|e| e.into_inner());
        writes.get(id).copied().unwrap_or(0)
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryAssetStore {
    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let assets = self.assets.lock().await;
        Ok(assets.values().cloned().collect())
    }

    async fn get_asset(&self, id: &Id) -> Result<Option<Asset>> {
        let assets = self.assets.lock().await;
        Ok(assets.get(id).cloned())
    }

    async fn save_asset(&self, asset: &Asset) -> Result<()> {
        self.insert(asset.clone()).await;
        Ok(())
    }

    async fn update_asset_price_state(&self, id: &Id, update: &PriceStateUpdate) -> Result<()> {
        let mut assets = self.assets.lock().await;
        let Some(asset) = assets.get_mut(id) else {
            bail!("Asset not found: {id}");
        };
        update.apply(asset);

        let mut writes = self.price_writes.lock().unwrap_or_else(|e| e.into_inner());
        *writes.entry(id.clone()).or_default() += 1;
        Ok(())
    }

    async fn get_asset_type_master(&self, asset_type: AssetType) -> Result<Option<AssetTypeMaster>> {
        Ok(self.rules.master(asset_type).cloned())
    }
}
