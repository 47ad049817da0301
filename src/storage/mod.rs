mod json_file;
mod memory;

pub use json_file::JsonFileAssetStore;
pub use memory::MemoryAssetStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{Asset, AssetType, FailureReason, Id};
use crate::refresh::DueCriteria;
use crate::taxonomy::AssetTypeMaster;

/// The write the orchestrator makes after one refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceStateUpdate {
    Succeeded {
        price: Decimal,
        matched_identifier: String,
        at: DateTime<Utc>,
    },
    Failed {
        reason: FailureReason,
        detail: String,
        at: DateTime<Utc>,
    },
}

impl PriceStateUpdate {
    pub fn apply(&self, asset: &mut Asset) {
        match self {
            Self::Succeeded {
                price,
                matched_identifier,
                at,
            } => {
                asset.price_state.record_success(*price, *at);
                asset.matched_identifier = Some(matched_identifier.clone());
            }
            Self::Failed { reason, detail, at } => {
                asset.price_state.record_failure(*reason, detail, *at);
            }
        }
    }
}

/// Persistence used by the refresh core.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    async fn list_assets(&self) -> Result<Vec<Asset>>;
    async fn get_asset(&self, id: &Id) -> Result<Option<Asset>>;
    async fn save_asset(&self, asset: &Asset) -> Result<()>;

    /// Apply one refresh result to the stored asset. Errors if the asset is gone.
    async fn update_asset_price_state(&self, id: &Id, update: &PriceStateUpdate) -> Result<()>;

    async fn get_asset_type_master(&self, asset_type: AssetType) -> Result<Option<AssetTypeMaster>>;

    async fn find_assets_due_for_refresh(
        &self,
        now: DateTime<Utc>,
        criteria: &DueCriteria,
    ) -> Result<Vec<Asset>> {
        let mut due: Vec<Asset> = self
            .list_assets()
            .await?
            .into_iter()
            .filter(|asset| criteria.selects(asset, now))
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn success_update_records_identifier() {
        let at = Utc.with_ymd_and_hms(2026, 10, 2, 0, 0, 0).unwrap();
        let mut asset = Asset::new("Parag Parikh Flexi Cap", AssetType::MutualFund);
        PriceStateUpdate::Failed {
            reason: FailureReason::NoMatch,
            detail: String::new(),
            at,
        }
        .apply(&mut asset);

        PriceStateUpdate::Succeeded {
            price: dec!(83.1234),
            matched_identifier: "INF879O01027".to_string(),
            at,
        }
        .apply(&mut asset);

        assert_eq!(asset.matched_identifier.as_deref(), Some("INF879O01027"));
        assert_eq!(asset.price_state.current_price, Some(dec!(83.1234)));
        assert!(!asset.price_state.price_update_failed);
    }
}
