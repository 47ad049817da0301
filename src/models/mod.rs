mod asset;
mod asset_type;
mod id;

pub use asset::{Asset, FailureReason, PriceState};
pub use asset_type::{AssetCategory, AssetType, UnknownAssetType};
pub use id::{Id, IdError};
