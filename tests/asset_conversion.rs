use anyhow::Result;
use pricekeep::models::{Asset, AssetType};
use pricekeep::taxonomy::{ConversionError, ConversionRules};

#[test]
fn change_type_follows_declared_edges_only() -> Result<()> {
    let rules = ConversionRules::seeded();

    let mut fund = Asset::new("Nippon Gold ETF FoF", AssetType::Commodity);
    fund.matched_identifier = Some("INF204KB17I5".to_string());
    fund.change_type(AssetType::IndexFund, &rules)?;
    assert_eq!(fund.asset_type, AssetType::IndexFund);
    assert_eq!(fund.matched_identifier, None);

    // The reverse edge is not declared.
    assert_eq!(
        fund.change_type(AssetType::Commodity, &rules),
        Err(ConversionError::NotAllowed {
            from: AssetType::IndexFund,
            to: AssetType::Commodity,
        })
    );
    assert_eq!(fund.asset_type, AssetType::IndexFund);

    Ok(())
}

#[test]
fn immutable_types_reject_every_change() {
    let rules = ConversionRules::seeded();
    let mut ppf = Asset::new("PPF account", AssetType::Ppf);

    assert_eq!(
        ppf.change_type(AssetType::FixedDeposit, &rules),
        Err(ConversionError::Immutable { from: AssetType::Ppf })
    );
    // Keeping the type is not a conversion.
    assert_eq!(ppf.change_type(AssetType::Ppf, &rules), Ok(()));
}

#[test]
fn conversions_are_not_transitive() {
    let rules = ConversionRules::seeded();

    assert!(rules.is_conversion_allowed(AssetType::Bond, AssetType::DebtFund));
    assert!(rules.is_conversion_allowed(AssetType::DebtFund, AssetType::MutualFund));
    assert!(!rules.is_conversion_allowed(AssetType::Bond, AssetType::MutualFund));
}
