use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{AssetIdentity, Candidate, PriceSource, RefreshOutcome};
use crate::models::AssetType;

/// Routes an asset identity to the source serving its type and narrows
/// ambiguous answers using the identifier matched last time.
pub struct IdentityResolver {
    sources: Vec<Arc<dyn PriceSource>>,
    routes: HashMap<AssetType, usize>,
}

impl IdentityResolver {
    /// `sources` must be in priority order: the first source declaring a
    /// type serves it.
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        let mut routes = HashMap::new();
        for (idx, source) in sources.iter().enumerate() {
            for asset_type in source.asset_types() {
                routes.entry(*asset_type).or_insert(idx);
            }
        }
        Self { sources, routes }
    }

    pub fn source_for(&self, asset_type: AssetType) -> Option<&Arc<dyn PriceSource>> {
        self.routes.get(&asset_type).map(|idx| &self.sources[*idx])
    }

    /// Types that have a source. Everything else is never selected for refresh.
    pub fn served_types(&self) -> HashSet<AssetType> {
        self.routes.keys().copied().collect()
    }

    pub fn sources(&self) -> &[Arc<dyn PriceSource>] {
        &self.sources
    }

    /// Warm the sources that serve `types`, each once. Failures are logged;
    /// lookups will report them.
    pub async fn warm_up_for(&self, types: &HashSet<AssetType>) {
        let mut routed: Vec<usize> = types
            .iter()
            .filter_map(|asset_type| self.routes.get(asset_type).copied())
            .collect();
        routed.sort_unstable();
        routed.dedup();

        for source in routed.into_iter().map(|idx| &self.sources[idx]) {
            if let Err(e) = source.warm_up().await {
                warn!(source = %source.name(), error = %format!("{e:#}"), "Price source warm-up failed");
            }
        }
    }

    pub async fn resolve(&self, identity: &AssetIdentity) -> RefreshOutcome {
        let Some(source) = self.source_for(identity.asset_type) else {
            return RefreshOutcome::skipped("no adapter");
        };

        match source.lookup(identity).await {
            RefreshOutcome::AmbiguousMatch { candidates } => {
                narrow(source.as_ref(), identity, candidates)
            }
            outcome => outcome,
        }
    }
}

fn narrow(
    source: &dyn PriceSource,
    identity: &AssetIdentity,
    mut candidates: Vec<Candidate>,
) -> RefreshOutcome {
    let previous = identity.matched_identifier.as_deref();
    let position = previous.and_then(|previous| {
        candidates
            .iter()
            .position(|c| c.identifier.eq_ignore_ascii_case(previous))
    });

    match position {
        Some(idx) => {
            let chosen = candidates.swap_remove(idx);
            debug!(
                source = %source.name(),
                identifier = %chosen.identifier,
                "Ambiguous match narrowed by previous identifier"
            );
            RefreshOutcome::Success {
                quote: chosen.into_quote(source.kind(), source.name()),
            }
        }
        None => RefreshOutcome::AmbiguousMatch { candidates },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::SourceKind;
    use crate::models::Asset;
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct FixedSource {
        name: &'static str,
        types: Vec<AssetType>,
        outcome: RefreshOutcome,
    }

    #[async_trait::async_trait]
    impl PriceSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            SourceKind::MutualFundNav
        }

        fn asset_types(&self) -> &[AssetType] {
            &self.types
        }

        async fn lookup(&self, _identity: &AssetIdentity) -> RefreshOutcome {
            self.outcome.clone()
        }
    }

    fn candidate(identifier: &str) -> Candidate {
        Candidate {
            identifier: identifier.to_string(),
            name: "Axis Bluechip Fund".to_string(),
            value: Decimal::new(5012, 2),
            as_of: Utc::now(),
        }
    }

    fn ambiguous_resolver() -> IdentityResolver {
        IdentityResolver::new(vec![Arc::new(FixedSource {
            name: "amfi",
            types: vec![AssetType::MutualFund],
            outcome: RefreshOutcome::AmbiguousMatch {
                candidates: vec![candidate("INF846K01DP8"), candidate("INF846K01164")],
            },
        })])
    }

    #[tokio::test]
    async fn unrouted_type_is_skipped() {
        let resolver = ambiguous_resolver();
        let identity = AssetIdentity::from_asset(&Asset::new("Gratuity", AssetType::Gratuity));
        assert_eq!(
            resolver.resolve(&identity).await,
            RefreshOutcome::skipped("no adapter")
        );
    }

    #[tokio::test]
    async fn previous_identifier_narrows_ambiguity() {
        let resolver = ambiguous_resolver();
        let mut asset = Asset::new("Axis Bluechip", AssetType::MutualFund);
        asset.matched_identifier = Some("inf846k01164".to_string());

        match resolver.resolve(&AssetIdentity::from_asset(&asset)).await {
            RefreshOutcome::Success { quote } => {
                assert_eq!(quote.matched_identifier, "INF846K01164");
                assert_eq!(quote.source, "amfi");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ambiguity_without_history_is_kept() {
        let resolver = ambiguous_resolver();
        let identity = AssetIdentity::from_asset(&Asset::new("Axis Bluechip", AssetType::MutualFund));
        let outcome = resolver.resolve(&identity).await;
        assert!(matches!(outcome, RefreshOutcome::AmbiguousMatch { ref candidates } if candidates.len() == 2));
    }

    #[test]
    fn first_source_wins_a_type() {
        let resolver = IdentityResolver::new(vec![
            Arc::new(FixedSource {
                name: "primary",
                types: vec![AssetType::Stock],
                outcome: RefreshOutcome::NoMatch,
            }),
            Arc::new(FixedSource {
                name: "fallback",
                types: vec![AssetType::Stock, AssetType::Etf],
                outcome: RefreshOutcome::NoMatch,
            }),
        ]);
        assert_eq!(resolver.source_for(AssetType::Stock).map(|s| s.name()), Some("primary"));
        assert_eq!(resolver.source_for(AssetType::Etf).map(|s| s.name()), Some("fallback"));
        assert!(!resolver.served_types().contains(&AssetType::Gratuity));
    }
}
