mod matcher;
mod models;
pub mod nav_feed;
pub mod providers;
mod registry;
mod resolver;
mod source_config;
mod sources;

pub use matcher::{
    best_candidates, normalize_scheme_name, TokenSet, BOILERPLATE_TOKENS,
};
pub use models::{AssetIdentity, Candidate, PriceQuote, RefreshOutcome, SourceKind};
pub use nav_feed::{NavRecord, NavSnapshot};
pub use registry::{default_sources, PriceSourceRegistry};
pub use resolver::IdentityResolver;
pub use source_config::{LoadedPriceSource, PriceSourceConfig, PriceSourceType};
pub use sources::PriceSource;
