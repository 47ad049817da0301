#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pricekeep::clock::ManualClock;
use pricekeep::market_data::{
    AssetIdentity, IdentityResolver, PriceQuote, PriceSource, RefreshOutcome, SourceKind,
};
use pricekeep::models::AssetType;
use pricekeep::refresh::RefreshOrchestrator;
use pricekeep::storage::{AssetStore, MemoryAssetStore};
use rust_decimal::Decimal;

/// A trimmed `NAVAll.txt` with a direct/regular pair and a few ISIN-less rows.
pub const NAV_FEED: &str = "\
Scheme Code;ISIN Div Payout/ ISIN Growth;ISIN Div Reinvestment;Scheme Name;Net Asset Value;Date

Open Ended Schemes(Equity Scheme - Flexi Cap Fund)

PPFAS Mutual Fund

122639;INF879O01027;-;Parag Parikh Flexi Cap Fund - Direct Plan - Growth;83.1234;15-Oct-2026
122640;INF879O01019;-;Parag Parikh Flexi Cap Fund - Regular Plan - Growth;76.5000;15-Oct-2026

Axis Mutual Fund

120503;INF846K01EW2;INF846K01EX0;Axis ELSS Tax Saver Fund - Direct Plan - Growth;98.7700;15-Oct-2026
100033;-;-;Aditya Birla Sun Life Gold Fund;22.5000;14-Oct-2026
";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

pub fn quote(value: Decimal, identifier: &str) -> RefreshOutcome {
    RefreshOutcome::Success {
        quote: PriceQuote {
            value,
            as_of: t0(),
            matched_identifier: identifier.to_string(),
            source_kind: SourceKind::Static,
            source: "mock".to_string(),
            currency: Some("INR".to_string()),
        },
    }
}

/// Price source returning a preset outcome, optionally after a delay.
pub struct MockPriceSource {
    name: String,
    asset_types: Vec<AssetType>,
    outcome: Mutex<RefreshOutcome>,
    delay: Duration,
    calls: AtomicUsize,
    warm_ups: AtomicUsize,
}

impl MockPriceSource {
    pub fn new(asset_types: Vec<AssetType>, outcome: RefreshOutcome) -> Self {
        Self {
            name: "mock".to_string(),
            asset_types,
            outcome: Mutex::new(outcome),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            warm_ups: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_outcome(&self, outcome: RefreshOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn warm_ups(&self) -> usize {
        self.warm_ups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Static
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn lookup(&self, _identity: &AssetIdentity) -> RefreshOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.lock().unwrap().clone()
    }

    async fn warm_up(&self) -> anyhow::Result<()> {
        self.warm_ups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryAssetStore>,
    pub source: Arc<MockPriceSource>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

/// Orchestrator over a memory store and one mock source serving mutual funds.
pub fn harness(source: MockPriceSource) -> Harness {
    harness_with(source, |orchestrator| orchestrator)
}

pub fn harness_with(
    source: MockPriceSource,
    configure: impl FnOnce(RefreshOrchestrator) -> RefreshOrchestrator,
) -> Harness {
    let store = Arc::new(MemoryAssetStore::new());
    let source = Arc::new(source);
    let clock = Arc::new(ManualClock::new(t0()));
    let resolver = Arc::new(IdentityResolver::new(vec![
        Arc::clone(&source) as Arc<dyn PriceSource>
    ]));
    let orchestrator = RefreshOrchestrator::new(Arc::clone(&store) as Arc<dyn AssetStore>, resolver)
        .with_clock(Arc::clone(&clock) as Arc<dyn pricekeep::clock::Clock>);
    Harness {
        store,
        source,
        clock,
        orchestrator: Arc::new(configure(orchestrator)),
    }
}
