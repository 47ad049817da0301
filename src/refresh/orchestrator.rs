//! Runs refresh cycles and manual refreshes against the asset store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{future, stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::policy::{DueCriteria, RefreshPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::market_data::{AssetIdentity, IdentityResolver, RefreshOutcome};
use crate::models::{Asset, AssetType, FailureReason, Id};
use crate::storage::{AssetStore, PriceStateUpdate};

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Result of asking for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleRun {
    Completed(CycleReport),
    /// Another cycle held the run flag; nothing was read or written.
    AlreadyRunning,
}

/// Counts for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub due: usize,
    pub updated: usize,
    pub failed: HashMap<FailureReason, usize>,
    pub skipped: usize,
    pub store_errors: usize,
    /// Due assets never dispatched because shutdown was requested.
    pub not_started: usize,
}

impl CycleReport {
    pub fn failed_with(&self, reason: FailureReason) -> usize {
        self.failed.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    fn record(&mut self, result: &Result<Option<PriceStateUpdate>>) {
        match result {
            Ok(Some(PriceStateUpdate::Succeeded { .. })) => self.updated += 1,
            Ok(Some(PriceStateUpdate::Failed { reason, .. })) => {
                *self.failed.entry(*reason).or_default() += 1;
            }
            Ok(None) => self.skipped += 1,
            Err(_) => self.store_errors += 1,
        }
    }
}

/// Clears the cycle flag when the cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks one asset as being refreshed until dropped.
struct AssetClaim<'a> {
    in_flight: &'a StdMutex<HashSet<Id>>,
    id: Id,
}

impl Drop for AssetClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.id);
    }
}

pub struct RefreshOrchestrator {
    store: Arc<dyn AssetStore>,
    resolver: Arc<IdentityResolver>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    lookup_timeout: Duration,
    max_concurrency: usize,
    cycle_running: AtomicBool,
    in_flight: StdMutex<HashSet<Id>>,
}

impl RefreshOrchestrator {
    pub fn new(store: Arc<dyn AssetStore>, resolver: Arc<IdentityResolver>) -> Self {
        Self {
            store,
            resolver,
            clock: Arc::new(SystemClock),
            policy: RefreshPolicy::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cycle_running: AtomicBool::new(false),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    pub fn from_config(
        store: Arc<dyn AssetStore>,
        resolver: Arc<IdentityResolver>,
        config: &ResolvedConfig,
    ) -> Self {
        Self::new(store, resolver)
            .with_policy(config.refresh_policy())
            .with_lookup_timeout(config.refresh.lookup_timeout)
            .with_max_concurrency(config.refresh.max_concurrency)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn due_criteria(&self) -> DueCriteria {
        DueCriteria {
            policy: self.policy,
            refreshable_types: self.resolver.served_types(),
        }
    }

    /// Run one cycle over every due asset.
    pub async fn run_cycle(&self) -> CycleRun {
        let (_never, shutdown) = watch::channel(false);
        self.run_cycle_until(&shutdown).await
    }

    /// Run one cycle, dispatching no new assets once `shutdown` reads true.
    /// Lookups already started finish (or time out) and are written.
    pub async fn run_cycle_until(&self, shutdown: &watch::Receiver<bool>) -> CycleRun {
        let Some(_guard) = CycleGuard::acquire(&self.cycle_running) else {
            info!("Previous refresh cycle still running, skipping");
            return CycleRun::AlreadyRunning;
        };

        let now = self.clock.now();
        let mut report = CycleReport::default();

        let due = match self
            .store
            .find_assets_due_for_refresh(now, &self.due_criteria())
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to select assets due for refresh");
                report.store_errors += 1;
                return CycleRun::Completed(report);
            }
        };

        report.due = due.len();
        if due.is_empty() {
            debug!("No assets due for refresh");
            return CycleRun::Completed(report);
        }

        info!(due = report.due, "Starting refresh cycle");
        let due_types: HashSet<AssetType> = due.iter().map(|asset| asset.asset_type).collect();
        self.resolver.warm_up_for(&due_types).await;

        let results: Vec<Result<Option<PriceStateUpdate>>> = stream::iter(due)
            .take_while(|_| future::ready(!*shutdown.borrow()))
            .map(|asset| self.refresh_in_cycle(asset))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for result in &results {
            report.record(result);
        }
        report.not_started = report.due - results.len();

        info!(
            due = report.due,
            updated = report.updated,
            failed = report.total_failed(),
            skipped = report.skipped,
            store_errors = report.store_errors,
            not_started = report.not_started,
            "Refresh cycle finished"
        );
        CycleRun::Completed(report)
    }

    /// Refresh one asset now, whatever its schedule or `auto_refresh` flag.
    pub async fn refresh_asset(&self, id: &Id) -> Result<RefreshOutcome> {
        let Some(asset) = self.store.get_asset(id).await? else {
            bail!("Asset not found: {id}");
        };
        let Some(_claim) = self.claim(id) else {
            return Ok(RefreshOutcome::skipped("refresh in progress"));
        };

        let (outcome, update) = self.attempt(&asset).await;
        if let Some(update) = &update {
            self.store
                .update_asset_price_state(id, update)
                .await
                .with_context(|| format!("Failed to store price state for {id}"))?;
        }
        log_outcome(&asset, &outcome);
        Ok(outcome)
    }

    fn claim(&self, id: &Id) -> Option<AssetClaim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.insert(id.clone()).then(|| AssetClaim {
            in_flight: &self.in_flight,
            id: id.clone(),
        })
    }

    async fn refresh_in_cycle(&self, asset: Asset) -> Result<Option<PriceStateUpdate>> {
        let Some(_claim) = self.claim(&asset.id) else {
            debug!(asset_id = %asset.id, "Asset is being refreshed manually, skipping");
            return Ok(None);
        };

        let (outcome, update) = self.attempt(&asset).await;
        if let Some(update) = &update {
            if let Err(e) = self.store.update_asset_price_state(&asset.id, update).await {
                error!(asset_id = %asset.id, error = %format!("{e:#}"), "Failed to store price state");
                return Err(e);
            }
        }
        log_outcome(&asset, &outcome);
        Ok(update)
    }

    /// Resolve within the lookup timeout and decide what to write.
    async fn attempt(&self, asset: &Asset) -> (RefreshOutcome, Option<PriceStateUpdate>) {
        let identity = AssetIdentity::from_asset(asset);

        let outcome =
            match tokio::time::timeout(self.lookup_timeout, self.resolver.resolve(&identity)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    let detail = format!("lookup timed out after {:?}", self.lookup_timeout);
                    let update = PriceStateUpdate::Failed {
                        reason: FailureReason::Timeout,
                        detail: detail.clone(),
                        at: self.clock.now(),
                    };
                    return (RefreshOutcome::unavailable(detail), Some(update));
                }
            };

        let at = self.clock.now();
        let update = match &outcome {
            RefreshOutcome::Success { quote } => Some(PriceStateUpdate::Succeeded {
                price: quote.value,
                matched_identifier: quote.matched_identifier.clone(),
                at,
            }),
            other => other
                .failure()
                .map(|(reason, detail)| PriceStateUpdate::Failed { reason, detail, at }),
        };
        (outcome, update)
    }
}

fn log_outcome(asset: &Asset, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Success { quote } => info!(
            asset_id = %asset.id,
            source = %quote.source,
            price = %quote.value,
            matched = %quote.matched_identifier,
            "Price updated"
        ),
        RefreshOutcome::Skipped { reason } => {
            debug!(asset_id = %asset.id, reason = %reason, "Price refresh skipped")
        }
        other => {
            let detail = other.failure().map(|(_, d)| d).unwrap_or_default();
            warn!(
                asset_id = %asset.id,
                asset_type = %asset.asset_type,
                outcome = other.label(),
                detail = %detail,
                "Price refresh failed"
            );
        }
    }
}
