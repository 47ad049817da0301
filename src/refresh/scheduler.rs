//! Background task that runs refresh cycles on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::orchestrator::{CycleRun, RefreshOrchestrator};
use crate::config::RefreshConfig;
use crate::duration::format_duration;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("refresh scheduler is already running")]
    AlreadyRunning,
    #[error("refresh cycle period must be greater than zero")]
    ZeroPeriod,
    #[error("refresh scheduler task failed")]
    TaskFailed(#[source] tokio::task::JoinError),
}

/// Period plus a random offset in `[-jitter, +jitter]`, never under one second
/// once jitter is in play.
pub fn next_delay(period: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return period;
    }

    let base_ms = period.as_millis().min(u128::from(u64::MAX)) as i128;
    let jitter_ms = jitter.as_millis().min(u128::from(u64::MAX)) as i128;
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);

    let min_ms = 1_000_i128;
    let max_ms = i128::from(u64::MAX);
    let delay_ms = (base_ms + offset).clamp(min_ms, max_ms) as u64;
    Duration::from_millis(delay_ms)
}

/// Owned handle to the single background refresh task.
///
/// Cycles never overlap: the next one is scheduled only after the previous
/// one returns. `stop` lets the running cycle drain its in-flight lookups.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    period: Duration,
    jitter: Duration,
    run_on_start: bool,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, period: Duration) -> Self {
        Self {
            orchestrator,
            period,
            jitter: Duration::ZERO,
            run_on_start: true,
            shutdown: None,
            task: None,
        }
    }

    pub fn from_config(orchestrator: Arc<RefreshOrchestrator>, config: &RefreshConfig) -> Self {
        Self::new(orchestrator, config.cycle_period)
            .with_jitter(config.jitter)
            .with_run_on_start(config.run_on_start)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the background task. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }

        let (tx, mut rx) = watch::channel(false);
        let orchestrator = Arc::clone(&self.orchestrator);
        let period = self.period;
        let jitter = self.jitter;
        let mut run_now = self.run_on_start;

        info!(
            period = %format_duration(period),
            jitter = %format_duration(jitter),
            "Starting refresh scheduler"
        );

        let task = tokio::spawn(async move {
            loop {
                if run_now {
                    if let CycleRun::AlreadyRunning = orchestrator.run_cycle_until(&rx).await {
                        warn!("Scheduled cycle skipped: a cycle is already running");
                    }
                }
                run_now = true;

                if *rx.borrow() {
                    break;
                }

                let delay = next_delay(period, jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Refresh scheduler stopped");
        });

        self.shutdown = Some(tx);
        self.task = Some(task);
        Ok(())
    }

    /// Stop scheduling and wait for the running cycle, if any, to drain.
    /// Calling it again, or before `start`, does nothing.
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        match self.task.take() {
            Some(task) => task.await.map_err(SchedulerError::TaskFailed),
            None => Ok(()),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(shutdown) = &self.shutdown {
            let _ = shutdown.send(true);
        }
    }
}
