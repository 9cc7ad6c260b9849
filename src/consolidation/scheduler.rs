//! Periodic consolidation
//!
//! Runs the safety check and a consolidation cycle on a fixed interval. Cycles
//! never overlap: the next tick is only handled after the previous cycle,
//! including its confirmation wait, has finished.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::engine::{ConsolidationEngine, CycleOutcome};
use crate::config::ScheduleConfig;

/// Counters over all cycles run by a scheduler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub confirmed: u64,
    pub handed_off: u64,
    pub below_threshold: u64,
    pub confirmation_failures: u64,
    /// Ticks skipped because the safety check failed or no destination is set
    pub skipped: u64,
    /// Ticks that ended in a collaborator error
    pub faults: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        self.last_cycle = Some(Utc::now());
        match outcome {
            CycleOutcome::NoDestination => self.skipped += 1,
            CycleOutcome::BelowThreshold { .. } => self.below_threshold += 1,
            CycleOutcome::HandedOff { .. } => self.handed_off += 1,
            CycleOutcome::Confirmed { .. } => self.confirmed += 1,
            CycleOutcome::ConfirmationFailed { .. } => self.confirmation_failures += 1,
        }
    }
}

/// Drives the engine on a fixed interval
pub struct CycleScheduler {
    engine: Arc<ConsolidationEngine>,
    interval: Duration,
    run_safety_check: bool,
    stats: SchedulerStats,
}

impl CycleScheduler {
    pub fn new(engine: Arc<ConsolidationEngine>, config: &ScheduleConfig) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(config.interval_secs),
            run_safety_check: config.run_safety_check,
            stats: SchedulerStats::default(),
        }
    }

    /// Run cycles until a shutdown signal arrives
    pub async fn start(&mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Starting consolidation scheduler (interval: {}s, threshold: {})",
            self.interval.as_secs(),
            self.engine.settings().threshold
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Consolidation scheduler shutting down");
                    break;
                }
            }
        }

        info!("Scheduler stats: {:?}", self.stats);
    }

    /// One scheduled run: safety check, then a cycle
    ///
    /// Errors are logged here; the next tick is the retry.
    pub async fn tick(&mut self) -> Option<CycleOutcome> {
        if self.run_safety_check {
            match self.engine.perform_safety_check().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Safety check failed, skipping cycle");
                    self.stats.skipped += 1;
                    return None;
                }
                Err(e) => {
                    error!("Safety check failed: {}", e);
                    self.stats.faults += 1;
                    return None;
                }
            }
        }

        match self.engine.run_cycle().await {
            Ok(outcome) => {
                info!("Cycle finished: {}", outcome);
                self.stats.record(&outcome);
                Some(outcome)
            }
            Err(e) => {
                error!("Consolidation cycle failed: {}", e);
                self.stats.faults += 1;
                None
            }
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
