//! Cycle worker - runs compost and redistribution on schedule
//!
//! The worker owns the live cycles: interval timers fire the scheduled
//! runs, and NATS subscriptions accept manual triggers dispatched by the
//! API. Cycle runs never serve user requests, so a slow scan cannot block
//! the HTTP path.
//!
//! A season closes when a live redistribution follows at least one live
//! compost: the worker accumulates composted totals between closes and
//! stamps a cycle record with both sides of the flow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use crate::compost::{CompostConfig, CompostPolicy};
use crate::db::schemas::RunSource;
use crate::nats::{CycleTrigger, NatsClient, SUBJECT_CYCLE_COMPOST, SUBJECT_CYCLE_REDISTRIBUTE};
use crate::redistribution::{RedistributionConfig, RedistributionPolicy};
use crate::store::SakaStore;
use crate::types::Result;
use crate::Args;

/// Worker configuration, derived from the shared service Args
pub struct WorkerConfig {
    /// Unique worker ID for logging
    pub worker_id: String,
    pub compost_interval: Duration,
    pub redistribution_interval: Duration,
    /// Whether live compost cycles run at all
    pub cycles_enabled: bool,
}

impl WorkerConfig {
    /// Derive the worker configuration from service arguments
    pub fn from_args(args: &Args) -> Self {
        Self {
            worker_id: format!("granary-worker-{}", args.node_id),
            compost_interval: Duration::from_secs(args.economy.compost_interval_hours * 3600),
            redistribution_interval: Duration::from_secs(
                args.economy.redistribution_interval_hours * 3600,
            ),
            cycles_enabled: args.saka_compost_active(),
        }
    }
}

/// Scheduled cycle runner
pub struct CycleWorker {
    config: WorkerConfig,
    compost: CompostPolicy,
    redistribution: RedistributionPolicy,
    store: Arc<SakaStore>,
    nats: Option<NatsClient>,
    /// Grains composted since the last closed season
    pending_composted: i64,
}

impl CycleWorker {
    pub fn new(args: &Args, store: Arc<SakaStore>, nats: Option<NatsClient>) -> Self {
        let compost = CompostPolicy::new(
            Arc::clone(&store),
            CompostConfig {
                rate: args.economy.compost_rate,
                inactivity_threshold_days: args.economy.inactivity_threshold_days,
            },
        );
        let redistribution = RedistributionPolicy::new(
            Arc::clone(&store),
            RedistributionConfig {
                rate: args.economy.redistribution_rate,
                window_days: args.economy.redistribution_window_days,
            },
        );

        Self {
            config: WorkerConfig::from_args(args),
            compost,
            redistribution,
            store,
            nats,
            pending_composted: 0,
        }
    }

    /// Run the scheduling loop until the process is stopped
    pub async fn run(mut self) -> Result<()> {
        if !self.config.cycles_enabled {
            info!(
                "Worker {} idle: compost cycles disabled for this deployment",
                self.config.worker_id
            );
            // Stay alive so a restart with cycles enabled is a config change,
            // not an orchestration change
            std::future::pending::<()>().await;
            return Ok(());
        }

        // First scheduled run waits a full interval; catch-up on deploy is
        // an explicit admin trigger, not an automatic surprise.
        let mut compost_tick = interval_at(
            Instant::now() + self.config.compost_interval,
            self.config.compost_interval,
        );
        let mut redistribution_tick = interval_at(
            Instant::now() + self.config.redistribution_interval,
            self.config.redistribution_interval,
        );

        let mut compost_sub = match &self.nats {
            Some(nats) => Some(nats.subscribe(SUBJECT_CYCLE_COMPOST).await?),
            None => None,
        };
        let mut redistribution_sub = match &self.nats {
            Some(nats) => Some(nats.subscribe(SUBJECT_CYCLE_REDISTRIBUTE).await?),
            None => None,
        };

        info!(
            "Worker {} scheduling cycles (compost every {}s, redistribution every {}s, triggers: {})",
            self.config.worker_id,
            self.config.compost_interval.as_secs(),
            self.config.redistribution_interval.as_secs(),
            if self.nats.is_some() { "nats" } else { "disabled" },
        );

        loop {
            tokio::select! {
                _ = compost_tick.tick() => {
                    self.run_compost(RunSource::Scheduler, false).await;
                }
                _ = redistribution_tick.tick() => {
                    self.run_redistribution(RunSource::Scheduler).await;
                }
                Some(msg) = next_message(&mut compost_sub) => {
                    self.handle_trigger(&msg.payload).await;
                }
                Some(msg) = next_message(&mut redistribution_sub) => {
                    self.handle_trigger(&msg.payload).await;
                }
            }
        }
    }

    /// Parse and dispatch a manual trigger from the API
    async fn handle_trigger(&mut self, payload: &[u8]) {
        let trigger: CycleTrigger = match serde_json::from_slice(payload) {
            Ok(t) => t,
            Err(e) => {
                error!("Discarding malformed cycle trigger: {}", e);
                return;
            }
        };

        info!(
            trigger_id = %trigger.trigger_id,
            kind = ?trigger.kind,
            dry_run = trigger.dry_run,
            "Cycle trigger received"
        );

        match trigger.kind {
            crate::nats::CycleKind::Compost => {
                self.run_compost(trigger.source, trigger.dry_run).await;
            }
            crate::nats::CycleKind::Redistribute => {
                self.run_redistribution(trigger.source).await;
            }
        }
    }

    /// Run one compost cycle; failures are logged and left for the next tick
    async fn run_compost(&mut self, source: RunSource, dry_run: bool) {
        match self.compost.run(dry_run, source).await {
            Ok(log) => {
                if !dry_run && log.total_composted > 0 {
                    self.pending_composted += log.total_composted;
                }
            }
            Err(e) => {
                // Committed per-wallet transactions stand; the next
                // scheduled run resumes where this one gave up
                error!("Compost run failed: {}", e);
            }
        }
    }

    /// Run one redistribution cycle and close the season when a live
    /// compost preceded it
    async fn run_redistribution(&mut self, source: RunSource) {
        match self.redistribution.run(source).await {
            Ok(log) => {
                if log.wallets_credited > 0 && self.pending_composted > 0 {
                    match self
                        .store
                        .silo_close_cycle(self.pending_composted, log.total_distributed)
                        .await
                    {
                        Ok(cycle) => {
                            info!(
                                cycle = cycle.cycle_number,
                                composted = cycle.composted,
                                redistributed = cycle.redistributed,
                                "Season closed"
                            );
                            self.pending_composted = 0;
                        }
                        Err(e) => warn!("Failed to close cycle: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Redistribution run failed: {}", e);
            }
        }
    }
}

/// Next message from an optional subscription; pends forever when absent
/// so the select arm simply never fires without NATS.
async fn next_message(
    sub: &mut Option<async_nats::Subscriber>,
) -> Option<async_nats::Message> {
    match sub {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WalletLedger;
    use clap::Parser;

    fn args() -> Args {
        Args::parse_from(["granary", "--dev-mode", "true"])
    }

    #[test]
    fn test_worker_config_from_args() {
        let config = WorkerConfig::from_args(&args());
        assert_eq!(config.compost_interval, Duration::from_secs(24 * 3600));
        assert!(config.cycles_enabled);
    }

    #[tokio::test]
    async fn test_season_closes_after_compost_and_redistribution() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        // An active wallet to receive, plus composted grains in the silo
        ledger.credit("active", 100, "content consumption").await.unwrap();
        let mut worker = CycleWorker::new(&args(), Arc::clone(&store), None);

        // Simulate a live compost having moved grains
        store.silo_deposit(50).await.unwrap();
        worker.pending_composted = 50;

        worker.run_redistribution(RunSource::Scheduler).await;

        assert_eq!(worker.pending_composted, 0);
        let silo = store.silo().await.unwrap();
        assert_eq!(silo.total_cycles, 1);

        let cycles = store.list_cycles(10).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].composted, 50);
        // pool = floor(50 * 0.10) = 5, one recipient
        assert_eq!(cycles[0].redistributed, 5);
    }

    #[tokio::test]
    async fn test_noop_redistribution_keeps_season_open() {
        let store = Arc::new(SakaStore::memory_only());
        let mut worker = CycleWorker::new(&args(), Arc::clone(&store), None);

        store.silo_deposit(50).await.unwrap();
        worker.pending_composted = 50;

        // No active wallets: nothing credited, season stays open
        worker.run_redistribution(RunSource::Scheduler).await;

        assert_eq!(worker.pending_composted, 50);
        assert_eq!(store.silo().await.unwrap().total_cycles, 0);
    }

    #[tokio::test]
    async fn test_malformed_trigger_is_discarded() {
        let store = Arc::new(SakaStore::memory_only());
        let mut worker = CycleWorker::new(&args(), Arc::clone(&store), None);

        // Must not panic or mutate anything
        worker.handle_trigger(b"not json").await;
        assert_eq!(store.silo().await.unwrap().total_composted, 0);
    }
}
