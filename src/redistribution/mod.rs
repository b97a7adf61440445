//! Redistribution Policy - periodic Silo payouts to active wallets
//!
//! Draws a configured fraction of the pool, splits it evenly across wallets
//! active within the recency window, and leaves every flooring remainder in
//! the Silo - grains are integers, fractions are never credited.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::schemas::{RedistributionLogDoc, RunSource};
use crate::ledger::WalletLedger;
use crate::silo::SiloService;
use crate::store::SakaStore;
use crate::types::Result;

/// Redistribution tuning, sourced from deployment configuration
#[derive(Debug, Clone, Copy)]
pub struct RedistributionConfig {
    /// Fraction of the Silo balance distributed per cycle, in [0, 1]
    pub rate: f64,
    /// Recency window (days) qualifying a wallet as active. Config
    /// validation keeps this below the compost threshold, so recipients are
    /// a strict subset of non-compostable wallets.
    pub window_days: i64,
}

/// Pool drawn from a silo balance at the given rate, floored
pub fn distribution_pool(silo_balance: i64, rate: f64) -> i64 {
    if silo_balance <= 0 {
        return 0;
    }
    (silo_balance as f64 * rate).floor() as i64
}

/// The redistribution policy runner
pub struct RedistributionPolicy {
    store: Arc<SakaStore>,
    ledger: WalletLedger,
    silo: SiloService,
    config: RedistributionConfig,
    run_lock: Mutex<()>,
}

impl RedistributionPolicy {
    pub fn new(store: Arc<SakaStore>, config: RedistributionConfig) -> Self {
        let ledger = WalletLedger::new(Arc::clone(&store));
        let silo = SiloService::new(Arc::clone(&store));
        Self {
            store,
            ledger,
            silo,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> RedistributionConfig {
        self.config
    }

    /// Run a redistribution cycle
    ///
    /// No-ops (withdrawing nothing) when the pool floors to zero, no wallet
    /// is active, or the per-wallet share floors to zero. Per-wallet credit
    /// failures are logged and skipped; their unapplied shares return to the
    /// Silo at the end of the run.
    pub async fn run(&self, source: RunSource) -> Result<RedistributionLogDoc> {
        self.run_at(Utc::now(), source).await
    }

    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        source: RunSource,
    ) -> Result<RedistributionLogDoc> {
        let _guard = self.run_lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        let mut log = RedistributionLogDoc::start(&run_id, source);
        self.store.insert_redistribution_log(log.clone()).await?;

        let silo = self.store.silo().await?;
        let pool = distribution_pool(silo.total_balance, self.config.rate);
        log.pool = pool;

        let cutoff = bson::DateTime::from_chrono(now - Duration::days(self.config.window_days));
        let recipients = self.store.wallets_active_since(cutoff).await?;

        if pool == 0 || recipients.is_empty() {
            log.remainder_kept = pool;
            return self.finish(log, run_id).await;
        }

        let share = pool / recipients.len() as i64;
        if share == 0 {
            // Pool too small to give every active wallet a whole grain
            log.remainder_kept = pool;
            return self.finish(log, run_id).await;
        }

        let withdrawal = share * recipients.len() as i64;
        log.per_wallet_amount = share;
        log.remainder_kept = pool - withdrawal;

        self.silo.withdraw(withdrawal).await?;

        let mut unapplied = 0i64;
        for wallet in &recipients {
            match self
                .ledger
                .credit_redistribution(&wallet.user_id, share, "redistribution cycle")
                .await
            {
                Ok(_) => log.wallets_credited += 1,
                Err(e) => {
                    warn!(
                        user_id = %wallet.user_id,
                        share,
                        error = %e,
                        "Redistribution skipped wallet"
                    );
                    log.wallets_skipped += 1;
                    unapplied += share;
                }
            }
        }

        if unapplied > 0 {
            self.store.silo_restore(unapplied).await?;
        }
        log.total_distributed = withdrawal - unapplied;

        if log.wallets_credited > 0 {
            self.store.silo_mark_redistribution_run().await?;
        }

        self.finish(log, run_id).await
    }

    async fn finish(
        &self,
        mut log: RedistributionLogDoc,
        run_id: String,
    ) -> Result<RedistributionLogDoc> {
        log.finished_at = Some(bson::DateTime::now());
        self.store.finalize_redistribution_log(log.clone()).await?;

        info!(
            run_id = %run_id,
            pool = log.pool,
            share = log.per_wallet_amount,
            credited = log.wallets_credited,
            skipped = log.wallets_skipped,
            distributed = log.total_distributed,
            remainder = log.remainder_kept,
            "Redistribution run finished"
        );

        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WalletLedger;

    const RATE: f64 = 0.10;
    const WINDOW: i64 = 30;

    fn policy(store: &Arc<SakaStore>) -> RedistributionPolicy {
        RedistributionPolicy::new(
            Arc::clone(store),
            RedistributionConfig {
                rate: RATE,
                window_days: WINDOW,
            },
        )
    }

    #[test]
    fn test_pool_floors() {
        assert_eq!(distribution_pool(35, 0.10), 3);
        assert_eq!(distribution_pool(9, 0.10), 0);
        assert_eq!(distribution_pool(0, 0.10), 0);
    }

    #[tokio::test]
    async fn test_single_active_wallet_receives_floored_share() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("alice", 10, "content consumption").await.unwrap();
        store.silo_deposit(35).await.unwrap();

        let policy = policy(&store);
        let log = policy.run(RunSource::Scheduler).await.unwrap();

        // floor(35 * 0.10) = 3, one recipient
        assert_eq!(log.pool, 3);
        assert_eq!(log.per_wallet_amount, 3);
        assert_eq!(log.wallets_credited, 1);
        assert_eq!(log.total_distributed, 3);

        let wallet = store.get_wallet("alice").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 13);
        assert_eq!(wallet.total_redistributed, 3);
        assert!(wallet.invariant_holds());

        let silo = store.silo().await.unwrap();
        assert_eq!(silo.total_balance, 32);
        assert!(silo.invariant_holds());
    }

    #[tokio::test]
    async fn test_no_recipients_leaves_pool_untouched() {
        let store = Arc::new(SakaStore::memory_only());
        store.silo_deposit(100).await.unwrap();

        let policy = policy(&store);
        let log = policy.run(RunSource::Scheduler).await.unwrap();

        assert_eq!(log.wallets_credited, 0);
        assert_eq!(log.total_distributed, 0);
        assert_eq!(store.silo().await.unwrap().total_balance, 100);
    }

    #[tokio::test]
    async fn test_remainder_stays_in_silo() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        for user in ["a", "b", "c"] {
            ledger.credit(user, 10, "content consumption").await.unwrap();
        }
        store.silo_deposit(100).await.unwrap();

        let policy = policy(&store);
        let log = policy.run(RunSource::Scheduler).await.unwrap();

        // pool = 10, share = floor(10 / 3) = 3, withdrawal = 9, remainder 1
        assert_eq!(log.pool, 10);
        assert_eq!(log.per_wallet_amount, 3);
        assert_eq!(log.wallets_credited, 3);
        assert_eq!(log.total_distributed, 9);
        assert_eq!(log.remainder_kept, 1);

        let silo = store.silo().await.unwrap();
        assert_eq!(silo.total_balance, 91);
        assert!(silo.invariant_holds());
    }

    #[tokio::test]
    async fn test_share_below_one_grain_is_a_noop() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        for i in 0..5 {
            ledger
                .credit(&format!("user-{i}"), 10, "content consumption")
                .await
                .unwrap();
        }
        // pool = floor(30 * 0.10) = 3, but 5 recipients -> share 0
        store.silo_deposit(30).await.unwrap();

        let policy = policy(&store);
        let log = policy.run(RunSource::Scheduler).await.unwrap();

        assert_eq!(log.pool, 3);
        assert_eq!(log.per_wallet_amount, 0);
        assert_eq!(log.wallets_credited, 0);
        assert_eq!(store.silo().await.unwrap().total_balance, 30);
    }

    #[tokio::test]
    async fn test_inactive_wallets_are_excluded() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("active", 10, "content consumption").await.unwrap();
        ledger.credit("stale", 10, "content consumption").await.unwrap();
        store.silo_deposit(100).await.unwrap();

        // Advance the clock past the window: both wallets drop out
        let policy = policy(&store);
        let later = Utc::now() + Duration::days(WINDOW + 1);
        let log = policy.run_at(later, RunSource::Scheduler).await.unwrap();

        assert_eq!(log.wallets_credited, 0);
        assert_eq!(store.silo().await.unwrap().total_balance, 100);
    }
}
