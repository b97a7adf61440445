//! Compost Policy - decay of inactive wallets into the Silo
//!
//! A scheduled scan finds wallets past the inactivity threshold and moves a
//! configured fraction of each balance into the common pool. Dry runs walk
//! the identical code path with mutation suppressed, so the preview an admin
//! approves is exactly what the live run will do.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::schemas::{CompostLogDoc, RunSource, WalletDoc};
use crate::ledger::WalletLedger;
use crate::silo::SiloService;
use crate::store::SakaStore;
use crate::types::Result;

/// Compost tuning, sourced from deployment configuration
#[derive(Debug, Clone, Copy)]
pub struct CompostConfig {
    /// Fraction of the balance composted per cycle, in [0, 1]
    pub rate: f64,
    /// Days without activity before a wallet becomes eligible
    pub inactivity_threshold_days: i64,
}

/// Per-wallet preview served by `GET /api/saka/compost-preview/`
#[derive(Debug, Serialize)]
pub struct CompostPreview {
    pub eligible: bool,
    /// Grains that would move in the next cycle
    pub amount: i64,
    /// Days of continued inactivity before eligibility; 0 when eligible
    pub days_until_eligible: i64,
    pub last_activity_date: Option<String>,
}

/// Grains composted from a balance at the given rate, floored - small
/// balances legitimately decay by zero and stay eligible untouched.
pub fn compost_amount(balance: i64, rate: f64) -> i64 {
    if balance <= 0 {
        return 0;
    }
    (balance as f64 * rate).floor() as i64
}

/// The compost policy runner
pub struct CompostPolicy {
    store: Arc<SakaStore>,
    ledger: WalletLedger,
    silo: SiloService,
    config: CompostConfig,
    /// A wallet must never be processed by two compost runs at once
    run_lock: Mutex<()>,
}

impl CompostPolicy {
    pub fn new(store: Arc<SakaStore>, config: CompostConfig) -> Self {
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

    pub fn config(&self) -> CompostConfig {
        self.config
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.config.inactivity_threshold_days)
    }

    fn wallet_eligible(&self, wallet: &WalletDoc, now: DateTime<Utc>) -> bool {
        wallet.last_activity_date.to_chrono() <= self.cutoff(now)
    }

    /// Preview one wallet's standing against the policy, with no mutation
    pub async fn preview(&self, user_id: &str) -> Result<CompostPreview> {
        self.preview_at(user_id, Utc::now()).await
    }

    pub async fn preview_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<CompostPreview> {
        let wallet = match self.store.get_wallet(user_id).await? {
            Some(w) => w,
            None => {
                // No wallet yet: nothing to compost, full threshold ahead
                return Ok(CompostPreview {
                    eligible: false,
                    amount: 0,
                    days_until_eligible: self.config.inactivity_threshold_days,
                    last_activity_date: None,
                });
            }
        };

        let eligible = self.wallet_eligible(&wallet, now);
        let elapsed = (now - wallet.last_activity_date.to_chrono()).num_days();
        let days_until_eligible = (self.config.inactivity_threshold_days - elapsed).max(0);

        Ok(CompostPreview {
            eligible,
            amount: if eligible {
                compost_amount(wallet.balance, self.config.rate)
            } else {
                0
            },
            days_until_eligible,
            last_activity_date: Some(wallet.last_activity_date.to_chrono().to_rfc3339()),
        })
    }

    /// Run a compost cycle over all wallets
    ///
    /// Dry runs compute eligibility and amounts but commit nothing - they
    /// never even start a mutating operation. Live runs tolerate per-wallet
    /// failures: the failed wallet is logged and skipped, the batch
    /// continues, and committed wallets stand.
    pub async fn run(&self, dry_run: bool, source: RunSource) -> Result<CompostLogDoc> {
        self.run_at(Utc::now(), dry_run, source).await
    }

    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
        source: RunSource,
    ) -> Result<CompostLogDoc> {
        let _guard = self.run_lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        let mut log = CompostLogDoc::start(&run_id, dry_run, source);
        self.store.insert_compost_log(log.clone()).await?;

        let cutoff = bson::DateTime::from_chrono(self.cutoff(now));
        let candidates = self.store.wallets_inactive_since(cutoff).await?;
        log.wallets_scanned = candidates.len() as i64;

        for wallet in &candidates {
            let amount = compost_amount(wallet.balance, self.config.rate);
            if amount == 0 {
                // Stays eligible, nothing moves
                continue;
            }

            if dry_run {
                log.wallets_affected += 1;
                log.total_composted += amount;
                continue;
            }

            match self.compost_wallet(&wallet.user_id, amount).await {
                Ok(()) => {
                    log.wallets_affected += 1;
                    log.total_composted += amount;
                }
                Err(e) => {
                    warn!(
                        user_id = %wallet.user_id,
                        amount,
                        error = %e,
                        "Compost skipped wallet"
                    );
                    log.wallets_skipped += 1;
                }
            }
        }

        if !dry_run && log.wallets_affected > 0 {
            self.store.silo_mark_compost_run().await?;
        }

        log.finished_at = Some(bson::DateTime::now());
        self.store.finalize_compost_log(log.clone()).await?;

        info!(
            run_id = %run_id,
            dry_run,
            scanned = log.wallets_scanned,
            affected = log.wallets_affected,
            skipped = log.wallets_skipped,
            composted = log.total_composted,
            "Compost run finished"
        );

        Ok(log)
    }

    /// Move one wallet's decay into the Silo. The debit and the deposit are
    /// individually atomic; a deposit failure reverses the debit so the
    /// grains are never lost in between.
    async fn compost_wallet(&self, user_id: &str, amount: i64) -> Result<()> {
        self.ledger
            .compost_debit(user_id, amount, "compost cycle")
            .await?;

        if let Err(e) = self.silo.deposit(amount).await {
            self.ledger.rollback_compost(user_id, amount).await?;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WalletLedger;

    const RATE: f64 = 0.10;
    const THRESHOLD: i64 = 90;

    fn policy(store: &Arc<SakaStore>) -> CompostPolicy {
        CompostPolicy::new(
            Arc::clone(store),
            CompostConfig {
                rate: RATE,
                inactivity_threshold_days: THRESHOLD,
            },
        )
    }

    /// Wallets are created active "now", so tests advance the clock instead
    /// of backdating activity.
    fn days_later(days: i64) -> DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    #[test]
    fn test_compost_amount_floors() {
        assert_eq!(compost_amount(350, 0.10), 35);
        assert_eq!(compost_amount(9, 0.10), 0);
        assert_eq!(compost_amount(19, 0.10), 1);
        assert_eq!(compost_amount(0, 0.10), 0);
    }

    #[tokio::test]
    async fn test_inactive_wallet_composts_into_silo() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("alice", 350, "content consumption").await.unwrap();

        let policy = policy(&store);
        let log = policy
            .run_at(days_later(91), false, RunSource::Scheduler)
            .await
            .unwrap();

        assert_eq!(log.wallets_affected, 1);
        assert_eq!(log.total_composted, 35);

        let wallet = store.get_wallet("alice").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 315);
        assert_eq!(wallet.total_composted, 35);
        assert!(wallet.invariant_holds());

        let silo = store.silo().await.unwrap();
        assert_eq!(silo.total_balance, 35);
        assert_eq!(silo.total_composted, 35);
    }

    #[tokio::test]
    async fn test_active_wallet_is_untouched() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("bob", 500, "content consumption").await.unwrap();

        let policy = policy(&store);
        let log = policy
            .run_at(days_later(30), false, RunSource::Scheduler)
            .await
            .unwrap();

        assert_eq!(log.wallets_scanned, 0);
        assert_eq!(log.wallets_affected, 0);
        assert_eq!(
            store.get_wallet("bob").await.unwrap().unwrap().balance,
            500
        );
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing_and_is_idempotent() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("carol", 350, "content consumption").await.unwrap();

        let policy = policy(&store);
        let now = days_later(120);

        let first = policy.run_at(now, true, RunSource::Manual).await.unwrap();
        let second = policy.run_at(now, true, RunSource::Manual).await.unwrap();

        assert!(first.dry_run);
        assert_eq!(first.wallets_affected, second.wallets_affected);
        assert_eq!(first.total_composted, second.total_composted);
        assert_eq!(first.total_composted, 35);

        // Nothing moved
        let wallet = store.get_wallet("carol").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 350);
        assert_eq!(wallet.total_composted, 0);
        assert_eq!(store.silo().await.unwrap().total_balance, 0);
    }

    #[tokio::test]
    async fn test_small_balance_floors_to_zero_and_stays_eligible() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("dora", 9, "content consumption").await.unwrap();

        let policy = policy(&store);
        let log = policy
            .run_at(days_later(100), false, RunSource::Scheduler)
            .await
            .unwrap();

        // Scanned, not affected; balance untouched
        assert_eq!(log.wallets_scanned, 1);
        assert_eq!(log.wallets_affected, 0);
        assert_eq!(store.get_wallet("dora").await.unwrap().unwrap().balance, 9);

        // Still eligible next cycle
        let preview = policy.preview_at("dora", days_later(130)).await.unwrap();
        assert!(preview.eligible);
        assert_eq!(preview.amount, 0);
    }

    #[tokio::test]
    async fn test_compost_does_not_reset_activity() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("ed", 1000, "content consumption").await.unwrap();

        let policy = policy(&store);
        policy
            .run_at(days_later(91), false, RunSource::Scheduler)
            .await
            .unwrap();
        // Still inactive at the same clock: remains eligible and decays again
        let log = policy
            .run_at(days_later(92), false, RunSource::Scheduler)
            .await
            .unwrap();

        assert_eq!(log.wallets_affected, 1);
        let wallet = store.get_wallet("ed").await.unwrap().unwrap();
        // 1000 -> 900 -> 810
        assert_eq!(wallet.balance, 810);
        assert_eq!(wallet.total_composted, 190);
    }

    #[tokio::test]
    async fn test_preview_before_threshold() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("fay", 100, "content consumption").await.unwrap();

        let policy = policy(&store);
        let preview = policy.preview_at("fay", days_later(60)).await.unwrap();

        assert!(!preview.eligible);
        assert_eq!(preview.amount, 0);
        assert_eq!(preview.days_until_eligible, 30);
    }

    #[tokio::test]
    async fn test_preview_without_wallet() {
        let store = Arc::new(SakaStore::memory_only());
        let policy = policy(&store);

        let preview = policy.preview("ghost").await.unwrap();
        assert!(!preview.eligible);
        assert_eq!(preview.days_until_eligible, THRESHOLD);
        assert!(preview.last_activity_date.is_none());
    }

    #[tokio::test]
    async fn test_run_logs_are_recorded() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));
        ledger.credit("gil", 350, "content consumption").await.unwrap();

        let policy = policy(&store);
        policy.run_at(days_later(91), true, RunSource::Manual).await.unwrap();
        policy
            .run_at(days_later(92), false, RunSource::Scheduler)
            .await
            .unwrap();

        let logs = store.list_compost_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().any(|l| l.dry_run && l.source == RunSource::Manual));
        assert!(logs
            .iter()
            .any(|l| !l.dry_run && l.source == RunSource::Scheduler));
        assert!(logs.iter().all(|l| l.finished_at.is_some()));
    }
}
