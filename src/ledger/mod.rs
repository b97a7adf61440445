//! Wallet Ledger - authoritative custody of each user's SAKA balance
//!
//! Every mutation pairs an atomic balance update with one immutable ledger
//! entry. Spends that fund a side effect (vote, boost) get a compensation
//! path: if the side effect fails after the debit committed, the debit is
//! reversed and its entry withdrawn, leaving no partial state.

use std::sync::Arc;

use tracing::debug;

use crate::db::schemas::{EntryKind, LedgerEntryDoc, WalletDoc};
use crate::store::SakaStore;
use crate::types::{GranaryError, Result};

/// Ledger facade over the store's wallet primitives
#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<SakaStore>,
}

impl WalletLedger {
    pub fn new(store: Arc<SakaStore>) -> Self {
        Self { store }
    }

    fn check_amount(amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(GranaryError::BadRequest(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        Ok(())
    }

    /// Harvest: credit a wallet for user activity. Creates the wallet on
    /// first contact and refreshes its activity date.
    pub async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<WalletDoc> {
        Self::check_amount(amount)?;

        let wallet = self
            .store
            .credit_balance(user_id, amount, EntryKind::Earn, true)
            .await?;
        self.store
            .append_entry(LedgerEntryDoc::new(user_id, EntryKind::Earn, amount, reason))
            .await?;

        debug!(user_id, amount, balance = wallet.balance, "Grains harvested");
        Ok(wallet)
    }

    /// Credit a redistribution payout. The wallet must already exist, and
    /// receiving a payout does not count as user activity.
    pub async fn credit_redistribution(
        &self,
        user_id: &str,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<WalletDoc> {
        Self::check_amount(amount)?;

        let wallet = self
            .store
            .credit_balance(user_id, amount, EntryKind::RedistributeIn, false)
            .await?;
        self.store
            .append_entry(LedgerEntryDoc::new(
                user_id,
                EntryKind::RedistributeIn,
                amount,
                reason,
            ))
            .await?;

        Ok(wallet)
    }

    /// Plant: debit a wallet to fund an action. Fails with
    /// `InsufficientBalance` when the balance cannot cover the amount, and
    /// refreshes the activity date on success.
    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<WalletDoc> {
        Self::check_amount(amount)?;

        let wallet = self
            .store
            .debit_balance(user_id, amount, EntryKind::Spend, true)
            .await?;
        self.store
            .append_entry(LedgerEntryDoc::new(
                user_id,
                EntryKind::Spend,
                amount,
                reason,
            ))
            .await?;

        debug!(user_id, amount, balance = wallet.balance, "Grains planted");
        Ok(wallet)
    }

    /// Compost: decay grains out of an inactive wallet. Deliberately does
    /// NOT refresh the activity date - an inactive wallet stays eligible
    /// for subsequent cycles until it wakes up or empties.
    pub async fn compost_debit(
        &self,
        user_id: &str,
        amount: i64,
        reason: impl Into<String>,
    ) -> Result<WalletDoc> {
        Self::check_amount(amount)?;

        let wallet = self
            .store
            .debit_balance(user_id, amount, EntryKind::Compost, false)
            .await?;
        self.store
            .append_entry(LedgerEntryDoc::new(
                user_id,
                EntryKind::Compost,
                amount,
                reason,
            ))
            .await?;

        Ok(wallet)
    }

    /// Compensation: reverse a spend whose funded side effect failed.
    pub async fn rollback_spend(&self, user_id: &str, amount: i64) -> Result<()> {
        self.store
            .undo_debit(user_id, amount, EntryKind::Spend)
            .await?;
        self.store
            .remove_latest_entry(user_id, EntryKind::Spend, amount)
            .await?;
        debug!(user_id, amount, "Spend rolled back");
        Ok(())
    }

    /// Compensation: reverse a compost debit whose silo deposit failed.
    pub async fn rollback_compost(&self, user_id: &str, amount: i64) -> Result<()> {
        self.store
            .undo_debit(user_id, amount, EntryKind::Compost)
            .await?;
        self.store
            .remove_latest_entry(user_id, EntryKind::Compost, amount)
            .await?;
        Ok(())
    }

    /// Read-only wallet view
    pub async fn snapshot(&self, user_id: &str) -> Result<Option<WalletDoc>> {
        self.store.get_wallet(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SakaStore;

    fn ledger() -> WalletLedger {
        WalletLedger::new(Arc::new(SakaStore::memory_only()))
    }

    #[tokio::test]
    async fn test_credit_debit_cycle_keeps_invariant() {
        let ledger = ledger();

        let w = ledger.credit("alice", 100, "content consumption").await.unwrap();
        assert_eq!(w.balance, 100);
        assert!(w.invariant_holds());

        let w = ledger.debit("alice", 30, "vote").await.unwrap();
        assert_eq!(w.balance, 70);
        assert_eq!(w.total_harvested, 100);
        assert_eq!(w.total_planted, 30);
        assert!(w.invariant_holds());
    }

    #[tokio::test]
    async fn test_debit_rejects_overdraft_without_mutation() {
        let ledger = ledger();
        ledger.credit("bob", 5, "content consumption").await.unwrap();

        let err = ledger.debit("bob", 15, "vote").await.unwrap_err();
        assert!(matches!(
            err,
            GranaryError::InsufficientBalance {
                required: 15,
                available: 5
            }
        ));

        let w = ledger.snapshot("bob").await.unwrap().unwrap();
        assert_eq!(w.balance, 5);
        assert_eq!(w.total_planted, 0);
    }

    #[tokio::test]
    async fn test_amounts_must_be_positive() {
        let ledger = ledger();
        assert!(ledger.credit("carol", 0, "x").await.is_err());
        assert!(ledger.credit("carol", -5, "x").await.is_err());
        assert!(ledger.debit("carol", 0, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_entries_reconcile_to_balance() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        ledger.credit("dave", 200, "content consumption").await.unwrap();
        ledger.debit("dave", 50, "vote").await.unwrap();
        ledger.compost_debit("dave", 15, "compost cycle").await.unwrap();
        ledger
            .credit_redistribution("dave", 3, "redistribution cycle")
            .await
            .unwrap();

        let wallet = ledger.snapshot("dave").await.unwrap().unwrap();
        let entries = store.entries_for_user("dave").await.unwrap();
        let reconciled: i64 = entries.iter().map(|e| e.kind.sign() * e.amount).sum();

        assert_eq!(reconciled, wallet.balance);
        assert_eq!(wallet.balance, 200 - 50 - 15 + 3);
        assert!(wallet.invariant_holds());
    }

    #[tokio::test]
    async fn test_rollback_spend_restores_wallet_and_ledger() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        ledger.credit("erin", 50, "content consumption").await.unwrap();
        ledger.debit("erin", 20, "vote").await.unwrap();
        ledger.rollback_spend("erin", 20).await.unwrap();

        let wallet = ledger.snapshot("erin").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 50);
        assert_eq!(wallet.total_planted, 0);
        assert!(wallet.invariant_holds());

        // The spend entry is gone, only the credit remains
        let entries = store.entries_for_user("erin").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Earn);
    }

    #[tokio::test]
    async fn test_compost_does_not_touch_activity() {
        let ledger = ledger();
        let before = ledger.credit("frank", 100, "content consumption").await.unwrap();

        let after = ledger
            .compost_debit("frank", 10, "compost cycle")
            .await
            .unwrap();
        assert_eq!(after.last_activity_date, before.last_activity_date);
        assert_eq!(after.total_composted, 10);
    }

    #[tokio::test]
    async fn test_redistribution_does_not_touch_activity() {
        let ledger = ledger();
        let before = ledger.credit("gina", 10, "content consumption").await.unwrap();

        let after = ledger
            .credit_redistribution("gina", 3, "redistribution cycle")
            .await
            .unwrap();
        assert_eq!(after.last_activity_date, before.last_activity_date);
        assert_eq!(after.total_redistributed, 3);
        assert_eq!(after.balance, 13);
    }
}
