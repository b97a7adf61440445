//! Silo - the common pool of composted grains
//!
//! A pure aggregate: compost deposits flow in with no per-user attribution,
//! redistribution withdrawals flow out. The store serializes concurrent
//! mutations through the singleton's version counter; this module adds the
//! amount validation and the snapshot shape the API serves.

use std::sync::Arc;

use serde::Serialize;

use crate::db::schemas::SiloDoc;
use crate::store::SakaStore;
use crate::types::{GranaryError, Result};

/// Silo service over the store singleton
#[derive(Clone)]
pub struct SiloService {
    store: Arc<SakaStore>,
}

/// Snapshot served by `GET /api/saka/silo/`
#[derive(Debug, Serialize)]
pub struct SiloSnapshot {
    pub enabled: bool,
    pub total_balance: i64,
    pub total_composted: i64,
    pub total_redistributed: i64,
    pub total_cycles: i64,
    pub last_compost_at: Option<String>,
    pub last_redistribution_at: Option<String>,
    pub last_updated: Option<String>,
}

impl SiloService {
    pub fn new(store: Arc<SakaStore>) -> Self {
        Self { store }
    }

    /// Deposit composted grains into the pool
    pub async fn deposit(&self, amount: i64) -> Result<SiloDoc> {
        if amount <= 0 {
            return Err(GranaryError::BadRequest(format!(
                "silo deposit must be positive, got {}",
                amount
            )));
        }
        self.store.silo_deposit(amount).await
    }

    /// Withdraw grains for redistribution; fails with `InsufficientSilo`
    /// when the pool cannot cover the amount
    pub async fn withdraw(&self, amount: i64) -> Result<SiloDoc> {
        if amount <= 0 {
            return Err(GranaryError::BadRequest(format!(
                "silo withdrawal must be positive, got {}",
                amount
            )));
        }
        self.store.silo_withdraw(amount).await
    }

    /// Current pool state, shaped for the API
    pub async fn snapshot(&self, enabled: bool) -> Result<SiloSnapshot> {
        let silo = self.store.silo().await?;
        Ok(SiloSnapshot {
            enabled,
            total_balance: silo.total_balance,
            total_composted: silo.total_composted,
            total_redistributed: silo.total_redistributed,
            total_cycles: silo.total_cycles,
            last_compost_at: silo.last_compost_at.map(|d| d.to_chrono().to_rfc3339()),
            last_redistribution_at: silo
                .last_redistribution_at
                .map(|d| d.to_chrono().to_rfc3339()),
            last_updated: silo
                .metadata
                .updated_at
                .map(|d| d.to_chrono().to_rfc3339()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silo() -> SiloService {
        SiloService::new(Arc::new(SakaStore::memory_only()))
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw_cross_checks() {
        let silo = silo();

        silo.deposit(35).await.unwrap();
        let state = silo.withdraw(3).await.unwrap();

        assert_eq!(state.total_balance, 32);
        // total_balance always equals inflow minus outflow
        assert_eq!(
            state.total_balance,
            state.total_composted - state.total_redistributed
        );
        assert!(state.invariant_holds());
    }

    #[tokio::test]
    async fn test_withdraw_beyond_pool_fails() {
        let silo = silo();
        silo.deposit(10).await.unwrap();

        let err = silo.withdraw(11).await.unwrap_err();
        assert!(matches!(
            err,
            GranaryError::InsufficientSilo {
                requested: 11,
                available: 10
            }
        ));

        // Pool untouched by the failed withdrawal
        let snap = silo.snapshot(true).await.unwrap();
        assert_eq!(snap.total_balance, 10);
    }

    #[tokio::test]
    async fn test_amounts_must_be_positive() {
        let silo = silo();
        assert!(silo.deposit(0).await.is_err());
        assert!(silo.deposit(-5).await.is_err());
        assert!(silo.withdraw(0).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_silo_snapshot() {
        let silo = silo();
        let snap = silo.snapshot(true).await.unwrap();
        assert_eq!(snap.total_balance, 0);
        assert_eq!(snap.total_cycles, 0);
        assert!(snap.last_compost_at.is_none());
    }
}
