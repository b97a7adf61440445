//! Aggregated SAKA statistics
//!
//! Serves the dashboard: global totals, a daily earned/spent series folded
//! from the ledger, and the top harvesters and most-boosted projects.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::schemas::{EntryKind, WalletDoc};
use crate::store::SakaStore;
use crate::types::Result;

/// Window and list-size bounds for stats queries
pub const MAX_STATS_DAYS: i64 = 365;
pub const DEFAULT_STATS_DAYS: i64 = 30;
pub const MAX_TOP_LIMIT: usize = 100;
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Economy-wide totals
#[derive(Debug, Serialize)]
pub struct GlobalStats {
    pub total_wallets: i64,
    /// Grains currently held across all wallets
    pub circulating_balance: i64,
    pub total_harvested: i64,
    pub total_planted: i64,
    pub total_composted: i64,
    pub total_redistributed: i64,
    pub silo_balance: i64,
    pub total_cycles: i64,
}

/// One day of earn/spend activity
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DailyStat {
    /// Calendar date, YYYY-MM-DD (UTC)
    pub date: String,
    pub earned: i64,
    pub spent: i64,
    pub net: i64,
}

/// Leaderboard row for harvesters
#[derive(Debug, Serialize)]
pub struct TopUser {
    pub user_id: String,
    pub total_harvested: i64,
    pub balance: i64,
}

/// Leaderboard row for boosted projects
#[derive(Debug, Serialize)]
pub struct TopProject {
    pub project_id: String,
    pub name: String,
    pub saka_score: i64,
    pub supporters_count: usize,
}

/// Full stats payload for `GET /api/saka/stats/`
#[derive(Debug, Serialize)]
pub struct SakaStats {
    pub global: GlobalStats,
    pub daily: Vec<DailyStat>,
    pub top_users: Vec<TopUser>,
    pub top_projects: Vec<TopProject>,
}

/// Engagement proxy for a single wallet: planting (funding votes and
/// boosts) weighs double harvesting, since it represents contribution
/// rather than consumption.
pub fn impact_score(wallet: &WalletDoc) -> i64 {
    wallet.total_harvested + wallet.total_planted * 2
}

/// Stats computation service
#[derive(Clone)]
pub struct StatsService {
    store: Arc<SakaStore>,
}

impl StatsService {
    pub fn new(store: Arc<SakaStore>) -> Self {
        Self { store }
    }

    /// Compute the stats payload over a trailing window of `days`
    pub async fn stats(&self, days: i64, limit: usize) -> Result<SakaStats> {
        let days = days.clamp(1, MAX_STATS_DAYS);
        let limit = limit.clamp(1, MAX_TOP_LIMIT);

        let wallets = self.store.all_wallets().await?;
        let silo = self.store.silo().await?;

        let global = GlobalStats {
            total_wallets: wallets.len() as i64,
            circulating_balance: wallets.iter().map(|w| w.balance).sum(),
            total_harvested: wallets.iter().map(|w| w.total_harvested).sum(),
            total_planted: wallets.iter().map(|w| w.total_planted).sum(),
            total_composted: wallets.iter().map(|w| w.total_composted).sum(),
            total_redistributed: wallets.iter().map(|w| w.total_redistributed).sum(),
            silo_balance: silo.total_balance,
            total_cycles: silo.total_cycles,
        };

        let daily = self.daily_series(days).await?;

        let top_users = self
            .store
            .top_wallets_by_harvest(limit)
            .await?
            .into_iter()
            .filter(|w| w.total_harvested > 0)
            .map(|w| TopUser {
                user_id: w.user_id,
                total_harvested: w.total_harvested,
                balance: w.balance,
            })
            .collect();

        let top_projects = self
            .store
            .top_projects(limit)
            .await?
            .into_iter()
            .filter(|p| p.saka_score > 0)
            .map(|p| TopProject {
                project_id: p.project_id,
                name: p.name,
                saka_score: p.saka_score,
                supporters_count: p.saka_supporters.len(),
            })
            .collect();

        Ok(SakaStats {
            global,
            daily,
            top_users,
            top_projects,
        })
    }

    /// Fold ledger entries into a per-day earn/spend series, oldest first.
    /// Only user-facing flows count: harvests as earned, plants as spent.
    /// Compost and redistribution are cycle bookkeeping, not daily activity.
    async fn daily_series(&self, days: i64) -> Result<Vec<DailyStat>> {
        let now = Utc::now();
        let since = now - Duration::days(days - 1);
        let entries = self
            .store
            .entries_since(bson::DateTime::from_chrono(
                since
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or_default()
                    .and_utc(),
            ))
            .await?;

        // Pre-seed every day in the window so quiet days show as zeros
        let mut buckets: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for offset in 0..days {
            let date = (since + Duration::days(offset)).format("%Y-%m-%d").to_string();
            buckets.insert(date, (0, 0));
        }

        for entry in entries {
            let date = entry.timestamp.to_chrono().format("%Y-%m-%d").to_string();
            if let Some((earned, spent)) = buckets.get_mut(&date) {
                match entry.kind {
                    EntryKind::Earn => *earned += entry.amount,
                    EntryKind::Spend => *spent += entry.amount,
                    EntryKind::Compost | EntryKind::RedistributeIn => {}
                }
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(date, (earned, spent))| DailyStat {
                date,
                earned,
                spent,
                net: earned - spent,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::WalletLedger;

    #[tokio::test]
    async fn test_global_totals() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        ledger.credit("alice", 100, "content consumption").await.unwrap();
        ledger.credit("bob", 40, "content consumption").await.unwrap();
        ledger.debit("alice", 30, "vote").await.unwrap();
        store.silo_deposit(12).await.unwrap();

        let service = StatsService::new(Arc::clone(&store));
        let stats = service.stats(7, 10).await.unwrap();

        assert_eq!(stats.global.total_wallets, 2);
        assert_eq!(stats.global.circulating_balance, 110);
        assert_eq!(stats.global.total_harvested, 140);
        assert_eq!(stats.global.total_planted, 30);
        assert_eq!(stats.global.silo_balance, 12);
    }

    #[tokio::test]
    async fn test_daily_series_buckets_today() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        ledger.credit("alice", 100, "content consumption").await.unwrap();
        ledger.debit("alice", 25, "vote").await.unwrap();

        let service = StatsService::new(Arc::clone(&store));
        let stats = service.stats(7, 10).await.unwrap();

        assert_eq!(stats.daily.len(), 7);
        let today = stats.daily.last().unwrap();
        assert_eq!(today.earned, 100);
        assert_eq!(today.spent, 25);
        assert_eq!(today.net, 75);

        // Quiet days are present as zeros
        assert!(stats.daily[..6].iter().all(|d| d.earned == 0 && d.spent == 0));
    }

    #[tokio::test]
    async fn test_top_users_ordered_by_harvest() {
        let store = Arc::new(SakaStore::memory_only());
        let ledger = WalletLedger::new(Arc::clone(&store));

        ledger.credit("small", 10, "content consumption").await.unwrap();
        ledger.credit("big", 500, "content consumption").await.unwrap();
        ledger.credit("mid", 100, "content consumption").await.unwrap();

        let service = StatsService::new(Arc::clone(&store));
        let stats = service.stats(7, 2).await.unwrap();

        assert_eq!(stats.top_users.len(), 2);
        assert_eq!(stats.top_users[0].user_id, "big");
        assert_eq!(stats.top_users[1].user_id, "mid");
    }

    #[tokio::test]
    async fn test_bounds_are_clamped() {
        let store = Arc::new(SakaStore::memory_only());
        let service = StatsService::new(store);

        let stats = service.stats(10_000, 10).await.unwrap();
        assert_eq!(stats.daily.len(), MAX_STATS_DAYS as usize);

        let stats = service.stats(0, 10).await.unwrap();
        assert_eq!(stats.daily.len(), 1);
    }
}
