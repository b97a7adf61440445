//! In-memory store backend for dev mode and tests
//!
//! Mirrors the MongoDB semantics exactly: the per-wallet guard checks, the
//! silo accounting, and replace-on-resubmit votes all behave as they do
//! against a live database. DashMap entry locks give the same per-wallet
//! atomicity the guarded `find_one_and_update` provides in MongoDB.

use bson::DateTime;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::db::schemas::{
    CompostLogDoc, CycleDoc, EntryKind, LedgerEntryDoc, PollDoc, ProjectDoc,
    RedistributionLogDoc, SiloDoc, VoteDoc, WalletDoc,
};
use crate::types::{GranaryError, Result};

/// Volatile state for a storeless deployment
pub struct MemoryStore {
    wallets: DashMap<String, WalletDoc>,
    entries: RwLock<Vec<LedgerEntryDoc>>,
    silo: Mutex<SiloDoc>,
    compost_logs: RwLock<Vec<CompostLogDoc>>,
    redistribution_logs: RwLock<Vec<RedistributionLogDoc>>,
    cycles: RwLock<Vec<CycleDoc>>,
    polls: DashMap<String, PollDoc>,
    votes: DashMap<(String, String), VoteDoc>,
    projects: DashMap<String, ProjectDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
            entries: RwLock::new(Vec::new()),
            silo: Mutex::new(SiloDoc::new()),
            compost_logs: RwLock::new(Vec::new()),
            redistribution_logs: RwLock::new(Vec::new()),
            cycles: RwLock::new(Vec::new()),
            polls: DashMap::new(),
            votes: DashMap::new(),
            projects: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Wallets
    // ------------------------------------------------------------------

    pub fn get_wallet(&self, user_id: &str) -> Option<WalletDoc> {
        self.wallets.get(user_id).map(|w| w.clone())
    }

    /// Credit a wallet, creating it if absent
    pub fn credit_balance(
        &self,
        user_id: &str,
        amount: i64,
        kind: EntryKind,
        touch_activity: bool,
    ) -> WalletDoc {
        let mut wallet = self
            .wallets
            .entry(user_id.to_string())
            .or_insert_with(|| WalletDoc::new(user_id));

        wallet.balance += amount;
        wallet.total_harvested += amount;
        if kind == EntryKind::RedistributeIn {
            wallet.total_redistributed += amount;
        }
        if touch_activity {
            wallet.last_activity_date = DateTime::now();
        }
        wallet.clone()
    }

    /// Debit a wallet under the `balance >= amount` guard
    pub fn debit_balance(
        &self,
        user_id: &str,
        amount: i64,
        kind: EntryKind,
        touch_activity: bool,
    ) -> Result<WalletDoc> {
        let mut wallet = match self.wallets.get_mut(user_id) {
            Some(w) => w,
            None => {
                return Err(GranaryError::InsufficientBalance {
                    required: amount,
                    available: 0,
                })
            }
        };

        if wallet.balance < amount {
            return Err(GranaryError::InsufficientBalance {
                required: amount,
                available: wallet.balance,
            });
        }

        wallet.balance -= amount;
        match kind {
            EntryKind::Compost => wallet.total_composted += amount,
            _ => wallet.total_planted += amount,
        }
        if touch_activity {
            wallet.last_activity_date = DateTime::now();
        }
        Ok(wallet.clone())
    }

    /// Reverse a committed debit (compensation path only)
    pub fn undo_debit(&self, user_id: &str, amount: i64, kind: EntryKind) {
        if let Some(mut wallet) = self.wallets.get_mut(user_id) {
            wallet.balance += amount;
            match kind {
                EntryKind::Compost => wallet.total_composted -= amount,
                _ => wallet.total_planted -= amount,
            }
        }
    }

    pub fn wallets_inactive_since(&self, cutoff: DateTime) -> Vec<WalletDoc> {
        self.wallets
            .iter()
            .filter(|w| w.last_activity_date <= cutoff)
            .map(|w| w.clone())
            .collect()
    }

    pub fn wallets_active_since(&self, cutoff: DateTime) -> Vec<WalletDoc> {
        self.wallets
            .iter()
            .filter(|w| w.last_activity_date >= cutoff)
            .map(|w| w.clone())
            .collect()
    }

    pub fn all_wallets(&self) -> Vec<WalletDoc> {
        self.wallets.iter().map(|w| w.clone()).collect()
    }

    pub fn top_wallets_by_harvest(&self, limit: usize) -> Vec<WalletDoc> {
        let mut wallets = self.all_wallets();
        wallets.sort_by(|a, b| b.total_harvested.cmp(&a.total_harvested));
        wallets.truncate(limit);
        wallets
    }

    // ------------------------------------------------------------------
    // Ledger entries
    // ------------------------------------------------------------------

    pub async fn append_entry(&self, entry: LedgerEntryDoc) {
        self.entries.write().await.push(entry);
    }

    /// Remove the newest entry matching the given shape (compensation only)
    pub async fn remove_latest_entry(&self, user_id: &str, kind: EntryKind, amount: i64) {
        let mut entries = self.entries.write().await;
        if let Some(pos) = entries
            .iter()
            .rposition(|e| e.user_id == user_id && e.kind == kind && e.amount == amount)
        {
            entries.remove(pos);
        }
    }

    pub async fn entries_since(&self, since: DateTime) -> Vec<LedgerEntryDoc> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    pub async fn entries_for_user(&self, user_id: &str) -> Vec<LedgerEntryDoc> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Silo
    // ------------------------------------------------------------------

    pub async fn silo(&self) -> SiloDoc {
        self.silo.lock().await.clone()
    }

    pub async fn silo_deposit(&self, amount: i64) -> SiloDoc {
        let mut silo = self.silo.lock().await;
        silo.total_balance += amount;
        silo.total_composted += amount;
        silo.version += 1;
        silo.metadata.updated_at = Some(DateTime::now());
        silo.clone()
    }

    pub async fn silo_withdraw(&self, amount: i64) -> Result<SiloDoc> {
        let mut silo = self.silo.lock().await;
        if silo.total_balance < amount {
            return Err(GranaryError::InsufficientSilo {
                requested: amount,
                available: silo.total_balance,
            });
        }
        silo.total_balance -= amount;
        silo.total_redistributed += amount;
        silo.version += 1;
        silo.metadata.updated_at = Some(DateTime::now());
        Ok(silo.clone())
    }

    pub async fn silo_restore(&self, amount: i64) -> SiloDoc {
        let mut silo = self.silo.lock().await;
        silo.total_balance += amount;
        silo.total_redistributed -= amount;
        silo.version += 1;
        silo.clone()
    }

    pub async fn silo_mark_compost_run(&self) {
        let mut silo = self.silo.lock().await;
        silo.last_compost_at = Some(DateTime::now());
        silo.version += 1;
    }

    pub async fn silo_mark_redistribution_run(&self) {
        let mut silo = self.silo.lock().await;
        silo.last_redistribution_at = Some(DateTime::now());
        silo.version += 1;
    }

    pub async fn silo_close_cycle(&self, composted: i64, redistributed: i64) -> CycleDoc {
        let mut silo = self.silo.lock().await;
        silo.total_cycles += 1;
        silo.version += 1;

        let cycle = CycleDoc {
            cycle_number: silo.total_cycles,
            composted,
            redistributed,
            closed_at: DateTime::now(),
            ..CycleDoc::default()
        };
        drop(silo);

        self.cycles.write().await.push(cycle.clone());
        cycle
    }

    // ------------------------------------------------------------------
    // Run logs and cycles
    // ------------------------------------------------------------------

    pub async fn insert_compost_log(&self, log: CompostLogDoc) {
        self.compost_logs.write().await.push(log);
    }

    pub async fn finalize_compost_log(&self, log: CompostLogDoc) {
        let mut logs = self.compost_logs.write().await;
        if let Some(existing) = logs.iter_mut().find(|l| l.run_id == log.run_id) {
            *existing = log;
        } else {
            logs.push(log);
        }
    }

    pub async fn list_compost_logs(&self, limit: usize) -> Vec<CompostLogDoc> {
        let logs = self.compost_logs.read().await;
        let mut out: Vec<CompostLogDoc> = logs.clone();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit);
        out
    }

    pub async fn insert_redistribution_log(&self, log: RedistributionLogDoc) {
        self.redistribution_logs.write().await.push(log);
    }

    pub async fn finalize_redistribution_log(&self, log: RedistributionLogDoc) {
        let mut logs = self.redistribution_logs.write().await;
        if let Some(existing) = logs.iter_mut().find(|l| l.run_id == log.run_id) {
            *existing = log;
        } else {
            logs.push(log);
        }
    }

    pub async fn list_cycles(&self, limit: usize) -> Vec<CycleDoc> {
        let cycles = self.cycles.read().await;
        let mut out: Vec<CycleDoc> = cycles.clone();
        out.sort_by(|a, b| b.cycle_number.cmp(&a.cycle_number));
        out.truncate(limit);
        out
    }

    // ------------------------------------------------------------------
    // Polls, votes, projects
    // ------------------------------------------------------------------

    pub fn get_poll(&self, poll_id: &str) -> Option<PollDoc> {
        self.polls.get(poll_id).map(|p| p.clone())
    }

    pub fn insert_poll(&self, poll: PollDoc) {
        self.polls.insert(poll.poll_id.clone(), poll);
    }

    pub fn get_vote(&self, poll_id: &str, user_id: &str) -> Option<VoteDoc> {
        self.votes
            .get(&(poll_id.to_string(), user_id.to_string()))
            .map(|v| v.clone())
    }

    pub fn upsert_vote(&self, vote: VoteDoc) {
        self.votes
            .insert((vote.poll_id.clone(), vote.user_id.clone()), vote);
    }

    pub fn get_project(&self, project_id: &str) -> Option<ProjectDoc> {
        self.projects.get(project_id).map(|p| p.clone())
    }

    pub fn insert_project(&self, project: ProjectDoc) {
        self.projects.insert(project.project_id.clone(), project);
    }

    pub fn apply_boost(&self, project_id: &str, user_id: &str, amount: i64) -> Result<ProjectDoc> {
        let mut project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| GranaryError::NotFound(format!("project {}", project_id)))?;

        project.saka_score += amount;
        if !project.saka_supporters.iter().any(|s| s == user_id) {
            project.saka_supporters.push(user_id.to_string());
        }
        Ok(project.clone())
    }

    pub fn top_projects(&self, limit: usize) -> Vec<ProjectDoc> {
        let mut projects: Vec<ProjectDoc> = self.projects.iter().map(|p| p.clone()).collect();
        projects.sort_by(|a, b| b.saka_score.cmp(&a.saka_score));
        projects.truncate(limit);
        projects
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
