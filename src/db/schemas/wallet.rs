//! Wallet document schema
//!
//! One wallet per user, holding the current grain balance and the four
//! lifetime counters the balance must always reconcile against.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{epoch, Metadata};

/// Collection name for wallets
pub const WALLET_COLLECTION: &str = "wallets";

/// Wallet document stored in MongoDB
///
/// Invariant: `balance == total_harvested - total_planted - total_composted`
/// after every committed mutation - no grain enters or leaves outside the
/// three channels. Redistribution payouts count into `total_harvested`
/// (they are incoming grains like any other) and are additionally tallied
/// in `total_redistributed` for reporting.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WalletDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Owning user (1:1)
    pub user_id: String,

    /// Current balance in grains, never negative
    pub balance: i64,

    /// Lifetime grains received (activity earns plus redistribution
    /// payouts), monotonic non-decreasing
    pub total_harvested: i64,

    /// Lifetime grains spent, monotonic non-decreasing
    pub total_planted: i64,

    /// Lifetime grains composted away, monotonic non-decreasing
    pub total_composted: i64,

    /// Of `total_harvested`, the grains that came from redistribution,
    /// monotonic non-decreasing
    pub total_redistributed: i64,

    /// Last earning or spending action. Compost and redistribution do not
    /// touch this - only the user's own activity counts.
    pub last_activity_date: DateTime,
}

impl Default for WalletDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            user_id: String::new(),
            balance: 0,
            total_harvested: 0,
            total_planted: 0,
            total_composted: 0,
            total_redistributed: 0,
            last_activity_date: epoch(),
        }
    }
}

impl WalletDoc {
    /// Create an empty wallet for a user, active as of now
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.into(),
            balance: 0,
            total_harvested: 0,
            total_planted: 0,
            total_composted: 0,
            total_redistributed: 0,
            last_activity_date: DateTime::now(),
        }
    }

    /// Check the conservation invariant
    pub fn invariant_holds(&self) -> bool {
        self.balance == self.total_harvested - self.total_planted - self.total_composted
    }
}

impl IntoIndexes for WalletDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            // Compost and redistribution scans filter on activity recency
            (
                doc! { "last_activity_date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("last_activity_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for WalletDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_is_empty_and_consistent() {
        let w = WalletDoc::new("user-1");
        assert_eq!(w.balance, 0);
        assert!(w.invariant_holds());
    }

    #[test]
    fn test_invariant_detects_drift() {
        let mut w = WalletDoc::new("user-1");
        w.total_harvested = 100;
        w.balance = 90; // 10 grains vanished outside the three channels
        assert!(!w.invariant_holds());

        w.total_planted = 10;
        assert!(w.invariant_holds());
    }
}
