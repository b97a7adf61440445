//! Ledger entry document schema
//!
//! The append-only record behind every wallet mutation. The aggregate
//! counters on the wallet are a cache of this log: summing entries per kind
//! must reproduce the wallet balance exactly.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{epoch, Metadata};

/// Collection name for ledger entries
pub const LEDGER_COLLECTION: &str = "ledger_entries";

/// Direction of a ledger entry
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Grains credited for user activity
    #[default]
    Earn,
    /// Grains debited to fund an action (vote, boost)
    Spend,
    /// Grains decayed out of an inactive wallet into the Silo
    Compost,
    /// Grains received from a Silo redistribution
    RedistributeIn,
}

impl EntryKind {
    /// Sign of this entry when reconciling a balance
    pub fn sign(&self) -> i64 {
        match self {
            Self::Earn | Self::RedistributeIn => 1,
            Self::Spend | Self::Compost => -1,
        }
    }
}

/// One immutable ledger entry per wallet mutation
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LedgerEntryDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Wallet owner
    pub user_id: String,

    /// Entry direction
    pub kind: EntryKind,

    /// Grains moved, always positive
    pub amount: i64,

    /// Free-form origin: content consumption, vote, project boost,
    /// compost cycle, redistribution cycle
    pub reason: String,

    /// When the mutating transaction committed
    pub timestamp: DateTime,
}

impl Default for LedgerEntryDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            user_id: String::new(),
            kind: EntryKind::default(),
            amount: 0,
            reason: String::new(),
            timestamp: epoch(),
        }
    }
}

impl LedgerEntryDoc {
    /// Create an entry stamped now
    pub fn new(user_id: impl Into<String>, kind: EntryKind, amount: i64, reason: impl Into<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.into(),
            kind,
            amount,
            reason: reason.into(),
            timestamp: DateTime::now(),
        }
    }
}

impl IntoIndexes for LedgerEntryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_timestamp_index".to_string())
                        .build(),
                ),
            ),
            // Daily stats aggregate over a time window across all wallets
            (
                doc! { "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("timestamp_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LedgerEntryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_signs() {
        assert_eq!(EntryKind::Earn.sign(), 1);
        assert_eq!(EntryKind::RedistributeIn.sign(), 1);
        assert_eq!(EntryKind::Spend.sign(), -1);
        assert_eq!(EntryKind::Compost.sign(), -1);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EntryKind::RedistributeIn).unwrap();
        assert_eq!(json, r#""REDISTRIBUTE_IN""#);
        let json = serde_json::to_string(&EntryKind::Earn).unwrap();
        assert_eq!(json, r#""EARN""#);
    }
}
