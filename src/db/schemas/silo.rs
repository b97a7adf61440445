//! Silo document schema
//!
//! The Silo is a single shared aggregate: composted grains flow in with no
//! per-user attribution, redistribution draws them back out. It is stored as
//! one versioned row so that racing compost deposits and redistribution
//! withdrawals serialize through compare-and-swap on `version`.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for the silo singleton
pub const SILO_COLLECTION: &str = "silo";

/// Key of the one-and-only silo row
pub const SILO_SINGLETON_KEY: &str = "silo";

/// The common-pool aggregate
///
/// Invariant: `total_balance == total_composted - total_redistributed`,
/// and never negative.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SiloDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Singleton discriminator, always [`SILO_SINGLETON_KEY`]
    pub key: String,

    /// Current undistributed pool
    pub total_balance: i64,

    /// Lifetime compost inflow
    pub total_composted: i64,

    /// Lifetime redistribution outflow
    pub total_redistributed: i64,

    /// Completed compost + redistribution cycles
    pub total_cycles: i64,

    /// Finish time of the last live compost run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_compost_at: Option<DateTime>,

    /// Finish time of the last live redistribution run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_redistribution_at: Option<DateTime>,

    /// Optimistic-concurrency counter, bumped by every mutation
    pub version: i64,
}

impl Default for SiloDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            key: SILO_SINGLETON_KEY.to_string(),
            total_balance: 0,
            total_composted: 0,
            total_redistributed: 0,
            total_cycles: 0,
            last_compost_at: None,
            last_redistribution_at: None,
            version: 0,
        }
    }
}

impl SiloDoc {
    /// Fresh empty silo
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(),
            ..Self::default()
        }
    }

    /// Check the pool conservation invariant
    pub fn invariant_holds(&self) -> bool {
        self.total_balance >= 0
            && self.total_balance == self.total_composted - self.total_redistributed
    }
}

impl IntoIndexes for SiloDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("silo_singleton".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for SiloDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_silo_is_consistent() {
        let s = SiloDoc::new();
        assert!(s.invariant_holds());
        assert_eq!(s.key, SILO_SINGLETON_KEY);
    }

    #[test]
    fn test_invariant_checks_flow_balance() {
        let mut s = SiloDoc::new();
        s.total_composted = 35;
        s.total_balance = 35;
        assert!(s.invariant_holds());

        s.total_redistributed = 3;
        s.total_balance = 32;
        assert!(s.invariant_holds());

        s.total_balance = -1;
        assert!(!s.invariant_holds());
    }
}
