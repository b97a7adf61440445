//! Cycle run records: compost logs, redistribution logs, season cycles
//!
//! One log row per scheduled or manual run, dry or live. Created at run
//! start, finalized at run end, immutable afterward.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{epoch, Metadata};

/// Collection name for compost run logs
pub const COMPOST_LOG_COLLECTION: &str = "compost_logs";

/// Collection name for redistribution run logs
pub const REDISTRIBUTION_LOG_COLLECTION: &str = "redistribution_logs";

/// Collection name for season cycle records
pub const CYCLE_COLLECTION: &str = "cycles";

/// What triggered a cycle run
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    /// The worker's interval scheduler
    #[default]
    Scheduler,
    /// An admin trigger through the API
    Manual,
}

/// One compost run, dry or live
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompostLogDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Run identifier (UUID)
    pub run_id: String,

    pub started_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime>,

    /// True when the run computed amounts without mutating anything
    pub dry_run: bool,

    /// Wallets examined for eligibility
    pub wallets_scanned: i64,

    /// Wallets whose grains moved (or would have moved, for dry runs)
    pub wallets_affected: i64,

    /// Wallets skipped because their individual mutation failed
    pub wallets_skipped: i64,

    /// Grains moved into the Silo by this run
    pub total_composted: i64,

    /// Trigger origin
    pub source: RunSource,
}

impl Default for CompostLogDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            run_id: String::new(),
            started_at: epoch(),
            finished_at: None,
            dry_run: true,
            wallets_scanned: 0,
            wallets_affected: 0,
            wallets_skipped: 0,
            total_composted: 0,
            source: RunSource::default(),
        }
    }
}

impl CompostLogDoc {
    /// Open a log row for a run starting now
    pub fn start(run_id: impl Into<String>, dry_run: bool, source: RunSource) -> Self {
        Self {
            metadata: Metadata::new(),
            run_id: run_id.into(),
            started_at: DateTime::now(),
            dry_run,
            source,
            ..Self::default()
        }
    }
}

impl IntoIndexes for CompostLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "started_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("started_at_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CompostLogDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One redistribution run
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RedistributionLogDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Run identifier (UUID)
    pub run_id: String,

    pub started_at: DateTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime>,

    /// Pool drawn for this run, before per-wallet division
    pub pool: i64,

    /// Grains credited to each eligible wallet
    pub per_wallet_amount: i64,

    /// Wallets actually credited
    pub wallets_credited: i64,

    /// Wallets skipped because their individual credit failed
    pub wallets_skipped: i64,

    /// Grains actually leaving the Silo
    pub total_distributed: i64,

    /// Grains left in the Silo by flooring (never credited fractionally)
    pub remainder_kept: i64,

    /// Trigger origin
    pub source: RunSource,
}

impl Default for RedistributionLogDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            run_id: String::new(),
            started_at: epoch(),
            finished_at: None,
            pool: 0,
            per_wallet_amount: 0,
            wallets_credited: 0,
            wallets_skipped: 0,
            total_distributed: 0,
            remainder_kept: 0,
            source: RunSource::default(),
        }
    }
}

impl RedistributionLogDoc {
    /// Open a log row for a run starting now
    pub fn start(run_id: impl Into<String>, source: RunSource) -> Self {
        Self {
            metadata: Metadata::new(),
            run_id: run_id.into(),
            started_at: DateTime::now(),
            source,
            ..Self::default()
        }
    }
}

impl IntoIndexes for RedistributionLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "started_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("started_at_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RedistributionLogDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// A closed season: one completed compost + redistribution pair
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CycleDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Monotonic cycle counter, mirrors the Silo's `total_cycles`
    pub cycle_number: i64,

    /// Grains composted during this cycle
    pub composted: i64,

    /// Grains redistributed during this cycle
    pub redistributed: i64,

    pub closed_at: DateTime,
}

impl Default for CycleDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            cycle_number: 0,
            composted: 0,
            redistributed: 0,
            closed_at: epoch(),
        }
    }
}

impl IntoIndexes for CycleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "cycle_number": -1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("cycle_number_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CycleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
