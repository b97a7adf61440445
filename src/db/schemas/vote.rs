//! Vote document schema
//!
//! One vote per (poll, user); re-submission replaces the prior vote.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{epoch, Metadata};

/// Collection name for votes
pub const VOTE_COLLECTION: &str = "votes";

/// Points assigned to a single option
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    pub option_id: String,
    pub points: i64,
}

/// Vote document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VoteDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub poll_id: String,

    pub user_id: String,

    /// Per-option point allocations; their sum stays within the poll budget
    pub allocations: Vec<Allocation>,

    /// Intensity level 1-5, effective 1 when SAKA voting is disabled
    pub intensity: i32,

    /// Effective weight: total points x sqrt(intensity), exact float
    pub weight: f64,

    /// Grains debited for the intensity, 0 when SAKA voting is disabled
    pub saka_spent: i64,

    pub cast_at: DateTime,
}

impl Default for VoteDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            poll_id: String::new(),
            user_id: String::new(),
            allocations: Vec::new(),
            intensity: 1,
            weight: 0.0,
            saka_spent: 0,
            cast_at: epoch(),
        }
    }
}

impl VoteDoc {
    /// Total points across all allocations
    pub fn total_points(&self) -> i64 {
        self.allocations.iter().map(|a| a.points).sum()
    }
}

impl IntoIndexes for VoteDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Latest vote wins: one row per (poll, user), replaced on resubmit
            (
                doc! { "poll_id": 1, "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("poll_user_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for VoteDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
