//! Poll document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for polls
pub const POLL_COLLECTION: &str = "polls";

/// One selectable option within a poll
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PollOption {
    pub option_id: String,
    pub label: String,
}

/// Poll document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PollDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable poll identifier used in routes
    pub poll_id: String,

    pub question: String,

    /// Only "quadratic" is implemented
    #[serde(default = "default_voting_method")]
    pub voting_method: String,

    /// Point budget each voter may allocate across options
    pub max_points: i64,

    pub options: Vec<PollOption>,

    #[serde(default)]
    pub is_open: bool,
}

fn default_voting_method() -> String {
    "quadratic".to_string()
}

impl PollDoc {
    /// Create an open quadratic poll
    pub fn new(
        poll_id: impl Into<String>,
        question: impl Into<String>,
        max_points: i64,
        options: Vec<PollOption>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            poll_id: poll_id.into(),
            question: question.into(),
            voting_method: default_voting_method(),
            max_points,
            options,
            is_open: true,
        }
    }

    /// Whether an option id belongs to this poll
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.option_id == option_id)
    }
}

impl IntoIndexes for PollDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "poll_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("poll_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for PollDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
