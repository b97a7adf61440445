//! Project document schema
//!
//! Only the SAKA-facing slice of a project lives here: its boost score and
//! the distinct supporters who planted grains into it. Editorial content is
//! owned by the content hub.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for projects
pub const PROJECT_COLLECTION: &str = "projects";

/// Project document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProjectDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Stable project identifier used in routes
    pub project_id: String,

    pub name: String,

    /// Cumulative grains planted into this project
    pub saka_score: i64,

    /// Distinct users who have boosted this project
    #[serde(default)]
    pub saka_supporters: Vec<String>,
}

impl ProjectDoc {
    /// Create a project with no boosts yet
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            project_id: project_id.into(),
            name: name.into(),
            saka_score: 0,
            saka_supporters: Vec::new(),
        }
    }
}

impl IntoIndexes for ProjectDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "project_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("project_id_unique".to_string())
                        .build(),
                ),
            ),
            // Top-projects stats sort on score
            (
                doc! { "saka_score": -1 },
                Some(
                    IndexOptions::builder()
                        .name("saka_score_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProjectDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
