//! Message types exchanged between the API and the cycle worker

use serde::{Deserialize, Serialize};

use crate::db::schemas::RunSource;

/// Subject for compost cycle triggers
pub const SUBJECT_CYCLE_COMPOST: &str = "saka.cycle.compost";

/// Subject for redistribution cycle triggers
pub const SUBJECT_CYCLE_REDISTRIBUTE: &str = "saka.cycle.redistribute";

/// Which cycle a trigger targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Compost,
    Redistribute,
}

impl CycleKind {
    /// NATS subject carrying triggers for this cycle
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Compost => SUBJECT_CYCLE_COMPOST,
            Self::Redistribute => SUBJECT_CYCLE_REDISTRIBUTE,
        }
    }
}

/// A request to run a cycle, published by the API on admin triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTrigger {
    /// Correlation ID for log tracing
    pub trigger_id: String,
    pub kind: CycleKind,
    /// Dry-run triggers are accepted for parity but admins normally preview
    /// inline through the API instead
    pub dry_run: bool,
    pub source: RunSource,
    /// Admin identity that requested the run, when manual
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl CycleTrigger {
    /// A manual live-run trigger
    pub fn manual(kind: CycleKind, requested_by: Option<String>) -> Self {
        Self {
            trigger_id: uuid::Uuid::new_v4().to_string(),
            kind,
            dry_run: false,
            source: RunSource::Manual,
            requested_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_round_trips() {
        let trigger = CycleTrigger::manual(CycleKind::Compost, Some("admin-1".into()));
        let json = serde_json::to_vec(&trigger).unwrap();
        let parsed: CycleTrigger = serde_json::from_slice(&json).unwrap();

        assert_eq!(parsed.kind, CycleKind::Compost);
        assert_eq!(parsed.source, RunSource::Manual);
        assert_eq!(parsed.requested_by.as_deref(), Some("admin-1"));
        assert!(!parsed.dry_run);
    }

    #[test]
    fn test_subjects() {
        assert_eq!(CycleKind::Compost.subject(), "saka.cycle.compost");
        assert_eq!(CycleKind::Redistribute.subject(), "saka.cycle.redistribute");
    }
}
