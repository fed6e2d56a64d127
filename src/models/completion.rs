use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::StageId;
use super::task::Evidence;

/// A stage completion as handed to the persistence collaborator.
///
/// Records are written after the in-memory engine has already applied the
/// completion; on startup they are replayed to restore progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub id: Uuid,
    pub stage_id: StageId,
    pub evidence: Evidence,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(stage_id: StageId, evidence: Evidence) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage_id,
            evidence,
            completed_at: Utc::now(),
        }
    }
}
