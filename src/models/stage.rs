use serde::{Deserialize, Serialize};

use super::reward::Reward;
use super::task::Task;

/// Stable ordinal identifier of a stage (1-based).
pub type StageId = u32;

/// Track played on every stage clear screen.
pub const CLEAR_TRACK: &str = "/stepclear.mp3";

/// One dungeon-like stage of the quest.
///
/// Stages are ordered by `id` and unlock strictly linearly: completing stage
/// *n* makes stage *n + 1* available. The last stage leads to the epilogue
/// instead of a successor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: StageId,
    pub title: String,
    /// Short instruction shown above the task.
    pub objective: String,
    #[serde(default)]
    pub status: StageStatus,
    pub task: Task,
    /// Granted in order, exactly once, when the stage completes.
    #[serde(default)]
    pub rewards: Vec<Reward>,
    /// Looping background track for the stage's task view.
    pub battle_track: String,
}

/// The lifecycle state of a stage.
///
/// - `Locked`: Not yet reachable; views redirect to the map
/// - `Available`: Reachable, task not yet cleared
/// - `Completed`: Task cleared and rewards granted
///
/// Transitions only move forward; a stage never re-locks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Locked,
    Available,
    Completed,
}

/// Compact stage listing used for the map view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSummary {
    pub id: StageId,
    pub title: String,
    pub status: StageStatus,
}

impl From<&Stage> for StageSummary {
    fn from(stage: &Stage) -> Self {
        Self {
            id: stage.id,
            title: stage.title.clone(),
            status: stage.status,
        }
    }
}
