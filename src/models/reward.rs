use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::StageId;

/// Something granted to the player when a stage clears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reward {
    /// A named virtual item shown in the obtained-items list.
    Item { name: String, description: String },
    /// Experience points added to the player's total.
    Experience { points: u32 },
}

impl Reward {
    pub fn experience_points(&self) -> u32 {
        match self {
            Self::Experience { points } => *points,
            Self::Item { .. } => 0,
        }
    }
}

/// An append-only record of a reward granted for a stage.
///
/// `(stage_id, index)` identifies the entry; `index` is the reward's position
/// in the stage's configured reward list. The pair is unique in the ledger,
/// which is what keeps replayed completions from granting twice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub stage_id: StageId,
    pub index: usize,
    pub reward: Reward,
    pub granted_at: DateTime<Utc>,
}

/// Everything the player has obtained so far, for the inventory view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSummary {
    pub entries: Vec<LedgerEntry>,
    pub total_experience: u32,
    pub items: Vec<Reward>,
}
