//! Plain-text rendering of the stage map and obtained rewards.

use crate::models::{LedgerSummary, Reward, StageStatus, StageSummary};

const LOCKED: char = '◇';
const AVAILABLE: char = '○';
const COMPLETED: char = '●';

fn status_symbol(status: StageStatus) -> char {
    match status {
        StageStatus::Locked => LOCKED,
        StageStatus::Available => AVAILABLE,
        StageStatus::Completed => COMPLETED,
    }
}

/// Render the stage map, ending in the epilogue.
///
/// Example output:
/// ```text
/// Closet Quest
/// ├── ● 1. Gate of Resolve
/// ├── ○ 2. Altar of Selection
/// ├── ◇ 3. Hall of the Void
/// └── Epilogue
/// ```
pub fn render_stage_map(stages: &[StageSummary]) -> String {
    let mut output = String::from("Closet Quest\n");
    for stage in stages {
        output.push_str("├── ");
        output.push(status_symbol(stage.status));
        output.push_str(&format!(" {}. {}\n", stage.id, stage.title));
    }

    let cleared = stages
        .iter()
        .all(|s| s.status == StageStatus::Completed);
    output.push_str("└── Epilogue");
    if !cleared {
        output.push_str(" (sealed)");
    }
    output.push('\n');
    output
}

/// Render the obtained items and experience total.
pub fn render_ledger(summary: &LedgerSummary) -> String {
    let mut output = String::new();
    if summary.items.is_empty() {
        output.push_str("No items obtained yet\n");
    }
    for item in &summary.items {
        if let Reward::Item { name, description } = item {
            output.push_str(&format!("• {} - {}\n", name, description));
        }
    }
    output.push_str(&format!("Experience: {}\n", summary.total_experience));
    output
}
