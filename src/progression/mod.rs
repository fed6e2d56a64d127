//! Stage state machine and reward issuance.
//!
//! [`ProgressionEngine`] is the authoritative in-memory record of which stages
//! are reachable, which are cleared, and what has been granted. Every mutation
//! goes through [`ProgressionEngine::complete_stage`], which either applies
//! fully (status, ledger, successor unlock) or not at all.

mod catalog;

pub use catalog::{default_catalog, parse_catalog};

use chrono::Utc;
use thiserror::Error;

use crate::models::*;

/// Errors returned by progression operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("Stage {0} not found")]
    UnknownStage(StageId),

    #[error("Stage {0} is locked")]
    StageLocked(StageId),

    #[error("Task for stage {0} is not satisfied")]
    TaskNotSatisfied(StageId),

    #[error("Invalid stage catalog: {0}")]
    InvalidCatalog(String),
}

/// Outcome of replaying persisted completions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    /// Sorted by id; ids are `1..=len`.
    stages: Vec<Stage>,
    ledger: Vec<LedgerEntry>,
}

impl ProgressionEngine {
    /// Build an engine over a catalog.
    ///
    /// Ids must form the contiguous sequence `1..=n` in any order. The first
    /// stage is opened if the catalog leaves it locked.
    pub fn new(mut stages: Vec<Stage>) -> Result<Self, ProgressionError> {
        if stages.is_empty() {
            return Err(ProgressionError::InvalidCatalog(
                "catalog has no stages".to_string(),
            ));
        }

        stages.sort_by_key(|s| s.id);
        for (i, stage) in stages.iter().enumerate() {
            let expected = i as StageId + 1;
            if stage.id != expected {
                return Err(ProgressionError::InvalidCatalog(format!(
                    "expected stage {} but found stage {}",
                    expected, stage.id
                )));
            }
        }

        if stages[0].status == StageStatus::Locked {
            stages[0].status = StageStatus::Available;
        }

        Ok(Self {
            stages,
            ledger: Vec::new(),
        })
    }

    pub fn with_default_catalog() -> Result<Self, ProgressionError> {
        Self::new(default_catalog()?)
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn summaries(&self) -> Vec<StageSummary> {
        self.stages.iter().map(Into::into).collect()
    }

    pub fn stage(&self, id: StageId) -> Result<&Stage, ProgressionError> {
        self.index_of(id).map(|i| &self.stages[i])
    }

    /// Gate a stage view: locked stages redirect to the map.
    pub fn access(&self, id: StageId) -> Result<StageAccess, ProgressionError> {
        let stage = self.stage(id)?;
        if stage.status == StageStatus::Locked {
            tracing::debug!("Stage {} is locked, redirecting to map", id);
            return Ok(StageAccess::Redirect(Destination::Map));
        }
        Ok(StageAccess::Open(stage.clone()))
    }

    /// Judge evidence for a stage without changing anything.
    pub fn evaluate_task(
        &self,
        id: StageId,
        evidence: &Evidence,
    ) -> Result<TaskEvaluation, ProgressionError> {
        Ok(self.stage(id)?.task.evaluate(evidence))
    }

    /// Where to go after clearing `id`.
    ///
    /// The final stage never unlocks anything; it leads to the epilogue.
    pub fn next_stage(&self, id: StageId) -> Result<Destination, ProgressionError> {
        let i = self.index_of(id)?;
        Ok(match self.stages.get(i + 1) {
            Some(next) => Destination::Stage(next.id),
            None => Destination::Epilogue,
        })
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// Rewards already recorded for a stage, in configured order.
    pub fn rewards_for(&self, id: StageId) -> Vec<LedgerEntry> {
        let mut entries: Vec<_> = self
            .ledger
            .iter()
            .filter(|e| e.stage_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.index);
        entries
    }

    pub fn total_experience(&self) -> u32 {
        self.ledger
            .iter()
            .map(|e| e.reward.experience_points())
            .sum()
    }

    pub fn obtained_items(&self) -> Vec<Reward> {
        self.ledger
            .iter()
            .filter(|e| matches!(e.reward, Reward::Item { .. }))
            .map(|e| e.reward.clone())
            .collect()
    }

    pub fn ledger_summary(&self) -> LedgerSummary {
        LedgerSummary {
            entries: self.ledger.clone(),
            total_experience: self.total_experience(),
            items: self.obtained_items(),
        }
    }

    // ============================================================
    // Completion
    // ============================================================

    /// Close a stage and grant its rewards.
    ///
    /// Returns the rewards granted by this call. Completing a stage that is
    /// already `Completed` changes nothing and returns the rewards recorded
    /// earlier, so a revisited clear screen renders the same list.
    pub fn complete_stage(
        &mut self,
        id: StageId,
        evidence: &Evidence,
    ) -> Result<Vec<LedgerEntry>, ProgressionError> {
        let i = self.index_of(id)?;
        let stage = &self.stages[i];

        match stage.status {
            StageStatus::Completed => {
                tracing::debug!("Stage {} already completed, returning recorded rewards", id);
                return Ok(self.rewards_for(id));
            }
            StageStatus::Locked => return Err(ProgressionError::StageLocked(id)),
            StageStatus::Available => {}
        }

        if !stage.task.is_satisfied(evidence) {
            tracing::debug!("Stage {} rejected: {} task not satisfied", id, stage.task.kind());
            return Err(ProgressionError::TaskNotSatisfied(id));
        }

        // Build everything before mutating so the call applies all or nothing.
        let now = Utc::now();
        let granted: Vec<LedgerEntry> = stage
            .rewards
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.is_recorded(id, *index))
            .map(|(index, reward)| LedgerEntry {
                stage_id: id,
                index,
                reward: reward.clone(),
                granted_at: now,
            })
            .collect();

        self.ledger.extend(granted.iter().cloned());
        self.stages[i].status = StageStatus::Completed;

        if let Some(next) = self.stages.get_mut(i + 1) {
            if next.status == StageStatus::Locked {
                next.status = StageStatus::Available;
                tracing::info!("Stage {} unlocked", next.id);
            }
        }

        tracing::info!("Stage {} completed, {} reward(s) granted", id, granted.len());
        Ok(granted)
    }

    /// Replay persisted completions in chronological order.
    ///
    /// Records that can no longer be applied (unknown stage, still locked,
    /// evidence no longer satisfying) are skipped.
    pub fn restore(&mut self, records: &[CompletionRecord]) -> RestoreReport {
        let mut ordered: Vec<&CompletionRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.completed_at);

        let mut report = RestoreReport::default();
        for record in ordered {
            match self.complete_stage(record.stage_id, &record.evidence) {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    tracing::warn!("Skipping completion record {}: {}", record.id, e);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    fn index_of(&self, id: StageId) -> Result<usize, ProgressionError> {
        let index = (id as usize)
            .checked_sub(1)
            .filter(|i| *i < self.stages.len())
            .ok_or(ProgressionError::UnknownStage(id))?;
        Ok(index)
    }

    fn is_recorded(&self, id: StageId, index: usize) -> bool {
        self.ledger
            .iter()
            .any(|e| e.stage_id == id && e.index == index)
    }
}
