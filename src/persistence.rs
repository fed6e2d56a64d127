//! Fire-and-forget saving of stage completions.
//!
//! The engine applies a completion first; only then is the record handed to
//! a [`Persister`]. A failed write never rolls progression back. It is kept
//! as pending for its stage and reported to the player as retryable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Database;
use crate::models::{CompletionRecord, StageId};

/// Shown to the player when a save fails.
pub const SAVE_FAILED_MESSAGE: &str = "An error occurred while saving. Please try again.";

/// Durable destination for completion records.
pub trait CompletionStore: Send + Sync + 'static {
    fn record_completion(&self, record: &CompletionRecord) -> anyhow::Result<()>;
    fn load_completions(&self) -> anyhow::Result<Vec<CompletionRecord>>;
}

impl CompletionStore for Database {
    fn record_completion(&self, record: &CompletionRecord) -> anyhow::Result<()> {
        self.insert_completion(record)
    }

    fn load_completions(&self) -> anyhow::Result<Vec<CompletionRecord>> {
        self.get_completions()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Saving stage {stage_id} failed: {reason}")]
    WriteFailed { stage_id: StageId, reason: String },

    #[error("Saving stage {0} timed out")]
    TimedOut(StageId),

    #[error("No pending save for stage {0}")]
    NothingPending(StageId),
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailed { .. } | Self::TimedOut(_))
    }
}

/// Result of a save as reported to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    Failed { retryable: bool, message: String },
}

impl From<&Result<(), PersistenceError>> for SaveOutcome {
    fn from(result: &Result<(), PersistenceError>) -> Self {
        match result {
            Ok(()) => Self::Saved,
            Err(e) => Self::Failed {
                retryable: e.is_retryable(),
                message: SAVE_FAILED_MESSAGE.to_string(),
            },
        }
    }
}

/// Timeout and retry budget for one save.
#[derive(Debug, Clone, Copy)]
pub struct PersistencePolicy {
    /// Per-attempt limit.
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Per-stage write lane. Saves for one stage never overlap.
type Lane = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn CompletionStore>,
    policy: PersistencePolicy,
    /// Records not yet known to be durable, including those being written.
    pending: Arc<Mutex<HashMap<StageId, CompletionRecord>>>,
    lanes: Arc<Mutex<HashMap<StageId, Lane>>>,
}

impl Persister {
    pub fn new(store: Arc<dyn CompletionStore>, policy: PersistencePolicy) -> Self {
        Self {
            store,
            policy,
            pending: Arc::new(Mutex::new(HashMap::new())),
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a record as not yet saved. Call this while the engine change
    /// it describes is still exclusive, then [`flush`](Self::flush) it.
    pub fn enqueue(&self, record: CompletionRecord) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(record.stage_id, record);
    }

    /// Settle the stage's save: wait for any write in flight, then write the
    /// pending record if one is left, retrying within the policy's budget.
    /// `Ok` means the stage is durable.
    ///
    /// On failure the record stays pending for its stage until a later write
    /// succeeds or a newer record for the same stage replaces it.
    pub async fn flush(&self, stage_id: StageId) -> Result<(), PersistenceError> {
        match self.write_pending(stage_id).await {
            Err(PersistenceError::NothingPending(_)) => Ok(()),
            result => result,
        }
    }

    /// Re-attempt the pending save for a stage.
    pub async fn retry(&self, stage_id: StageId) -> Result<(), PersistenceError> {
        self.write_pending(stage_id).await
    }

    pub fn has_pending(&self, stage_id: StageId) -> bool {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .contains_key(&stage_id)
    }

    pub fn pending_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<_> = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .keys()
            .copied()
            .collect();
        stages.sort_unstable();
        stages
    }

    pub fn load(&self) -> anyhow::Result<Vec<CompletionRecord>> {
        self.store.load_completions()
    }

    fn lane(&self, stage_id: StageId) -> Lane {
        self.lanes
            .lock()
            .expect("lanes lock poisoned")
            .entry(stage_id)
            .or_default()
            .clone()
    }

    async fn write_pending(&self, stage_id: StageId) -> Result<(), PersistenceError> {
        let lane = self.lane(stage_id);
        let _turn = lane.lock().await;

        let record = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .get(&stage_id)
            .cloned()
            .ok_or(PersistenceError::NothingPending(stage_id))?;

        let attempts = self.policy.retries + 1;
        let mut last_error = PersistenceError::WriteFailed {
            stage_id,
            reason: "no attempt made".to_string(),
        };

        for attempt in 1..=attempts {
            match self.write_once(&record).await {
                Ok(()) => {
                    let mut pending = self.pending.lock().expect("pending lock poisoned");
                    if pending.get(&stage_id).map(|r| r.id) == Some(record.id) {
                        pending.remove(&stage_id);
                    }
                    tracing::debug!("Saved completion of stage {}", stage_id);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Save attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn write_once(&self, record: &CompletionRecord) -> Result<(), PersistenceError> {
        let stage_id = record.stage_id;
        let store = self.store.clone();
        let record = record.clone();
        let write = tokio::task::spawn_blocking(move || store.record_completion(&record));

        match tokio::time::timeout(self.policy.timeout, write).await {
            Err(_) => Err(PersistenceError::TimedOut(stage_id)),
            Ok(Err(join)) => Err(PersistenceError::WriteFailed {
                stage_id,
                reason: join.to_string(),
            }),
            Ok(Ok(Err(e))) => Err(PersistenceError::WriteFailed {
                stage_id,
                reason: e.to_string(),
            }),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("policy", &self.policy)
            .field("pending", &self.pending_stages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Evidence;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes, then succeeds.
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
    }

    impl CompletionStore for FlakyStore {
        fn record_completion(&self, _record: &CompletionRecord) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("disk unavailable");
            }
            Ok(())
        }

        fn load_completions(&self) -> anyhow::Result<Vec<CompletionRecord>> {
            Ok(Vec::new())
        }
    }

    /// Blocks every write for `delay`, then fails or succeeds.
    struct SlowStore {
        delay: Duration,
        fail: bool,
        calls: AtomicU32,
    }

    impl SlowStore {
        fn new(delay_ms: u64, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                fail,
                calls: AtomicU32::new(0),
            })
        }
    }

    impl CompletionStore for SlowStore {
        fn record_completion(&self, _record: &CompletionRecord) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                anyhow::bail!("disk unavailable");
            }
            Ok(())
        }

        fn load_completions(&self) -> anyhow::Result<Vec<CompletionRecord>> {
            Ok(Vec::new())
        }
    }

    fn policy(retries: u32) -> PersistencePolicy {
        PersistencePolicy {
            timeout: Duration::from_secs(1),
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    async fn save(persister: &Persister, record: CompletionRecord) -> Result<(), PersistenceError> {
        let stage_id = record.stage_id;
        persister.enqueue(record);
        persister.flush(stage_id).await
    }

    fn record() -> CompletionRecord {
        CompletionRecord::new(3, Evidence::Progress { value: 100 })
    }

    #[tokio::test]
    async fn retries_within_budget() {
        let store = Arc::new(FlakyStore {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let persister = Persister::new(store.clone(), policy(2));

        assert!(save(&persister, record()).await.is_ok());
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert!(!persister.has_pending(3));
    }

    #[tokio::test]
    async fn failure_keeps_record_pending_until_retry() {
        let store = Arc::new(FlakyStore {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let persister = Persister::new(store, policy(0));

        let result = save(&persister, record()).await;
        let err = result.clone().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            SaveOutcome::from(&result),
            SaveOutcome::Failed {
                retryable: true,
                message: SAVE_FAILED_MESSAGE.to_string()
            }
        );
        assert_eq!(persister.pending_stages(), vec![3]);

        assert!(persister.retry(3).await.is_ok());
        assert!(!persister.has_pending(3));
    }

    #[tokio::test]
    async fn retry_without_pending_record() {
        let store = Arc::new(FlakyStore {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let persister = Persister::new(store, policy(0));

        let err = persister.retry(5).await.unwrap_err();
        assert_eq!(err, PersistenceError::NothingPending(5));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn slow_write_times_out_and_stays_pending() {
        let persister = Persister::new(
            SlowStore::new(300, false),
            PersistencePolicy {
                timeout: Duration::from_millis(20),
                retries: 0,
                backoff: Duration::ZERO,
            },
        );

        let result = save(&persister, record()).await;

        assert_eq!(result, Err(PersistenceError::TimedOut(3)));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(persister.pending_stages(), vec![3]);
    }

    #[tokio::test]
    async fn record_is_pending_while_its_write_runs() {
        let persister = Persister::new(SlowStore::new(100, false), policy(0));

        let (saved, pending_during) = tokio::join!(save(&persister, record()), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            persister.has_pending(3)
        });

        assert!(saved.is_ok());
        assert!(pending_during);
        assert!(!persister.has_pending(3));
    }

    #[tokio::test]
    async fn flush_waits_for_a_failing_write_in_flight() {
        let store = SlowStore::new(100, true);
        let persister = Persister::new(store.clone(), policy(0));

        let (first, second) = tokio::join!(save(&persister, record()), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            persister.flush(3).await
        });

        assert!(first.is_err());
        assert!(matches!(second, Err(PersistenceError::WriteFailed { .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(persister.pending_stages(), vec![3]);
    }

    #[tokio::test]
    async fn flush_after_a_successful_write_does_not_rewrite() {
        let store = SlowStore::new(100, false);
        let persister = Persister::new(store.clone(), policy(0));

        let (first, second) = tokio::join!(save(&persister, record()), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            persister.flush(3).await
        });

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
