use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::media::TrackConfig;
use crate::models::*;
use crate::persistence::{PersistenceError, SaveOutcome};
use crate::progression::ProgressionError;

use super::AppState;

// ============================================================
// Error Handling
// ============================================================

/// Map a progression error to a client response.
///
/// Player-facing conditions keep their message; anything else is logged and
/// sanitized.
fn progression_error(e: ProgressionError) -> (StatusCode, String) {
    let status = match e {
        ProgressionError::UnknownStage(_) => StatusCode::NOT_FOUND,
        ProgressionError::StageLocked(_) => StatusCode::CONFLICT,
        ProgressionError::TaskNotSatisfied(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProgressionError::InvalidCatalog(_) => {
            tracing::error!("Internal error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    tracing::debug!("Rejected: {}", e);
    (status, e.to_string())
}

// ============================================================
// Responses
// ============================================================

/// A stage as shown by its task view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageView {
    #[serde(flatten)]
    pub stage: Stage,
    pub audio: StageAudio,
}

/// Tracks for the stage's task view and clear screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAudio {
    pub battle: TrackConfig,
    pub clear: TrackConfig,
    pub start_muted: bool,
}

/// Everything the clear screen needs after a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub stage: StageSummary,
    pub granted: Vec<LedgerEntry>,
    pub next: Destination,
    pub save: SaveOutcome,
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Stages
// ============================================================

pub async fn list_stages(State(state): State<AppState>) -> Json<Vec<StageSummary>> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    Json(engine.summaries())
}

/// Locked stages are not reachable; the view is redirected to the map.
pub async fn get_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Response, (StatusCode, String)> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    match engine.access(id).map_err(progression_error)? {
        StageAccess::Open(stage) => {
            let audio = StageAudio {
                battle: state.audio.track(stage.battle_track.as_str()),
                clear: state.audio.track(CLEAR_TRACK),
                start_muted: state.audio.start_muted,
            };
            Ok(Json(StageView { stage, audio }).into_response())
        }
        StageAccess::Redirect(_) => Ok(Redirect::to("/api/v1/stages").into_response()),
    }
}

pub async fn evaluate_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
    Json(evidence): Json<Evidence>,
) -> Result<Json<TaskEvaluation>, (StatusCode, String)> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    engine
        .evaluate_task(id, &evidence)
        .map(Json)
        .map_err(progression_error)
}

/// Close a stage, then hand the record to persistence.
///
/// The engine's state is kept whatever the save outcome; a failed save is
/// reported in `save` and can be retried via `/stages/{id}/save`. Repeating a
/// completion reports the stage's save as it settles, retrying it if needed.
pub async fn complete_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
    Json(evidence): Json<Evidence>,
) -> Result<Json<CompletionResponse>, (StatusCode, String)> {
    let (summary, granted, next) = {
        let mut engine = state.engine.lock().expect("engine lock poisoned");
        let was_completed = engine.stage(id).map_err(progression_error)?.status
            == StageStatus::Completed;
        let granted = engine
            .complete_stage(id, &evidence)
            .map_err(progression_error)?;
        if !was_completed {
            // Registered before the lock drops so a concurrent repeat sees it.
            state.persister.enqueue(CompletionRecord::new(id, evidence));
        }
        let summary = StageSummary::from(engine.stage(id).map_err(progression_error)?);
        let next = engine.next_stage(id).map_err(progression_error)?;
        (summary, granted, next)
    };

    let save = SaveOutcome::from(&state.persister.flush(id).await);

    Ok(Json(CompletionResponse {
        stage: summary,
        granted,
        next,
        save,
    }))
}

pub async fn retry_save(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Json<SaveOutcome>, Response> {
    let result = state.persister.retry(id).await;
    match &result {
        Ok(()) => Ok(Json(SaveOutcome::Saved)),
        Err(e @ PersistenceError::NothingPending(_)) => {
            Err((StatusCode::NOT_FOUND, e.to_string()).into_response())
        }
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SaveOutcome::from(&result)),
        )
            .into_response()),
    }
}

pub async fn get_stage_rewards(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Json<Vec<LedgerEntry>>, (StatusCode, String)> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    engine.stage(id).map_err(progression_error)?;
    Ok(Json(engine.rewards_for(id)))
}

pub async fn get_next_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Json<Destination>, (StatusCode, String)> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    engine.next_stage(id).map(Json).map_err(progression_error)
}

// ============================================================
// Ledger
// ============================================================

pub async fn get_ledger(State(state): State<AppState>) -> Json<LedgerSummary> {
    let engine = state.engine.lock().expect("engine lock poisoned");
    Json(engine.ledger_summary())
}
