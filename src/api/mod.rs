mod handlers;

pub use handlers::{CompletionResponse, StageAudio, StageView};

use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::media::AudioSettings;
use crate::persistence::{PersistencePolicy, Persister};
use crate::progression::ProgressionEngine;

/// Shared state behind every handler.
///
/// The engine lock is never held across an await.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<ProgressionEngine>>,
    pub persister: Persister,
    /// Applied to the tracks each stage view advertises.
    pub audio: AudioSettings,
}

impl AppState {
    pub fn new(engine: ProgressionEngine, persister: Persister) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            persister,
            audio: AudioSettings::default(),
        }
    }

    pub fn with_audio(mut self, audio: AudioSettings) -> Self {
        self.audio = audio;
        self
    }

    /// Build the default catalog and replay everything saved in `db`.
    pub fn from_database(db: Database, policy: PersistencePolicy) -> anyhow::Result<Self> {
        let persister = Persister::new(Arc::new(db), policy);
        let mut engine = ProgressionEngine::with_default_catalog()?;

        let records = persister.load()?;
        let report = engine.restore(&records);
        tracing::info!(
            "Restored {} stage completion(s), skipped {}",
            report.restored,
            report.skipped
        );

        Ok(Self::new(engine, persister))
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Stages
        .route("/stages", get(handlers::list_stages))
        .route("/stages/{id}", get(handlers::get_stage))
        .route("/stages/{id}/evaluate", post(handlers::evaluate_stage))
        .route("/stages/{id}/complete", post(handlers::complete_stage))
        .route("/stages/{id}/save", post(handlers::retry_save))
        .route("/stages/{id}/rewards", get(handlers::get_stage_rewards))
        .route("/stages/{id}/next", get(handlers::get_next_stage))
        // Ledger
        .route("/ledger", get(handlers::get_ledger))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
