//! Health check handlers

use axum::{extract::State, Json};
use curriforge_common::config::SourceRole;
use curriforge_search::SourceStatus;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub sources: Vec<SourceCheck>,
    pub active_sessions: usize,
}

#[derive(Serialize)]
pub struct SourceCheck {
    pub id: String,
    pub label: String,
    pub role: SourceRole,
    #[serde(flatten)]
    pub status: SourceStatus,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: curriforge_common::VERSION,
    })
}

/// Readiness probe - ready once at least one corpus source loaded
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let corpus = state.retriever.corpus();

    let sources = corpus
        .sources()
        .iter()
        .map(|source| SourceCheck {
            id: source.id.to_string(),
            label: source.label.to_string(),
            role: source.role,
            status: source.status.clone(),
        })
        .collect();

    Json(ReadyResponse {
        status: if corpus.is_ready() { "ready" } else { "not_ready" }.to_string(),
        sources,
        active_sessions: state.sessions.len().await,
    })
}
