//! Context retrieval handler
//!
//! Exposes retrieval on its own so callers can inspect what a generation
//! request would be grounded on.

use axum::{extract::State, Json};
use curriforge_search::RetrievalParams;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use curriforge_common::errors::{AppError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct ContextRequest {
    #[validate(range(min = 1, max = 6))]
    pub grade: Option<u8>,

    #[validate(length(max = 200))]
    pub area: Option<String>,

    #[validate(length(max = 1000))]
    pub competency: Option<String>,

    #[validate(length(max = 1000))]
    pub topic: Option<String>,
}

impl From<ContextRequest> for RetrievalParams {
    fn from(request: ContextRequest) -> Self {
        RetrievalParams {
            grade: request.grade,
            area: request.area,
            competency: request.competency,
            topic: request.topic,
        }
    }
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub tokens: Vec<String>,
    pub items: Vec<ContextItem>,
    pub rendered: String,
    pub total_candidates: usize,
    pub grounded: bool,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct ContextItem {
    pub source: String,
    pub source_label: String,
    pub chunk_id: String,
    pub section: String,
    pub text: String,
    pub score: f32,
}

/// Retrieve and assemble the context block for a set of parameters
pub async fn retrieve_context(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let params = RetrievalParams::from(request);
    let tokens = state.retriever.tokens(&params);
    let bundle = state.retriever.retrieve_context(&params);

    let items = bundle
        .items
        .iter()
        .map(|item| ContextItem {
            source: item.source_id.to_string(),
            source_label: item.source_label.to_string(),
            chunk_id: item.chunk.id.clone(),
            section: item.chunk.section.clone(),
            text: item.chunk.text.clone(),
            score: item.score,
        })
        .collect();

    Ok(Json(ContextResponse {
        tokens: tokens.iter().map(String::from).collect(),
        items,
        grounded: bundle.is_grounded(),
        total_candidates: bundle.total_candidates,
        rendered: bundle.rendered,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
