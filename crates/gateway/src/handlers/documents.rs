//! Document generation and revision handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use curriforge_common::errors::{AppError, ErrorCode, Result};
use curriforge_context::{
    tables, CompletionStatus, DocumentDetails, DocumentKind, GenerationRequest, GenerationSession,
    GenerationState, SnapshotOrigin, StructureProfile,
};
use curriforge_search::{Citation, RetrievalParams};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

fn default_use_context() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    pub kind: DocumentKind,

    #[validate(range(min = 1, max = 6))]
    pub grade: Option<u8>,

    #[validate(length(max = 200))]
    pub area: Option<String>,

    #[validate(length(max = 1000))]
    pub competency: Option<String>,

    #[validate(length(max = 1000))]
    pub topic: Option<String>,

    #[validate(length(max = 4000))]
    pub capacities: Option<String>,

    #[validate(length(max = 4000))]
    pub contents: Option<String>,

    #[validate(length(max = 50))]
    pub level: Option<String>,

    #[validate(length(max = 20))]
    pub classroom_section: Option<String>,

    #[validate(length(max = 100))]
    pub duration: Option<String>,

    #[validate(length(max = 300))]
    pub unit_title: Option<String>,

    #[validate(length(max = 300))]
    pub session_title: Option<String>,

    #[validate(length(max = 200000))]
    pub reference_document: Option<String>,

    /// Retrieve corpus context for the draft prompt
    #[serde(default = "default_use_context")]
    pub use_context: bool,
}

impl CreateDocumentRequest {
    fn into_generation_request(self) -> GenerationRequest {
        GenerationRequest {
            kind: self.kind,
            params: RetrievalParams {
                grade: self.grade,
                area: self.area,
                competency: self.competency,
                topic: self.topic,
            },
            details: DocumentDetails {
                capacities: self.capacities,
                contents: self.contents,
                level: self.level,
                classroom_section: self.classroom_section,
                duration: self.duration,
                unit_title: self.unit_title,
                session_title: self.session_title,
            },
            reference_document: self.reference_document,
        }
    }
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub document: String,
    pub status: CompletionStatus,
    pub snapshot_count: usize,
    pub iteration: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub session_titles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentResponse {
    fn from_session(session: &GenerationSession, status: &CompletionStatus) -> Self {
        let document = session.current_text();
        Self {
            id: session.id(),
            kind: session.kind(),
            document: document.to_string(),
            status: status.clone(),
            snapshot_count: session.snapshots().len(),
            iteration: session.iteration(),
            unit_title: tables::extract_unit_title(document),
            session_titles: tables::extract_session_titles(document),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct CreateDocumentResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub state: GenerationState,
    pub grounded: bool,
    pub citations: Vec<Citation>,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct SnapshotItem {
    pub index: usize,
    pub origin: SnapshotOrigin,
    pub digest: String,
    pub chars: usize,
    pub created_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Serialize)]
pub struct SnapshotsResponse {
    pub id: Uuid,
    pub current: usize,
    pub snapshots: Vec<SnapshotItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RevisionRequest {
    #[validate(length(min = 1, max = 4000))]
    pub instruction: String,
}

#[derive(Serialize)]
pub struct RevisionResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<StructureProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<StructureProfile>,
    /// Current document after the attempt
    pub document: String,
}

/// Generate a new document: retrieve context, draft, critique
pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreateDocumentResponse>)> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let use_context = request.use_context;
    let generation = request.into_generation_request();
    generation.validate()?;

    let bundle = use_context.then(|| state.retriever.retrieve_context(&generation.params));
    let deadline = tokio::time::Instant::now() + state.config.request_timeout();

    let report = state
        .orchestrator
        .generate(generation, bundle.as_ref(), Some(deadline))
        .await?;

    let document = DocumentResponse::from_session(&report.session, &report.status);
    let id = state.sessions.insert(report.session, report.status).await;

    tracing::info!(
        session_id = %id,
        kind = document.kind.as_str(),
        complete = document.status.is_complete(),
        "Document created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateDocumentResponse {
            document,
            state: report.state,
            grounded: report.grounded,
            citations: report.citations,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }),
    ))
}

/// Current version of a document
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let slot = state.sessions.acquire(id).await?;
    Ok(Json(DocumentResponse::from_session(&slot.session, &slot.status)))
}

/// Full snapshot history of a document
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SnapshotsResponse>> {
    let slot = state.sessions.acquire(id).await?;
    let session = &slot.session;

    let snapshots = session
        .snapshots()
        .iter()
        .map(|snapshot| SnapshotItem {
            index: snapshot.index,
            origin: snapshot.origin.clone(),
            digest: snapshot.digest.clone(),
            chars: snapshot.text.chars().count(),
            created_at: snapshot.created_at,
            text: snapshot.text.clone(),
        })
        .collect();

    Ok(Json(SnapshotsResponse {
        id,
        current: session.current().index,
        snapshots,
    }))
}

/// Apply a revision instruction. A rejected revision is still a 200: the
/// body says `accepted: false` and carries the unchanged document.
pub async fn revise_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RevisionRequest>,
) -> Result<Json<RevisionResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("instruction".to_string()),
    })?;

    let mut slot = state.sessions.acquire(id).await?;
    let deadline = tokio::time::Instant::now() + state.config.request_timeout();

    match state
        .revisions
        .revise(&mut slot.session, &request.instruction, Some(deadline))
        .await
    {
        Ok(report) => Ok(Json(RevisionResponse {
            accepted: true,
            snapshot_index: Some(report.snapshot_index),
            reason: None,
            error_code: None,
            before: Some(report.before),
            after: Some(report.after),
            document: slot.session.current_text().to_string(),
        })),
        Err(e) if e.is_model_failure() || matches!(e, AppError::StructuralValidation { .. }) => {
            Ok(Json(RevisionResponse {
                accepted: false,
                snapshot_index: None,
                reason: Some(e.to_string()),
                error_code: Some(e.code()),
                before: None,
                after: None,
                document: slot.session.current_text().to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

/// End a document session
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(id).await?;
    tracing::info!(session_id = %id, "Document session closed");
    Ok(StatusCode::NO_CONTENT)
}
