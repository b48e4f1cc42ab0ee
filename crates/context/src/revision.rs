//! Revision engine
//!
//! Applies one free-text instruction to the current document. The result is
//! accepted only if it keeps at least the table rows and `|` delimiters of
//! the document it replaces; otherwise the session is left untouched.

use crate::orchestrator::call_model;
use crate::prompts::PromptBuilder;
use crate::session::{GenerationSession, SnapshotOrigin};
use crate::tables::{self, StructureProfile};
use curriforge_common::config::{AppConfig, ModelParams};
use curriforge_common::errors::{AppError, Result};
use curriforge_common::llm::LanguageModel;
use curriforge_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct RevisionReport {
    pub accepted: bool,
    /// Index of the snapshot the revision created
    pub snapshot_index: usize,
    pub before: StructureProfile,
    pub after: StructureProfile,
}

pub struct RevisionEngine {
    model: Arc<dyn LanguageModel>,
    params: ModelParams,
    call_timeout: Duration,
    normalize: bool,
    prompts: PromptBuilder,
}

impl RevisionEngine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        params: ModelParams,
        call_timeout: Duration,
        normalize: bool,
    ) -> Self {
        Self {
            model,
            params,
            call_timeout,
            normalize,
            prompts: PromptBuilder::new(0),
        }
    }

    pub fn from_app_config(model: Arc<dyn LanguageModel>, config: &AppConfig) -> Self {
        Self::new(
            model,
            config.generation.revision.clone(),
            config.model_call_timeout(),
            config.generation.normalize_tables,
        )
    }

    /// Revise the current document.
    ///
    /// On any error the session keeps its previous current snapshot:
    /// `Validation` for an empty instruction, `ModelService`/`ModelTimeout`
    /// when the call fails, `StructuralValidation` when the output lost
    /// table structure.
    pub async fn revise(
        &self,
        session: &mut GenerationSession,
        instruction: &str,
        deadline: Option<Instant>,
    ) -> Result<RevisionReport> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(AppError::Validation {
                message: "instruction must not be empty".to_string(),
                field: Some("instruction".to_string()),
            });
        }

        let current = session.current_text();
        let before = StructureProfile::of(current);
        let prompt = self.prompts.revision(session.kind(), current, instruction);

        let raw = match call_model(
            self.model.as_ref(),
            &prompt,
            &self.params,
            self.call_timeout,
            deadline,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Revision call failed, document unchanged");
                metrics::record_revision(false);
                return Err(e);
            }
        };

        let revised = if self.normalize {
            tables::normalize_document(&raw)
        } else {
            raw.trim().to_string()
        };

        let after = StructureProfile::of(&revised);
        if revised.is_empty() || !after.covers(&before) {
            tracing::warn!(
                session_id = %session.id(),
                rows_before = before.rows,
                rows_after = after.rows,
                delimiters_before = before.delimiters,
                delimiters_after = after.delimiters,
                "Revision rejected, structure lost"
            );
            metrics::record_revision(false);
            return Err(AppError::StructuralValidation {
                expected_rows: before.rows,
                expected_delimiters: before.delimiters,
                found_rows: after.rows,
                found_delimiters: after.delimiters,
            });
        }

        let snapshot_index = session
            .push(
                revised,
                SnapshotOrigin::Revision {
                    instruction: instruction.to_string(),
                },
            )
            .index;
        metrics::record_revision(true);
        tracing::info!(session_id = %session.id(), snapshot_index, "Revision accepted");

        Ok(RevisionReport {
            accepted: true,
            snapshot_index,
            before,
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{DocumentKind, GenerationRequest};
    use curriforge_common::llm::{MockLanguageModel, MockReply};
    use curriforge_search::RetrievalParams;

    const DOCUMENT: &str = "| ITEM | CONTENIDO |\n| --- | --- |\n| **TÍTULO DE LA UNIDAD DIDÁCTICA** | Agua |\n| **SITUACIÓN SIGNIFICATIVA** | Sequía en la comunidad |";

    fn session() -> GenerationSession {
        GenerationSession::start(
            GenerationRequest::new(DocumentKind::LearningUnit, RetrievalParams::default()),
            DOCUMENT.to_string(),
        )
    }

    fn engine(model: Arc<MockLanguageModel>) -> RevisionEngine {
        RevisionEngine::from_app_config(model, &AppConfig::default())
    }

    #[tokio::test]
    async fn test_accepted_revision_appends_snapshot() {
        let revised = DOCUMENT.replace("Agua", "Agua segura");
        let model = Arc::new(MockLanguageModel::with_script([MockReply::Text(revised.clone())]));
        let mut s = session();

        let report = engine(model.clone())
            .revise(&mut s, "Cambia el título", None)
            .await
            .unwrap();

        assert!(report.accepted);
        assert_eq!(report.snapshot_index, 1);
        assert_eq!(s.current_text(), revised);
        assert!(matches!(s.current().origin, SnapshotOrigin::Revision { .. }));
        assert!(model.prompts()[0].contains(DOCUMENT));
        assert!(model.prompts()[0].contains("Cambia el título"));
    }

    #[tokio::test]
    async fn test_half_the_markers_is_rejected() {
        let half = "| ITEM | CONTENIDO |\n| --- | --- |";
        let model = Arc::new(MockLanguageModel::with_script([MockReply::Text(half.to_string())]));
        let mut s = session();

        let err = engine(model).revise(&mut s, "Resume", None).await.unwrap_err();

        match err {
            AppError::StructuralValidation { expected_rows, found_rows, .. } => {
                assert_eq!(expected_rows, 4);
                assert_eq!(found_rows, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(s.snapshots().len(), 1);
        assert_eq!(s.current_text(), DOCUMENT);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_document() {
        let model = Arc::new(MockLanguageModel::with_script([MockReply::Fail("throttled".to_string())]));
        let mut s = session();

        let err = engine(model).revise(&mut s, "Agrega una fila", None).await.unwrap_err();
        assert!(err.is_model_failure());
        assert_eq!(s.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_instruction_is_validation_error() {
        let model = Arc::new(MockLanguageModel::new());
        let mut s = session();

        let err = engine(model.clone()).revise(&mut s, "   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_extra_rows_are_accepted() {
        let longer = format!("{}\n| **EVIDENCIAS** | Informe |", DOCUMENT);
        let model = Arc::new(MockLanguageModel::with_script([MockReply::Text(longer)]));
        let mut s = session();

        let report = engine(model).revise(&mut s, "Agrega evidencias", None).await.unwrap();
        assert_eq!(report.after.rows, report.before.rows + 1);
    }
}
