//! Generation orchestrator
//!
//! Draft once, then run critique passes until the stop policy says done:
//!
//! ```text
//! Drafting ──ok──▶ Critiquing(1) ──ok──▶ Critiquing(2) ... ──▶ Done
//!    │                   │
//!    └─err──▶ Failed     └─err / truncated / deadline──▶ Done (partial)
//! ```
//!
//! A failed critique never touches the history: the last accepted snapshot
//! stays current and the report carries `CompletionStatus::Partial`.

use crate::prompts::{GenerationRequest, PromptBuilder};
use crate::session::{GenerationSession, SnapshotOrigin};
use crate::tables;
use curriforge_common::config::{AppConfig, GroundingPolicy, ModelParams, StopPolicyKind};
use curriforge_common::errors::{AppError, Result};
use curriforge_common::llm::LanguageModel;
use curriforge_common::metrics;
use curriforge_search::{Citation, ContextBundle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "iteration", rename_all = "snake_case")]
pub enum GenerationState {
    Drafting,
    Critiquing(usize),
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum GenerationStep {
    Draft,
    Critique { iteration: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Partial {
        failed_step: GenerationStep,
        reason: String,
    },
}

impl CompletionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, CompletionStatus::Complete)
    }
}

/// Decides whether the critique loop ends after an accepted pass
pub trait StopPolicy: Send + Sync {
    /// `completed` is the number of accepted critique passes so far
    fn should_stop(&self, completed: usize, session: &GenerationSession) -> bool;

    fn name(&self) -> &str;
}

/// Run exactly N passes
#[derive(Debug, Clone, Copy)]
pub struct FixedIterations(pub usize);

impl StopPolicy for FixedIterations {
    fn should_stop(&self, completed: usize, _session: &GenerationSession) -> bool {
        completed >= self.0
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Up to `max_iterations` passes, stopping once a pass changes nothing
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    pub max_iterations: usize,
}

impl StopPolicy for Convergence {
    fn should_stop(&self, completed: usize, session: &GenerationSession) -> bool {
        completed >= self.max_iterations || session.converged()
    }

    fn name(&self) -> &str {
        "convergence"
    }
}

pub fn stop_policy(kind: StopPolicyKind, iterations: usize) -> Arc<dyn StopPolicy> {
    match kind {
        StopPolicyKind::Fixed => Arc::new(FixedIterations(iterations)),
        StopPolicyKind::Convergence => Arc::new(Convergence {
            max_iterations: iterations,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub critique_iterations: usize,
    pub criteria: Vec<String>,
    pub stop_policy: StopPolicyKind,
    pub draft: ModelParams,
    pub critique: ModelParams,
    /// A critique shorter than this fraction of the previous snapshot is discarded
    pub min_retained_ratio: f32,
    pub reference_excerpt_chars: usize,
    pub normalize_tables: bool,
    pub call_timeout: Duration,
    pub grounding: GroundingPolicy,
    /// Citations reported back with the document
    pub citation_limit: usize,
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let generation = &config.generation;
        Self {
            critique_iterations: generation.critique_iterations,
            criteria: generation.criteria.clone(),
            stop_policy: generation.stop_policy,
            draft: generation.draft.clone(),
            critique: generation.critique.clone(),
            min_retained_ratio: generation.min_retained_ratio,
            reference_excerpt_chars: generation.reference_excerpt_chars,
            normalize_tables: generation.normalize_tables,
            call_timeout: config.model_call_timeout(),
            grounding: config.retrieval.grounding,
            citation_limit: config.retrieval.context_items,
        }
    }
}

/// Result of a generation request
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub session: GenerationSession,
    pub state: GenerationState,
    pub status: CompletionStatus,
    pub citations: Vec<Citation>,
    /// Whether any retrieved context matched the request
    pub grounded: bool,
}

/// Why a critique pass was not accepted
enum Rejection {
    Model(AppError),
    Truncated { chars: usize, required: usize },
}

impl Rejection {
    fn label(&self) -> &'static str {
        match self {
            Rejection::Model(AppError::ModelTimeout { .. }) => "timeout",
            Rejection::Model(_) => "model_error",
            Rejection::Truncated { .. } => "truncated",
        }
    }

    fn reason(&self) -> String {
        match self {
            Rejection::Model(e) => e.to_string(),
            Rejection::Truncated { chars, required } => format!(
                "critique output too short: {} characters, at least {} required",
                chars, required
            ),
        }
    }
}

pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    config: OrchestratorConfig,
    prompts: PromptBuilder,
    stop_policy: Arc<dyn StopPolicy>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, config: OrchestratorConfig) -> Self {
        Self {
            prompts: PromptBuilder::new(config.reference_excerpt_chars),
            stop_policy: stop_policy(config.stop_policy, config.critique_iterations),
            model,
            config,
        }
    }

    /// Replace the configured stop policy
    pub fn with_stop_policy(mut self, policy: Arc<dyn StopPolicy>) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Draft and critique a document.
    ///
    /// Fails only when the request is invalid, ungrounded under the
    /// fail-closed policy, or when the draft itself cannot be produced.
    /// Critique failures and a passed `deadline` end the loop early with a
    /// partial status instead.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        context: Option<&ContextBundle>,
        deadline: Option<Instant>,
    ) -> Result<GenerationReport> {
        request.validate()?;

        let grounded = context.is_some_and(ContextBundle::is_grounded);
        if self.config.grounding == GroundingPolicy::FailClosed && !grounded {
            tracing::warn!(kind = request.kind.as_str(), "Refusing ungrounded generation request");
            return Err(AppError::UngroundedRequest);
        }

        let started = std::time::Instant::now();
        let kind = request.kind;

        let draft = match self.draft(&request, context, deadline).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = kind.as_str(), error = %e, state = ?GenerationState::Failed, "Draft failed");
                metrics::record_generation(started.elapsed().as_secs_f64(), kind.as_str(), "failed");
                return Err(e);
            }
        };

        let mut session = GenerationSession::start(request, draft);
        tracing::info!(
            session_id = %session.id(),
            kind = kind.as_str(),
            chars = session.current_text().chars().count(),
            "Draft accepted"
        );

        let (state, status) = self.critique_loop(&mut session, deadline).await;

        let outcome = if status.is_complete() { "complete" } else { "partial" };
        metrics::record_generation(started.elapsed().as_secs_f64(), kind.as_str(), outcome);
        tracing::info!(
            session_id = %session.id(),
            snapshots = session.snapshots().len(),
            stop_policy = self.stop_policy.name(),
            outcome,
            "Generation finished"
        );

        Ok(GenerationReport {
            state,
            status,
            citations: context
                .map(|bundle| bundle.citations(self.config.citation_limit))
                .unwrap_or_default(),
            grounded,
            session,
        })
    }

    async fn draft(
        &self,
        request: &GenerationRequest,
        context: Option<&ContextBundle>,
        deadline: Option<Instant>,
    ) -> Result<String> {
        let prompt = self
            .prompts
            .draft(request, context.map(|bundle| bundle.rendered.as_str()));
        let raw = call_model(
            self.model.as_ref(),
            &prompt,
            &self.config.draft,
            self.config.call_timeout,
            deadline,
        )
        .await?;

        let text = self.postprocess(&raw);
        if text.trim().is_empty() {
            return Err(AppError::ModelService {
                message: "model returned an empty draft".to_string(),
            });
        }
        Ok(text)
    }

    async fn critique_loop(
        &self,
        session: &mut GenerationSession,
        deadline: Option<Instant>,
    ) -> (GenerationState, CompletionStatus) {
        if self.config.criteria.is_empty() || self.stop_policy.should_stop(0, session) {
            return (GenerationState::Done, CompletionStatus::Complete);
        }

        let mut state = GenerationState::Critiquing(1);
        while let GenerationState::Critiquing(iteration) = state {
            let criterion = &self.config.criteria[(iteration - 1) % self.config.criteria.len()];

            match self.critique(session, criterion, deadline).await {
                Ok(text) => {
                    session.push(
                        text,
                        SnapshotOrigin::Critique {
                            iteration,
                            criterion: criterion.clone(),
                        },
                    );
                    tracing::debug!(session_id = %session.id(), iteration, "Critique accepted");
                    state = if self.stop_policy.should_stop(iteration, session) {
                        GenerationState::Done
                    } else {
                        GenerationState::Critiquing(iteration + 1)
                    };
                }
                Err(rejection) => {
                    tracing::warn!(
                        session_id = %session.id(),
                        iteration,
                        reason = rejection.label(),
                        "Critique rejected, keeping last good snapshot"
                    );
                    metrics::record_critique_rollback(rejection.label());
                    return (
                        GenerationState::Done,
                        CompletionStatus::Partial {
                            failed_step: GenerationStep::Critique { iteration },
                            reason: rejection.reason(),
                        },
                    );
                }
            }
        }

        (state, CompletionStatus::Complete)
    }

    async fn critique(
        &self,
        session: &GenerationSession,
        criterion: &str,
        deadline: Option<Instant>,
    ) -> std::result::Result<String, Rejection> {
        let previous = session.current_text();
        let prompt = self.prompts.critique(session.request(), previous, criterion);
        let raw = call_model(
            self.model.as_ref(),
            &prompt,
            &self.config.critique,
            self.config.call_timeout,
            deadline,
        )
        .await
        .map_err(Rejection::Model)?;

        let text = self.postprocess(&raw);
        let chars = text.trim().chars().count();
        let required =
            (previous.chars().count() as f64 * f64::from(self.config.min_retained_ratio)).ceil() as usize;
        if chars == 0 || chars < required {
            return Err(Rejection::Truncated { chars, required });
        }
        Ok(text)
    }

    fn postprocess(&self, raw: &str) -> String {
        if self.config.normalize_tables {
            tables::normalize_document(raw)
        } else {
            raw.trim().to_string()
        }
    }
}

/// One time-boxed model call. The effective limit is the earlier of the
/// per-call timeout and the caller's deadline; a deadline already in the
/// past fails without calling the model.
pub(crate) async fn call_model(
    model: &dyn LanguageModel,
    prompt: &str,
    params: &ModelParams,
    call_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<String> {
    let now = Instant::now();
    let mut until = now + call_timeout;
    if let Some(deadline) = deadline {
        if deadline <= now {
            return Err(AppError::ModelTimeout { timeout_ms: 0 });
        }
        until = until.min(deadline);
    }

    match tokio::time::timeout_at(until, model.generate(prompt, params)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::ModelTimeout {
            timeout_ms: until.duration_since(now).as_millis() as u64,
        }),
    }
}
