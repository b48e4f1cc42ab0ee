//! CurriForge generation engine
//!
//! Turns a request plus retrieved context into a curricular document:
//! - `prompts`: draft, critique and revision templates per document kind
//! - `orchestrator`: draft then critique loop with rollback on failure
//! - `revision`: instruction-driven edits guarded by a structural check
//! - `session`: append-only snapshot history
//! - `tables`: markdown table normalisation and title extraction

pub mod orchestrator;
pub mod prompts;
pub mod revision;
pub mod session;
pub mod tables;

pub use orchestrator::{
    CompletionStatus, Convergence, FixedIterations, GenerationReport, GenerationState,
    GenerationStep, Orchestrator, OrchestratorConfig, StopPolicy,
};
pub use prompts::{DocumentDetails, DocumentKind, GenerationRequest, PromptBuilder};
pub use revision::{RevisionEngine, RevisionReport};
pub use session::{GenerationSession, Snapshot, SnapshotOrigin};
pub use tables::StructureProfile;
