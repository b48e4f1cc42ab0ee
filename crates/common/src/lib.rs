//! CurriForge Common Library
//!
//! Shared code for the CurriForge crates:
//! - Error types and handling
//! - Configuration management
//! - Language model client abstraction
//! - Metrics and observability
//! - Competency catalogue and Spanish text folding

pub mod catalog;
pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
