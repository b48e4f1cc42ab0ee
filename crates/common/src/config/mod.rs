//! Configuration management for CurriForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Corpus sources loaded at start-up
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Retrieval and ranking configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Draft / critique / revision configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// External language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline for a whole generation chain, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Idle lifetime of a document session, in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorpusConfig {
    /// Sources in ranking order; the first primary source is authoritative
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

/// Role of a corpus source in ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Primary,
    #[default]
    Auxiliary,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source identifier, unique across the corpus
    pub id: String,

    /// Path to the JSON source file
    pub path: String,

    /// Display label (falls back to `metadata.documento`, then the id)
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub role: SourceRole,

    /// Chunks kept from this source before merging
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Weights of the four chunk-scoring signals
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight_chunk_keyword")]
    pub chunk_keyword: f32,
    #[serde(default = "default_weight_section")]
    pub section: f32,
    #[serde(default = "default_weight_body_text")]
    pub body_text: f32,
    #[serde(default = "default_weight_document_keyword")]
    pub document_keyword: f32,
}

/// What to do when retrieval yields no grounded context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingPolicy {
    /// Generate anyway; the prompt carries the "no context" marker
    #[default]
    Proceed,
    /// Refuse the request before any model call
    FailClosed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Maximum results kept after merging all sources
    #[serde(default = "default_merge_cap")]
    pub merge_cap: usize,

    /// Maximum results embedded in the context block
    #[serde(default = "default_context_items")]
    pub context_items: usize,

    #[serde(default)]
    pub weights: ScoringWeights,

    #[serde(default)]
    pub grounding: GroundingPolicy,

    /// Drop Spanish function words from the query token set
    #[serde(default = "default_enabled")]
    pub drop_stop_words: bool,
}

/// Critique loop stop policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicyKind {
    /// Run exactly `critique_iterations` passes
    #[default]
    Fixed,
    /// Stop early once two consecutive snapshots are identical
    Convergence,
}

/// Per-call parameters handed to the language model
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelParams {
    /// Model variant identifier
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Number of self-critique passes after the draft
    #[serde(default = "default_critique_iterations")]
    pub critique_iterations: usize,

    /// Rotating critique criteria
    #[serde(default = "default_criteria")]
    pub criteria: Vec<String>,

    #[serde(default)]
    pub stop_policy: StopPolicyKind,

    #[serde(default)]
    pub draft: ModelParams,

    #[serde(default)]
    pub critique: ModelParams,

    #[serde(default = "default_revision_params")]
    pub revision: ModelParams,

    /// A critique shorter than this fraction of its predecessor is discarded
    #[serde(default = "default_min_retained_ratio")]
    pub min_retained_ratio: f32,

    /// Characters of a reference document kept in the draft prompt
    #[serde(default = "default_reference_excerpt_chars")]
    pub reference_excerpt_chars: usize,

    /// Run the table normaliser on every accepted model output
    #[serde(default = "default_enabled")]
    pub normalize_tables: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai (any chat-completions compatible endpoint) or mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key for the endpoint
    pub api_key: Option<String>,

    /// Timeout for a single call, in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 300 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_session_ttl() -> u64 { 3600 }
fn default_top_k() -> usize { 6 }
fn default_weight_chunk_keyword() -> f32 { 3.0 }
fn default_weight_section() -> f32 { 2.0 }
fn default_weight_body_text() -> f32 { 1.0 }
fn default_weight_document_keyword() -> f32 { 0.5 }
fn default_merge_cap() -> usize { 10 }
fn default_context_items() -> usize { 5 }
fn default_enabled() -> bool { true }
fn default_model() -> String { "anthropic.claude-3-sonnet-20240229-v1:0".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_output_tokens() -> u32 { 4000 }
fn default_top_p() -> Option<f32> { Some(0.9) }
fn default_critique_iterations() -> usize { 3 }
fn default_min_retained_ratio() -> f32 { 0.5 }
fn default_reference_excerpt_chars() -> usize { 3000 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_llm_retries() -> u32 { 2 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "curriforge".to_string() }

fn default_revision_params() -> ModelParams {
    ModelParams {
        temperature: 0.4,
        ..ModelParams::default()
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            id: "curriculo".to_string(),
            path: "data/curriculo_secundaria_peru_2016.json".to_string(),
            label: None,
            role: SourceRole::Primary,
            top_k: 8,
        },
        SourceConfig {
            id: "orientaciones".to_string(),
            path: "data/orientaciones_pedagogicas_cneb.json".to_string(),
            label: None,
            role: SourceRole::Auxiliary,
            top_k: 6,
        },
    ]
}

fn default_criteria() -> Vec<String> {
    vec![
        "Revisa la programación anterior y mejora la especificidad de los desempeños para que sean más observables y medibles en el contexto educativo. Cada desempeño debe describir claramente qué hará el estudiante.".to_string(),
        "Analiza la coherencia entre contenidos, desempeños y criterios de evaluación. Verifica que cada criterio permita evaluar efectivamente el desempeño correspondiente y que estén perfectamente alineados.".to_string(),
        "Revisa y mejora los instrumentos de evaluación para que sean variados, pertinentes y prácticos de implementar en el aula. Incluye tanto instrumentos formativos como sumativos.".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self { sources: default_sources() }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            chunk_keyword: default_weight_chunk_keyword(),
            section: default_weight_section(),
            body_text: default_weight_body_text(),
            document_keyword: default_weight_document_keyword(),
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> [(&'static str, f32); 4] {
        [
            ("chunk_keyword", self.chunk_keyword),
            ("section", self.section),
            ("body_text", self.body_text),
            ("document_keyword", self.document_keyword),
        ]
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            merge_cap: default_merge_cap(),
            context_items: default_context_items(),
            weights: ScoringWeights::default(),
            grounding: GroundingPolicy::default(),
            drop_stop_words: default_enabled(),
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            critique_iterations: default_critique_iterations(),
            criteria: default_criteria(),
            stop_policy: StopPolicyKind::default(),
            draft: ModelParams::default(),
            critique: ModelParams::default(),
            revision: default_revision_params(),
            min_retained_ratio: default_min_retained_ratio(),
            reference_excerpt_chars: default_reference_excerpt_chars(),
            normalize_tables: default_enabled(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Check the settings every request depends on.
    ///
    /// Runs once at start-up; a failure here is fatal before any retrieval
    /// or generation is attempted.
    pub fn validate(&self) -> Result<()> {
        match self.llm.provider.as_str() {
            "openai" => {
                if self.llm.endpoint.trim().is_empty() {
                    return Err(config_error("llm.endpoint is required"));
                }
                let has_key = self
                    .llm
                    .api_key
                    .as_deref()
                    .is_some_and(|key| !key.trim().is_empty());
                if !has_key {
                    return Err(config_error("llm.api_key is required for provider 'openai'"));
                }
            }
            "mock" => {}
            other => {
                return Err(config_error(&format!("unknown llm.provider '{}'", other)));
            }
        }

        for (step, params) in [
            ("draft", &self.generation.draft),
            ("critique", &self.generation.critique),
            ("revision", &self.generation.revision),
        ] {
            if params.model.trim().is_empty() {
                return Err(config_error(&format!("generation.{}.model is required", step)));
            }
            if !(0.0..=2.0).contains(&params.temperature) {
                return Err(config_error(&format!(
                    "generation.{}.temperature must be within 0.0..=2.0",
                    step
                )));
            }
            if params.max_output_tokens == 0 {
                return Err(config_error(&format!(
                    "generation.{}.max_output_tokens must be positive",
                    step
                )));
            }
        }

        if self.generation.critique_iterations > 0 && self.generation.criteria.is_empty() {
            return Err(config_error("generation.criteria must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.generation.min_retained_ratio) {
            return Err(config_error("generation.min_retained_ratio must be within 0.0..=1.0"));
        }

        if self.retrieval.merge_cap == 0 || self.retrieval.context_items == 0 {
            return Err(config_error("retrieval caps must be positive"));
        }
        for (name, weight) in self.retrieval.weights.as_array() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(config_error(&format!(
                    "retrieval.weights.{} must be a non-negative number",
                    name
                )));
            }
        }

        let mut seen = HashSet::new();
        for source in &self.corpus.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(config_error(&format!("duplicate corpus source '{}'", source.id)));
            }
            if source.top_k == 0 {
                return Err(config_error(&format!(
                    "corpus source '{}' must keep at least one chunk",
                    source.id
                )));
            }
        }

        Ok(())
    }

    /// Get the generation deadline as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the per-call model timeout as Duration
    pub fn model_call_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

fn config_error(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}
