//! Corpus store
//!
//! Loads every configured source once at start-up. Sources are immutable
//! afterwards and shared read-only behind `Arc<CorpusStore>`.
//!
//! Source file format:
//!
//! ```json
//! {
//!   "metadata": { "documento": "Programa Curricular de Educación Secundaria" },
//!   "keywords": ["competencia", "desempeño"],
//!   "chunks": [{ "id": "c1", "section": "Enfoques", "text": "...", "keywords": ["enfoque ambiental"] }]
//! }
//! ```

use curriforge_common::config::{SourceConfig, SourceRole};
use curriforge_common::errors::{AppError, Result};
use curriforge_common::text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Deserialize)]
struct SourceFile {
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    chunks: Vec<RawChunk>,
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    section: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// One retrievable passage of a source
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub section: String,
    pub text: String,
    pub keywords: Vec<String>,

    #[serde(skip)]
    pub(crate) section_words: BTreeSet<String>,
    #[serde(skip)]
    pub(crate) folded_text: String,
    #[serde(skip)]
    pub(crate) keyword_vocabulary: BTreeSet<String>,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        section: impl Into<String>,
        text: impl Into<String>,
        keywords: Vec<String>,
    ) -> Self {
        let section = section.into();
        let text = text.into();
        Self {
            id: id.into(),
            section_words: text::words(&section).collect(),
            folded_text: text::fold(&text),
            keyword_vocabulary: keyword_vocabulary(&keywords),
            section,
            text,
            keywords,
        }
    }
}

/// Folded keywords plus each word of a multi-word keyword
fn keyword_vocabulary(keywords: &[String]) -> BTreeSet<String> {
    let mut vocabulary = BTreeSet::new();
    for keyword in keywords {
        let folded = text::fold(keyword.trim());
        if folded.is_empty() {
            continue;
        }
        vocabulary.extend(text::words(&folded));
        vocabulary.insert(folded);
    }
    vocabulary
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Loaded { chunks: usize },
    Unavailable { reason: String },
}

#[derive(Debug, Clone)]
pub struct CorpusSource {
    pub id: Arc<str>,
    pub label: Arc<str>,
    pub role: SourceRole,
    pub top_k: usize,
    pub metadata: Map<String, Value>,
    pub keywords: Vec<String>,
    pub chunks: Vec<Arc<Chunk>>,
    pub status: SourceStatus,
    pub(crate) keyword_vocabulary: BTreeSet<String>,
}

impl CorpusSource {
    /// Load a source from disk. Never fails: a missing or malformed file
    /// yields an empty source marked unavailable.
    pub fn load(config: &SourceConfig) -> Self {
        match Self::read(config) {
            Ok(source) => {
                tracing::info!(
                    source = %source.id,
                    chunks = source.chunks.len(),
                    "Corpus source loaded"
                );
                source
            }
            Err(e) => {
                tracing::warn!(
                    source = %config.id,
                    path = %config.path,
                    error = %e,
                    "Corpus source unavailable, continuing with an empty source"
                );
                Self::unavailable(config, e.to_string())
            }
        }
    }

    fn read(config: &SourceConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::CorpusUnavailable {
            source_id: config.id.clone(),
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(config, &raw)
    }

    /// Parse a source from its JSON text
    pub fn from_json_str(config: &SourceConfig, raw: &str) -> Result<Self> {
        let file: SourceFile =
            serde_json::from_str(raw).map_err(|e| AppError::CorpusUnavailable {
                source_id: config.id.clone(),
                message: format!("malformed source file: {}", e),
            })?;

        let chunks = file
            .chunks
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let id = entry
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| format!("chunk-{}", index));
                Chunk::new(id, entry.section, entry.text, entry.keywords)
            })
            .collect();

        Ok(Self::from_chunks(config, file.metadata, file.keywords, chunks))
    }

    /// Assemble a loaded source. Later chunks repeating an earlier id are skipped.
    pub fn from_chunks(
        config: &SourceConfig,
        metadata: Map<String, Value>,
        keywords: Vec<String>,
        chunks: Vec<Chunk>,
    ) -> Self {
        let mut seen = HashSet::new();
        let chunks: Vec<Arc<Chunk>> = chunks
            .into_iter()
            .filter(|chunk| {
                let fresh = seen.insert(chunk.id.clone());
                if !fresh {
                    tracing::warn!(source = %config.id, chunk = %chunk.id, "Duplicate chunk id skipped");
                }
                fresh
            })
            .map(Arc::new)
            .collect();

        let label = config
            .label
            .clone()
            .or_else(|| {
                metadata
                    .get("documento")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| config.id.clone());

        Self {
            id: Arc::from(config.id.as_str()),
            label: Arc::from(label),
            role: config.role,
            top_k: config.top_k,
            status: SourceStatus::Loaded { chunks: chunks.len() },
            keyword_vocabulary: keyword_vocabulary(&keywords),
            metadata,
            keywords,
            chunks,
        }
    }

    pub fn unavailable(config: &SourceConfig, reason: impl Into<String>) -> Self {
        Self {
            id: Arc::from(config.id.as_str()),
            label: Arc::from(config.label.as_deref().unwrap_or(&config.id)),
            role: config.role,
            top_k: config.top_k,
            metadata: Map::new(),
            keywords: Vec::new(),
            chunks: Vec::new(),
            status: SourceStatus::Unavailable { reason: reason.into() },
            keyword_vocabulary: BTreeSet::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, SourceStatus::Loaded { .. })
    }

    pub fn chunk(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.chunks.iter().find(|chunk| chunk.id == id)
    }
}

/// All corpus sources, in configured ranking order
#[derive(Debug, Default)]
pub struct CorpusStore {
    sources: Vec<CorpusSource>,
}

impl CorpusStore {
    /// Load every configured source; unavailable sources stay empty
    pub fn load(configs: &[SourceConfig]) -> Self {
        let sources: Vec<CorpusSource> = configs.iter().map(CorpusSource::load).collect();

        for source in &sources {
            curriforge_common::metrics::record_corpus_source(&source.id, source.chunks.len());
        }

        let store = Self { sources };
        tracing::info!(
            sources = store.sources.len(),
            available = store.sources.iter().filter(|s| s.is_available()).count(),
            chunks = store.total_chunks(),
            "Corpus store ready"
        );
        store
    }

    pub fn from_sources(sources: Vec<CorpusSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[CorpusSource] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&CorpusSource> {
        self.sources.iter().find(|source| &*source.id == id)
    }

    pub fn find_chunk(&self, source_id: &str, chunk_id: &str) -> Option<&Arc<Chunk>> {
        self.source(source_id).and_then(|source| source.chunk(chunk_id))
    }

    pub fn total_chunks(&self) -> usize {
        self.sources.iter().map(|source| source.chunks.len()).sum()
    }

    /// True when at least one source loaded
    pub fn is_ready(&self) -> bool {
        self.sources.iter().any(CorpusSource::is_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_config(id: &str, path: &str) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            path: path.to_string(),
            label: None,
            role: SourceRole::Primary,
            top_k: 8,
        }
    }

    const SAMPLE: &str = r#"{
        "metadata": { "documento": "Programa Curricular Secundaria" },
        "keywords": ["Evaluación formativa", "competencia"],
        "chunks": [
            { "id": "c1", "section": "Enfoques transversales", "text": "El enfoque ambiental...", "keywords": ["enfoque ambiental"] },
            { "section": "Sin id", "text": "Texto" },
            { "id": "c1", "section": "Repetido", "text": "Otro" }
        ]
    }"#;

    #[test]
    fn test_parse_source() {
        let source = CorpusSource::from_json_str(&source_config("curriculo", "unused"), SAMPLE).unwrap();

        assert_eq!(&*source.label, "Programa Curricular Secundaria");
        assert_eq!(source.chunks.len(), 2);
        assert_eq!(source.chunks[1].id, "chunk-1");
        assert_eq!(source.status, SourceStatus::Loaded { chunks: 2 });
        assert!(source.keyword_vocabulary.contains("evaluacion formativa"));
        assert!(source.keyword_vocabulary.contains("formativa"));

        let chunk = source.chunk("c1").unwrap();
        assert!(chunk.section_words.contains("transversales"));
        assert!(chunk.keyword_vocabulary.contains("ambiental"));
    }

    #[test]
    fn test_config_label_wins() {
        let mut config = source_config("curriculo", "unused");
        config.label = Some("Currículo 2016".to_string());
        let source = CorpusSource::from_json_str(&config, SAMPLE).unwrap();
        assert_eq!(&*source.label, "Currículo 2016");
    }

    #[test]
    fn test_malformed_source_is_corpus_error() {
        let err = CorpusSource::from_json_str(&source_config("x", "unused"), "{ not json").unwrap_err();
        assert!(matches!(err, AppError::CorpusUnavailable { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let store = CorpusStore::load(&[source_config("curriculo", &path)]);

        assert!(store.is_ready());
        assert_eq!(store.total_chunks(), 2);
        assert!(store.find_chunk("curriculo", "c1").is_some());
        assert!(store.find_chunk("curriculo", "c9").is_none());
        assert!(store.find_chunk("otro", "c1").is_none());
    }

    #[test]
    fn test_missing_source_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let store = CorpusStore::load(&[source_config("curriculo", &missing.to_string_lossy())]);

        assert!(!store.is_ready());
        let source = store.source("curriculo").unwrap();
        assert!(source.chunks.is_empty());
        assert!(matches!(source.status, SourceStatus::Unavailable { .. }));
    }
}
