//! CurriForge retrieval engine
//!
//! Deterministic lexical retrieval over a small multi-source curricular
//! corpus: load sources, build query tokens, score and rank chunks per
//! source, merge across sources and assemble the prompt context block.

pub mod assembler;
pub mod corpus;
pub mod query;
pub mod retrieval;

pub use assembler::{Citation, ContextAssembler, ContextBundle, NO_CONTEXT_MARKER};
pub use corpus::{Chunk, CorpusSource, CorpusStore, SourceStatus};
pub use query::{QueryBuilder, QueryTokens, RetrievalParams};
pub use retrieval::{Retriever, ScoredResult};
