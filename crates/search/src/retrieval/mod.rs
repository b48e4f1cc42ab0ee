//! Lexical multi-source retrieval
//!
//! Pipeline, leaf first:
//! - [`ChunkScorer`]: weighted keyword / section / body / source-keyword matching
//! - [`SourceRanker`]: per-source stable top-K
//! - [`MultiSourceMerger`]: global stable top-N across sources
//!
//! [`Retriever`] wires them with the query builder and context assembler.
//! Everything here is synchronous and pure over the loaded corpus.

mod merge;
mod ranker;
mod scorer;

pub use merge::MultiSourceMerger;
pub use ranker::SourceRanker;
pub use scorer::{ChunkScorer, ScoreBreakdown};

use crate::assembler::{ContextAssembler, ContextBundle};
use crate::corpus::{Chunk, CorpusStore};
use crate::query::{QueryBuilder, QueryTokens, RetrievalParams};
use curriforge_common::config::RetrievalConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// One chunk with its score for a given query
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub source_id: Arc<str>,
    pub source_label: Arc<str>,
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

pub struct Retriever {
    corpus: Arc<CorpusStore>,
    query: QueryBuilder,
    ranker: SourceRanker,
    merger: MultiSourceMerger,
    assembler: ContextAssembler,
}

impl Retriever {
    pub fn new(corpus: Arc<CorpusStore>, config: &RetrievalConfig) -> Self {
        Self {
            corpus,
            query: QueryBuilder::new(config.drop_stop_words),
            ranker: SourceRanker::new(ChunkScorer::new(config.weights)),
            merger: MultiSourceMerger::new(config.merge_cap),
            assembler: ContextAssembler::new(config.context_items),
        }
    }

    pub fn corpus(&self) -> &Arc<CorpusStore> {
        &self.corpus
    }

    pub fn tokens(&self, params: &RetrievalParams) -> QueryTokens {
        self.query.build(params)
    }

    /// Merged ranking across every source, at most `merge_cap` long
    pub fn retrieve(&self, params: &RetrievalParams) -> Vec<ScoredResult> {
        let tokens = self.query.build(params);
        self.retrieve_tokens(&tokens)
    }

    pub fn retrieve_tokens(&self, tokens: &QueryTokens) -> Vec<ScoredResult> {
        let ranked = self
            .corpus
            .sources()
            .iter()
            .map(|source| self.ranker.rank(tokens, source))
            .collect();
        self.merger.merge(ranked)
    }

    /// Retrieve and assemble the context block embedded in draft prompts
    pub fn retrieve_context(&self, params: &RetrievalParams) -> ContextBundle {
        let start = Instant::now();
        let tokens = self.query.build(params);
        let merged = self.retrieve_tokens(&tokens);
        let bundle = self.assembler.assemble(merged);

        tracing::debug!(
            tokens = tokens.len(),
            candidates = bundle.total_candidates,
            items = bundle.items.len(),
            grounded = bundle.is_grounded(),
            "Context retrieved"
        );
        curriforge_common::metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            bundle.items.len(),
        );

        bundle
    }
}
