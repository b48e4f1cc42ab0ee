//! Per-source ranking

use super::scorer::ChunkScorer;
use super::ScoredResult;
use crate::corpus::CorpusSource;
use crate::query::QueryTokens;
use std::sync::Arc;

/// Scores every chunk of a source and keeps its top `K`
#[derive(Debug, Clone)]
pub struct SourceRanker {
    scorer: ChunkScorer,
}

impl SourceRanker {
    pub fn new(scorer: ChunkScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &ChunkScorer {
        &self.scorer
    }

    /// Stable descending sort: equal scores keep corpus order.
    /// An unavailable source ranks to an empty list.
    pub fn rank(&self, tokens: &QueryTokens, source: &CorpusSource) -> Vec<ScoredResult> {
        let mut results: Vec<ScoredResult> = source
            .chunks
            .iter()
            .map(|chunk| ScoredResult {
                source_id: Arc::clone(&source.id),
                source_label: Arc::clone(&source.label),
                chunk: Arc::clone(chunk),
                score: self.scorer.score(tokens, source, chunk),
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(source.top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use crate::test_support::source_with;
    use curriforge_common::config::ScoringWeights;

    fn ranker() -> SourceRanker {
        SourceRanker::new(ChunkScorer::new(ScoringWeights::default()))
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let mut source = source_with(
            "curriculo",
            &[],
            vec![
                Chunk::new("a", "Otros", "", vec![]),
                Chunk::new("b", "Energía", "", vec!["energia".into()]),
                Chunk::new("c", "Energía", "", vec![]),
            ],
        );
        source.top_k = 2;
        let tokens: QueryTokens = ["energia"].into_iter().collect();

        let results = ranker().rank(&tokens, &source);
        assert_eq!(ids(&results), vec!["b", "c"]);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let source = source_with(
            "curriculo",
            &[],
            (0..5).map(|i| Chunk::new(format!("c{}", i), "", "", vec![])).collect(),
        );
        let results = ranker().rank(&QueryTokens::default(), &source);
        assert_eq!(ids(&results), vec!["c0", "c1", "c2", "c3", "c4"]);
        assert!(results.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_unavailable_source_is_empty() {
        let config = crate::test_support::source_config("x", 8);
        let source = CorpusSource::unavailable(&config, "missing");
        let tokens: QueryTokens = ["energia"].into_iter().collect();
        assert!(ranker().rank(&tokens, &source).is_empty());
    }
}
