//! Chunk scorer
//!
//! Score = weighted sum of four counts of matching query tokens:
//! chunk keywords, section words, body substrings and source keywords.

use crate::corpus::{Chunk, CorpusSource};
use crate::query::QueryTokens;
use curriforge_common::config::ScoringWeights;
use serde::Serialize;

/// Body matching skips shorter tokens; a lone digit would match any numeral.
const MIN_BODY_TOKEN_CHARS: usize = 3;

/// Per-signal match counts behind a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub chunk_keyword: usize,
    pub section: usize,
    pub body_text: usize,
    pub document_keyword: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ChunkScorer {
    weights: ScoringWeights,
}

impl ChunkScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn breakdown(&self, tokens: &QueryTokens, source: &CorpusSource, chunk: &Chunk) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();

        for token in tokens.iter() {
            if chunk.keyword_vocabulary.contains(token) {
                breakdown.chunk_keyword += 1;
            }
            if chunk.section_words.contains(token) {
                breakdown.section += 1;
            }
            if token.chars().count() >= MIN_BODY_TOKEN_CHARS && chunk.folded_text.contains(token) {
                breakdown.body_text += 1;
            }
            if source.keyword_vocabulary.contains(token) {
                breakdown.document_keyword += 1;
            }
        }

        let w = &self.weights;
        breakdown.score = w.chunk_keyword * breakdown.chunk_keyword as f32
            + w.section * breakdown.section as f32
            + w.body_text * breakdown.body_text as f32
            + w.document_keyword * breakdown.document_keyword as f32;
        breakdown
    }

    pub fn score(&self, tokens: &QueryTokens, source: &CorpusSource, chunk: &Chunk) -> f32 {
        self.breakdown(tokens, source, chunk).score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::source_with;

    #[test]
    fn test_keyword_overlap_outranks_no_overlap() {
        let source = source_with(
            "curriculo",
            &[],
            vec![
                Chunk::new("c1", "Intro", "formative evaluation is...", vec!["evaluacion formativa".into()]),
                Chunk::new("c2", "Otros", "nada relacionado", vec![]),
            ],
        );
        let tokens: QueryTokens = ["evaluacion", "formativa"].into_iter().collect();
        let scorer = ChunkScorer::new(ScoringWeights::default());

        let matched = scorer.breakdown(&tokens, &source, &source.chunks[0]);
        let unmatched = scorer.score(&tokens, &source, &source.chunks[1]);

        assert_eq!(matched.chunk_keyword, 2);
        assert_eq!(matched.score, 6.0);
        assert_eq!(unmatched, 0.0);
    }

    #[test]
    fn test_all_signals_weighted() {
        let source = source_with(
            "curriculo",
            &["energia"],
            vec![Chunk::new("c1", "Energía y materia", "La energía se transforma", vec!["energia".into()])],
        );
        let tokens: QueryTokens = ["energia"].into_iter().collect();
        let breakdown = ChunkScorer::new(ScoringWeights::default()).breakdown(&tokens, &source, &source.chunks[0]);

        assert_eq!(
            (breakdown.chunk_keyword, breakdown.section, breakdown.body_text, breakdown.document_keyword),
            (1, 1, 1, 1)
        );
        assert_eq!(breakdown.score, 3.0 + 2.0 + 1.0 + 0.5);
    }

    #[test]
    fn test_empty_tokens_score_zero() {
        let source = source_with("s", &["x"], vec![Chunk::new("c1", "x", "x", vec!["x".into()])]);
        let score = ChunkScorer::new(ScoringWeights::default()).score(&QueryTokens::default(), &source, &source.chunks[0]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_short_tokens_skip_body_match() {
        let source = source_with("s", &[], vec![Chunk::new("c1", "Unidad", "Sesión 3 de 12", vec![])]);
        let tokens: QueryTokens = ["3"].into_iter().collect();
        let breakdown = ChunkScorer::new(ScoringWeights::default()).breakdown(&tokens, &source, &source.chunks[0]);
        assert_eq!(breakdown.body_text, 0);
    }

    #[test]
    fn test_custom_weights() {
        let source = source_with("s", &[], vec![Chunk::new("c1", "Evaluación", "", vec![])]);
        let tokens: QueryTokens = ["evaluacion"].into_iter().collect();
        let weights = ScoringWeights { section: 10.0, ..ScoringWeights::default() };
        assert_eq!(ChunkScorer::new(weights).score(&tokens, &source, &source.chunks[0]), 10.0);
    }
}
