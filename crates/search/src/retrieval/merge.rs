//! Multi-source merging

use super::ScoredResult;

/// Concatenates per-source rankings and keeps the global top `cap`
#[derive(Debug, Clone)]
pub struct MultiSourceMerger {
    cap: usize,
}

impl MultiSourceMerger {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    /// Inputs must be given in configured source order. Ties keep that order,
    /// and results are never deduplicated across sources.
    pub fn merge(&self, ranked: Vec<Vec<ScoredResult>>) -> Vec<ScoredResult> {
        let mut merged: Vec<ScoredResult> = ranked.into_iter().flatten().collect();
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged.truncate(self.cap);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use std::sync::Arc;

    fn result(source: &str, id: &str, score: f32) -> ScoredResult {
        ScoredResult {
            source_id: Arc::from(source),
            source_label: Arc::from(source),
            chunk: Arc::new(Chunk::new(id, "", "", vec![])),
            score,
        }
    }

    #[test]
    fn test_merge_orders_across_sources() {
        let merged = MultiSourceMerger::new(10).merge(vec![
            vec![result("curriculo", "a", 3.0), result("curriculo", "b", 1.0)],
            vec![result("orientaciones", "x", 2.0), result("orientaciones", "y", 1.0)],
        ]);
        let keys: Vec<(&str, &str)> = merged.iter().map(|r| (&*r.source_id, r.chunk.id.as_str())).collect();
        assert_eq!(
            keys,
            vec![("curriculo", "a"), ("orientaciones", "x"), ("curriculo", "b"), ("orientaciones", "y")]
        );
    }

    #[test]
    fn test_merge_respects_cap() {
        let first: Vec<ScoredResult> = (0..8).map(|i| result("curriculo", &format!("c{}", i), 1.0)).collect();
        let second: Vec<ScoredResult> = (0..6).map(|i| result("orientaciones", &format!("o{}", i), 1.0)).collect();

        let merged = MultiSourceMerger::new(10).merge(vec![first, second]);
        assert_eq!(merged.len(), 10);
        // All tied: the primary source comes first in full
        assert!(merged[..8].iter().all(|r| &*r.source_id == "curriculo"));
    }

    #[test]
    fn test_same_chunk_id_in_two_sources_kept() {
        let merged = MultiSourceMerger::new(10).merge(vec![
            vec![result("curriculo", "c1", 1.0)],
            vec![result("orientaciones", "c1", 1.0)],
        ]);
        assert_eq!(merged.len(), 2);
    }
}
