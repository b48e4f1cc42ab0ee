//! Context assembler
//!
//! Renders the best merged results into the text block embedded in draft
//! prompts. An empty result list renders an explicit marker so the model is
//! told there is no supporting evidence.

use crate::retrieval::ScoredResult;
use serde::Serialize;

pub const NO_CONTEXT_MARKER: &str = "No se encontró contexto específico en los documentos oficiales.";

/// Source reference reported back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source: String,
    pub section: String,
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub items: Vec<ScoredResult>,
    pub rendered: String,
    /// Merged results available before the item cap
    pub total_candidates: usize,
}

impl ContextBundle {
    /// At least one embedded item actually matched the query
    pub fn is_grounded(&self) -> bool {
        self.items.iter().any(|item| item.score > 0.0)
    }

    /// The best `limit` embedded items as citations
    pub fn citations(&self, limit: usize) -> Vec<Citation> {
        self.items
            .iter()
            .take(limit)
            .map(|item| Citation {
                source: item.source_label.to_string(),
                section: item.chunk.section.clone(),
                chunk_id: item.chunk.id.clone(),
                score: item.score,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_items: usize,
}

impl ContextAssembler {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    pub fn assemble(&self, merged: Vec<ScoredResult>) -> ContextBundle {
        let total_candidates = merged.len();
        let mut items = merged;
        items.truncate(self.max_items);

        let rendered = if items.is_empty() {
            NO_CONTEXT_MARKER.to_string()
        } else {
            render(&items)
        };

        ContextBundle { items, rendered, total_candidates }
    }
}

fn render(items: &[ScoredResult]) -> String {
    let mut out = String::new();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "DOCUMENTO {} (Relevancia: {:.2}):\nFuente: {} - {}\nContenido:\n[{}]\n{}\n---",
            index + 1,
            item.score,
            item.source_label,
            item.chunk.section,
            item.chunk.section,
            item.chunk.text,
        ));
    }
    out
}
