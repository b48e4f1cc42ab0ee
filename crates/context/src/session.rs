//! Generation session and snapshot history
//!
//! A session owns an append-only list of snapshots. The current document is
//! always the last snapshot; rolling back means simply not appending.

use crate::prompts::{DocumentKind, GenerationRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Which step produced a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Draft,
    Critique { iteration: usize, criterion: String },
    Revision { instruction: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub index: usize,
    pub text: String,
    pub origin: SnapshotOrigin,
    /// SHA-256 of `text`, hex encoded
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    fn new(index: usize, text: String, origin: SnapshotOrigin) -> Self {
        Self {
            index,
            digest: digest(&text),
            text,
            origin,
            created_at: Utc::now(),
        }
    }
}

pub fn digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSession {
    id: Uuid,
    request: GenerationRequest,
    snapshots: Vec<Snapshot>,
    /// Critique passes accepted so far
    iteration: usize,
    /// Position in the criteria rotation for the next critique
    criterion_index: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GenerationSession {
    /// Open a session from an accepted draft
    pub fn start(request: GenerationRequest, draft: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request,
            snapshots: vec![Snapshot::new(0, draft, SnapshotOrigin::Draft)],
            iteration: 0,
            criterion_index: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a snapshot and make it current
    pub fn push(&mut self, text: String, origin: SnapshotOrigin) -> &Snapshot {
        if let SnapshotOrigin::Critique { iteration, .. } = &origin {
            self.iteration = *iteration;
            self.criterion_index = *iteration;
        }
        let index = self.snapshots.len();
        self.snapshots.push(Snapshot::new(index, text, origin));
        self.updated_at = Utc::now();
        &self.snapshots[index]
    }

    pub fn current(&self) -> &Snapshot {
        // `start` always creates snapshot 0 and nothing removes snapshots
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn current_text(&self) -> &str {
        &self.current().text
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.request.kind
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn criterion_index(&self) -> usize {
        self.criterion_index
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True when the last two snapshots hold identical text
    pub fn converged(&self) -> bool {
        match self.snapshots.as_slice() {
            [.., previous, last] => previous.digest == last.digest,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curriforge_search::RetrievalParams;

    fn session(draft: &str) -> GenerationSession {
        GenerationSession::start(
            GenerationRequest::new(DocumentKind::LearningUnit, RetrievalParams::default()),
            draft.to_string(),
        )
    }

    #[test]
    fn test_start_has_draft_snapshot() {
        let s = session("| a | b |");
        assert_eq!(s.snapshots().len(), 1);
        assert_eq!(s.current().origin, SnapshotOrigin::Draft);
        assert_eq!(s.current_text(), "| a | b |");
        assert_eq!(s.current().digest.len(), 64);
        assert!(!s.converged());
    }

    #[test]
    fn test_push_is_append_only() {
        let mut s = session("v0");
        s.push(
            "v1".to_string(),
            SnapshotOrigin::Critique { iteration: 1, criterion: "c".to_string() },
        );
        s.push("v2".to_string(), SnapshotOrigin::Revision { instruction: "x".to_string() });

        let texts: Vec<&str> = s.snapshots().iter().map(|snap| snap.text.as_str()).collect();
        assert_eq!(texts, vec!["v0", "v1", "v2"]);
        assert_eq!(s.current().index, 2);
        assert_eq!(s.iteration(), 1);
        assert_eq!(s.snapshot(0).map(|snap| snap.text.as_str()), Some("v0"));
    }

    #[test]
    fn test_converged_on_identical_text() {
        let mut s = session("same");
        s.push(
            "same".to_string(),
            SnapshotOrigin::Critique { iteration: 1, criterion: "c".to_string() },
        );
        assert!(s.converged());
        assert_eq!(digest("same"), s.current().digest);
    }
}
