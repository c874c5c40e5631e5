//! In-memory vector index with brute-force cosine similarity search.
//!
//! Simple but correct nearest-neighbor search, O(n) per query, which is fine
//! for the knowledge-base sizes a single chat session carries. The index
//! itself is a plain data structure; the knowledge base wraps it in the
//! locking discipline it needs, so a rebuilt index can be swapped in
//! atomically on recreate.

use std::collections::HashMap;

use uuid::Uuid;

use crate::embedding::cosine_similarity;

/// A single hit returned from a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The ID of the matching entry.
    pub id: Uuid,
    /// Cosine similarity score.
    pub score: f64,
}

/// Brute-force cosine similarity index over embedding vectors.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: HashMap<Uuid, Vec<f32>>,
}

impl VectorIndex {
    /// Create a new empty vector index.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert a vector into the index, replacing any entry with the same ID.
    pub fn insert(&mut self, id: Uuid, embedding: Vec<f32>) {
        self.entries.insert(id, embedding);
    }

    /// Remove an entry by ID. Returns true if it existed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Search for the k nearest neighbors by cosine similarity.
    ///
    /// Results are sorted by descending score, ties broken by ID so the
    /// ordering is deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(id, embedding)| SearchHit {
                id: *id,
                score: cosine_similarity(query, embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }

    /// The stored embedding for an entry, if present.
    pub fn embedding(&self, id: Uuid) -> Option<&[f32]> {
        self.entries.get(&id).map(|v| v.as_slice())
    }

    /// All entry IDs, in unspecified order.
    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.keys().copied()
    }

    /// Number of vectors currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the index contains no vectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
