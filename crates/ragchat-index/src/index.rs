//! Immutable in-memory retrieval index.
//!
//! Dense cosine similarity over every chunk, blended with a lexical term-overlap
//! rerank. An index is never mutated after construction; a rebuild produces a
//! new one.

use chrono::{DateTime, Utc};

use ragchat_core::types::{DocumentChunk, SearchHit};
use ragchat_core::{Error, Result};

#[derive(Debug)]
pub struct VectorIndex {
    id: String,
    embedder_id: String,
    dim: usize,
    built_at: DateTime<Utc>,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Fresh index with a new id and the current time as build time.
    pub fn new(embedder_id: impl Into<String>, dim: usize, chunks: Vec<DocumentChunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        Self::from_parts(uuid::Uuid::new_v4().to_string(), embedder_id, dim, Utc::now(), chunks, vectors)
    }

    /// Reassemble an index from stored parts, keeping its original identity.
    pub fn from_parts(
        id: String,
        embedder_id: impl Into<String>,
        dim: usize,
        built_at: DateTime<Utc>,
        chunks: Vec<DocumentChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::InvalidConfig(format!(
                "index needs one vector per chunk: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(Error::InvalidConfig(format!(
                "vector {} has dim {} expected {}",
                bad,
                vectors[bad].len(),
                dim
            )));
        }
        Ok(Self { id, embedder_id: embedder_id.into(), dim, built_at, chunks, vectors })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn embedder_id(&self) -> &str { &self.embedder_id }
    pub fn dim(&self) -> usize { self.dim }
    pub fn built_at(&self) -> DateTime<Utc> { self.built_at }
    pub fn chunks(&self) -> &[DocumentChunk] { &self.chunks }
    pub fn vectors(&self) -> &[Vec<f32>] { &self.vectors }
    pub fn len(&self) -> usize { self.chunks.len() }
    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// Fingerprint over chunk ids, contents and vectors. Stored in the manifest and
    /// rechecked on load.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (chunk, vector) in self.chunks.iter().zip(&self.vectors) {
            hasher.update(chunk.id.as_bytes());
            hasher.update(&[0]);
            hasher.update(chunk.content.as_bytes());
            hasher.update(&[0]);
            for x in vector {
                hasher.update(&x.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Top `k` chunks for a query.
    ///
    /// `score = (1 - lexical_weight) * cosine + lexical_weight * overlap`, where
    /// `overlap` is the share of query words found in the chunk. Equal scores keep
    /// index order.
    pub fn search(&self, query_vec: &[f32], query_text: &str, k: usize, lexical_weight: f32) -> Vec<SearchHit> {
        if k == 0 || self.chunks.is_empty() {
            return Vec::new();
        }
        let query_words = query_terms(query_text);
        let w = lexical_weight.clamp(0.0, 1.0);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let dense = cosine(query_vec, v);
                let lexical = term_overlap(&query_words, &self.chunks[i].content);
                (i, (1.0 - w) * dense + w * lexical)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit { chunk: self.chunks[i].clone(), score })
            .collect()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() { return 0.0; }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

fn query_terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn term_overlap(query_words: &[String], content: &str) -> f32 {
    if query_words.is_empty() { return 0.0; }
    let content_lower = content.to_lowercase();
    let hits = query_words.iter().filter(|w| content_lower.contains(w.as_str())).count();
    hits as f32 / query_words.len() as f32
}
