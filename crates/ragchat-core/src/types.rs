//! Domain types shared by the loader, index and chat engine.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Provenance of a loaded document.
///
/// - `source_category`: the configured subdirectory it came from (e.g. "web", "queries")
/// - `file_name`: bare file name
/// - `relative_path`: path below the category directory (equals `file_name` unless nested)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_category: String,
    pub file_name: String,
    pub relative_path: String,
}

/// A source document as read from disk. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self { text: text.into(), metadata }
    }

    pub fn text(&self) -> &str { &self.text }

    pub fn metadata(&self) -> &DocumentMetadata { &self.metadata }

    /// Stable identity: `<source_category>/<relative_path>`.
    pub fn doc_id(&self) -> String {
        format!("{}/{}", self.metadata.source_category, self.metadata.relative_path)
    }
}

/// A chunk of a source document that is independently embedded and retrieved.
///
/// - `id`: `<doc_id>:<chunk_index>`, unique within an index
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub source_category: String,
    pub file_name: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A retrieved chunk. Higher `score` is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn. Also the message unit sent to the chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}
