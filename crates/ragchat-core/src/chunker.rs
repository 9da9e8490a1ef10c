use crate::config::ChunkingSettings;
use crate::types::{Document, DocumentChunk};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(s: &ChunkingSettings) -> Self {
        Self { max_tokens: s.max_tokens, overlap_percent: s.overlap_percent }
    }
}

/// Paragraph-first splitter: each blank-line separated paragraph becomes a chunk,
/// paragraphs over `max_tokens` are cut into overlapping word windows.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self { Self { config } }

    pub fn chunk_all(&self, documents: &[Document]) -> Vec<DocumentChunk> {
        documents.iter().flat_map(|d| self.chunk(d)).collect()
    }

    pub fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        let doc_id = document.doc_id();
        let meta = document.metadata();
        let text = document.text().replace("\r\n", "\n");
        let mut pieces = Vec::new();
        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() { continue; }
            if self.count_tokens(paragraph) <= self.config.max_tokens {
                pieces.push(paragraph.to_string());
            } else {
                pieces.extend(self.split_paragraph_with_overlap(paragraph));
            }
        }
        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| DocumentChunk {
                id: format!("{}:{}", doc_id, chunk_index),
                doc_id: doc_id.clone(),
                source_category: meta.source_category.clone(),
                file_name: meta.file_name.clone(),
                content,
                chunk_index,
                total_chunks,
            })
            .collect()
    }

    // ~0.75 words per token
    fn count_tokens(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        (word_count as f32 / 0.75) as usize
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = ((self.config.max_tokens as f32 * 0.75) as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * self.config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMetadata;

    fn doc(text: &str) -> Document {
        Document::new(
            text,
            DocumentMetadata { source_category: "web".into(), file_name: "a.txt".into(), relative_path: "a.txt".into() },
        )
    }

    #[test]
    fn one_small_paragraph_becomes_one_chunk() {
        let chunks = Chunker::default().chunk(&doc("Short text\n"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Short text");
        assert_eq!(chunks[0].id, "web/a.txt:0");
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn paragraphs_split_and_blank_ones_dropped() {
        let chunks = Chunker::default().chunk(&doc("first\n\n\n\nsecond\n\nthird"));
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
    }

    #[test]
    fn crlf_paragraphs_split_like_lf() {
        let chunks = Chunker::default().chunk(&doc("first line\r\nstill first\r\n\r\nsecond\r\n"));
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first line\nstill first", "second"]);
    }

    #[test]
    fn long_paragraph_windows_overlap() {
        let chunker = Chunker::new(ChunkingConfig { max_tokens: 8, overlap_percent: 0.5 });
        // 6 words per window, 3 overlap
        let text = (0..12).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunker.chunk(&doc(&text));
        assert_eq!(chunks[0].content, "w0 w1 w2 w3 w4 w5");
        assert_eq!(chunks[1].content, "w3 w4 w5 w6 w7 w8");
        assert_eq!(chunks.last().map(|c| c.content.as_str()), Some("w6 w7 w8 w9 w10 w11"));
        for (i, c) in chunks.iter().enumerate() { assert_eq!(c.chunk_index, i); }
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(Chunker::default().chunk(&doc("  \n\n ")).is_empty());
    }
}
