use std::path::Path;
use std::sync::Arc;

use ragchat_core::chunker::{Chunker, ChunkingConfig};
use ragchat_core::config::Settings;
use ragchat_core::traits::Embedder;
use ragchat_core::types::Document;
use ragchat_core::{Error, Result};

use crate::index::VectorIndex;
use crate::snapshot::{manifest_path, read_snapshot, swap_into_place, write_snapshot};

/// Builds, persists and loads [`VectorIndex`]es for one embedder.
pub struct IndexStore {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    embed_batch_size: usize,
}

impl IndexStore {
    pub fn new(embedder: Arc<dyn Embedder>, chunker: Chunker, embed_batch_size: usize) -> Self {
        Self { embedder, chunker, embed_batch_size: embed_batch_size.max(1) }
    }

    pub fn from_settings(settings: &Settings, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, Chunker::new(ChunkingConfig::from(&settings.chunking)), settings.index.embed_batch_size)
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub async fn build(&self, documents: &[Document]) -> Result<VectorIndex> {
        self.build_with_progress(documents, |_, _| {}).await
    }

    /// Like [`build`](Self::build), calling `progress(embedded, total)` after every batch.
    pub async fn build_with_progress<F>(&self, documents: &[Document], mut progress: F) -> Result<VectorIndex>
    where
        F: FnMut(usize, usize) + Send,
    {
        let chunks = self.chunker.chunk_all(documents);
        let total = chunks.len();
        tracing::info!(documents = documents.len(), chunks = total, embedder = self.embedder.embedder_id(), "building index");
        progress(0, total);

        let mut vectors = Vec::with_capacity(total);
        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::Provider(ragchat_core::ProviderError::new(
                    ragchat_core::ProviderErrorKind::BadResponse,
                    format!("asked for {} embeddings, got {}", texts.len(), embedded.len()),
                )));
            }
            vectors.extend(embedded);
            progress(vectors.len(), total);
        }

        let index = VectorIndex::new(self.embedder.embedder_id(), self.embedder.dim(), chunks, vectors)?;
        tracing::info!(index_id = index.id(), chunks = index.len(), "index built");
        Ok(index)
    }

    /// Write `index` to `location`, replacing any existing snapshot. Readers of
    /// `location` see either the old snapshot or the new one, never a partial one.
    pub async fn persist(&self, index: &VectorIndex, location: &Path) -> Result<()> {
        let parent = location.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| Error::persist(location, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".index-staging-")
            .tempdir_in(parent)
            .map_err(|e| Error::persist(location, e))?;

        write_snapshot(staging.path(), index).await?;
        // `staging` is dropped (and deleted) on any early return above.
        let staged = staging.keep();
        if let Err(e) = swap_into_place(&staged, location) {
            if staged.exists() {
                let _ = std::fs::remove_dir_all(&staged);
            }
            return Err(e);
        }
        tracing::info!(location = %location.display(), index_id = index.id(), rows = index.len(), "snapshot persisted");
        Ok(())
    }

    /// Load the snapshot at `location`, rejecting snapshots built by a different embedder.
    pub async fn load(&self, location: &Path) -> Result<VectorIndex> {
        let (manifest, index) = read_snapshot(location).await?;
        if manifest.embedder_id != self.embedder.embedder_id() {
            return Err(Error::corrupt(
                location,
                format!("built by {} but {} is configured", manifest.embedder_id, self.embedder.embedder_id()),
            ));
        }
        if manifest.dim != self.embedder.dim() {
            return Err(Error::corrupt(location, format!("dim {} but embedder has {}", manifest.dim, self.embedder.dim())));
        }
        tracing::info!(location = %location.display(), index_id = index.id(), rows = index.len(), "snapshot loaded");
        Ok(index)
    }

    pub fn exists(location: &Path) -> bool {
        manifest_path(location).is_file()
    }
}
