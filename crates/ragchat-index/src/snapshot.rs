//! On-disk snapshot layout.
//!
//! A snapshot directory holds a LanceDB database with one `chunks` table and a
//! `manifest.json`. The manifest is written last, so its presence marks a
//! complete snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use serde::{Deserialize, Serialize};

use ragchat_core::types::DocumentChunk;
use ragchat_core::{Error, Result};

use crate::index::VectorIndex;
use crate::schema::{build_arrow_schema, CHUNKS_TABLE};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

const WRITE_BATCH_ROWS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub index_id: String,
    pub embedder_id: String,
    pub dim: usize,
    pub rows: usize,
    pub built_at: DateTime<Utc>,
    pub content_hash: String,
}

impl SnapshotManifest {
    pub fn for_index(index: &VectorIndex) -> Self {
        Self {
            version: MANIFEST_VERSION,
            index_id: index.id().to_string(),
            embedder_id: index.embedder_id().to_string(),
            dim: index.dim(),
            rows: index.len(),
            built_at: index.built_at(),
            content_hash: index.content_hash(),
        }
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf { dir.join(MANIFEST_FILE) }

pub fn read_manifest(dir: &Path) -> Result<SnapshotManifest> {
    let path = manifest_path(dir);
    let raw = std::fs::read_to_string(&path).map_err(|e| Error::corrupt(dir, format!("cannot read manifest: {e}")))?;
    let manifest: SnapshotManifest =
        serde_json::from_str(&raw).map_err(|e| Error::corrupt(dir, format!("invalid manifest: {e}")))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(Error::corrupt(dir, format!("unsupported snapshot version {}", manifest.version)));
    }
    Ok(manifest)
}

async fn open_db(dir: &Path) -> std::result::Result<Connection, lancedb::Error> {
    connect(dir.to_string_lossy().as_ref()).execute().await
}

/// Write `index` as a complete snapshot into the empty directory `dir`.
pub async fn write_snapshot(dir: &Path, index: &VectorIndex) -> Result<()> {
    let db = open_db(dir).await.map_err(|e| Error::persist(dir, e))?;
    let schema = build_arrow_schema(index.dim());
    let chunks = index.chunks();
    let vectors = index.vectors();

    if chunks.is_empty() {
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
        db.create_table(CHUNKS_TABLE, Box::new(iter)).execute().await.map_err(|e| Error::persist(dir, e))?;
    } else {
        let mut table = None;
        for start in (0..chunks.len()).step_by(WRITE_BATCH_ROWS) {
            let end = (start + WRITE_BATCH_ROWS).min(chunks.len());
            let batch = to_record_batch(start, &chunks[start..end], &vectors[start..end], index.dim())
                .map_err(|e| Error::persist(dir, e))?;
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema.clone()));
            match &table {
                None => {
                    let t = db.create_table(CHUNKS_TABLE, reader).execute().await.map_err(|e| Error::persist(dir, e))?;
                    table = Some(t);
                }
                Some(t) => {
                    t.add(reader).execute().await.map_err(|e| Error::persist(dir, e))?;
                }
            }
        }
    }

    let manifest = SnapshotManifest::for_index(index);
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| Error::persist(dir, e))?;
    std::fs::write(manifest_path(dir), json).map_err(|e| Error::persist(dir, e))?;
    Ok(())
}

fn to_record_batch(
    offset: usize,
    chunks: &[DocumentChunk],
    vectors: &[Vec<f32>],
    dim: usize,
) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let schema = build_arrow_schema(dim);
    let positions: Vec<i32> = (offset..offset + chunks.len()).map(|p| p as i32).collect();
    let vectors: Vec<Option<Vec<Option<f32>>>> =
        vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(positions)),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.doc_id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.source_category.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.file_name.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(chunks.iter().map(|c| c.chunk_index as i32).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(chunks.iter().map(|c| c.total_chunks as i32).collect::<Vec<_>>())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim as i32)),
        ],
    )
}

/// Read and validate the snapshot in `dir`. Every failure is `SnapshotCorruptOrMissing`.
pub async fn read_snapshot(dir: &Path) -> Result<(SnapshotManifest, VectorIndex)> {
    let manifest = read_manifest(dir)?;
    let corrupt = |e: lancedb::Error| Error::corrupt(dir, e);
    let db = open_db(dir).await.map_err(corrupt)?;
    let table = db.open_table(CHUNKS_TABLE).execute().await.map_err(corrupt)?;
    let count = table.count_rows(None).await.map_err(corrupt)?;
    if count != manifest.rows {
        return Err(Error::corrupt(dir, format!("manifest says {} rows, table has {}", manifest.rows, count)));
    }

    let mut rows: Vec<(i32, DocumentChunk, Vec<f32>)> = Vec::with_capacity(count);
    if count > 0 {
        let mut stream = table.query().limit(count).execute().await.map_err(corrupt)?;
        while let Some(batch) = stream.try_next().await.map_err(|e| Error::corrupt(dir, e))? {
            decode_batch(dir, &batch, manifest.dim, &mut rows)?;
        }
    }
    if rows.len() != manifest.rows {
        return Err(Error::corrupt(dir, format!("read {} rows, expected {}", rows.len(), manifest.rows)));
    }
    rows.sort_by_key(|(position, _, _)| *position);

    let (chunks, vectors): (Vec<_>, Vec<_>) = rows.into_iter().map(|(_, c, v)| (c, v)).unzip();
    let index = VectorIndex::from_parts(
        manifest.index_id.clone(),
        manifest.embedder_id.clone(),
        manifest.dim,
        manifest.built_at,
        chunks,
        vectors,
    )
    .map_err(|e| Error::corrupt(dir, e))?;
    if index.content_hash() != manifest.content_hash {
        return Err(Error::corrupt(dir, "content hash does not match manifest"));
    }
    Ok((manifest, index))
}

fn column<'a, T: 'static>(dir: &Path, batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::corrupt(dir, format!("column {name} missing or mistyped")))
}

fn decode_batch(dir: &Path, batch: &RecordBatch, dim: usize, out: &mut Vec<(i32, DocumentChunk, Vec<f32>)>) -> Result<()> {
    let position = column::<Int32Array>(dir, batch, "position")?;
    let id = column::<StringArray>(dir, batch, "id")?;
    let doc_id = column::<StringArray>(dir, batch, "doc_id")?;
    let category = column::<StringArray>(dir, batch, "source_category")?;
    let file_name = column::<StringArray>(dir, batch, "file_name")?;
    let content = column::<StringArray>(dir, batch, "content")?;
    let chunk_index = column::<Int32Array>(dir, batch, "chunk_index")?;
    let total_chunks = column::<Int32Array>(dir, batch, "total_chunks")?;
    let vectors = column::<FixedSizeListArray>(dir, batch, "vector")?;
    if vectors.value_length() as usize != dim {
        return Err(Error::corrupt(dir, format!("stored dim {} expected {}", vectors.value_length(), dim)));
    }

    for i in 0..batch.num_rows() {
        if !vectors.is_valid(i) {
            return Err(Error::corrupt(dir, format!("row {i} has no vector")));
        }
        let vector = vectors.value(i).as_primitive::<Float32Type>().values().to_vec();
        let chunk = DocumentChunk {
            id: id.value(i).to_string(),
            doc_id: doc_id.value(i).to_string(),
            source_category: category.value(i).to_string(),
            file_name: file_name.value(i).to_string(),
            content: content.value(i).to_string(),
            chunk_index: chunk_index.value(i) as usize,
            total_chunks: total_chunks.value(i) as usize,
        };
        out.push((position.value(i), chunk, vector));
    }
    Ok(())
}

/// Move `staged` to `location`, replacing any previous snapshot.
///
/// The previous snapshot is renamed aside first and deleted only after the new
/// one is in place; if the final rename fails it is moved back.
pub fn swap_into_place(staged: &Path, location: &Path) -> Result<()> {
    let parent = location.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = location.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "index".into());
    let backup = parent.join(format!(".{}.old-{}", name, uuid::Uuid::new_v4().simple()));

    let had_previous = location.exists();
    if had_previous {
        std::fs::rename(location, &backup).map_err(|e| Error::persist(location, format!("cannot move old snapshot aside: {e}")))?;
    }
    if let Err(e) = std::fs::rename(staged, location) {
        if had_previous {
            if let Err(restore) = std::fs::rename(&backup, location) {
                tracing::error!(backup = %backup.display(), error = %restore, "failed to restore previous snapshot");
            }
        }
        return Err(Error::persist(location, format!("cannot move new snapshot into place: {e}")));
    }
    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            tracing::warn!(backup = %backup.display(), error = %e, "old snapshot left behind");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_replaces_previous_directory() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let location = tmp.path().join("index");
        std::fs::create_dir(&location).expect("mkdir");
        std::fs::write(location.join("old"), b"1").expect("write");
        let staged = tmp.path().join("staged");
        std::fs::create_dir(&staged).expect("mkdir");
        std::fs::write(staged.join("new"), b"2").expect("write");

        swap_into_place(&staged, &location).expect("swap");
        assert!(location.join("new").exists());
        assert!(!location.join("old").exists());
        assert!(!staged.exists());
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).expect("ls").collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn failed_swap_restores_previous() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let location = tmp.path().join("index");
        std::fs::create_dir(&location).expect("mkdir");
        std::fs::write(location.join("old"), b"1").expect("write");

        let err = swap_into_place(&tmp.path().join("does-not-exist"), &location).expect_err("missing staged dir");
        assert!(matches!(err, Error::Persist { .. }));
        assert!(location.join("old").exists());
    }

    #[test]
    fn manifest_version_checked() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        std::fs::write(
            manifest_path(tmp.path()),
            r#"{"version":99,"index_id":"x","embedder_id":"e","dim":2,"rows":0,"built_at":"2024-01-01T00:00:00Z","content_hash":""}"#,
        )
        .expect("write");
        assert!(matches!(read_manifest(tmp.path()), Err(Error::SnapshotCorruptOrMissing { .. })));
    }
}
