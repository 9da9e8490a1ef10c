//! Walks the configured document roots and reads text files into [`Document`]s.
//!
//! Per-file problems (unreadable, not UTF-8) are logged and skipped. A missing
//! category subdirectory yields nothing. A missing *base* directory is an error
//! so that a vanished mount cannot silently turn into an empty index.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{resolve_with_base, DocumentSettings};
use crate::error::{Error, Result};
use crate::types::{Document, DocumentMetadata};

#[derive(Debug, Clone)]
pub struct SourceDir {
    pub base: PathBuf,
    pub subdirs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    sources: Vec<SourceDir>,
    extensions: Vec<String>,
}

impl DocumentLoader {
    pub fn new(sources: Vec<SourceDir>, extensions: Vec<String>) -> Self {
        let extensions = extensions.into_iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect();
        Self { sources, extensions }
    }

    /// Relative `base` paths are resolved against `root`.
    pub fn from_settings(settings: &DocumentSettings, root: &Path) -> Self {
        let sources = settings
            .sources
            .iter()
            .map(|s| SourceDir { base: resolve_with_base(root, &s.base), subdirs: s.subdirs.clone() })
            .collect();
        Self::new(sources, settings.extensions.clone())
    }

    pub fn sources(&self) -> &[SourceDir] { &self.sources }

    pub fn load(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut skipped = 0usize;
        for source in &self.sources {
            if !source.base.is_dir() {
                return Err(Error::load_io(
                    &source.base,
                    std::io::Error::new(ErrorKind::NotFound, "document root is not a directory"),
                ));
            }
            for subdir in &source.subdirs {
                let dir = source.base.join(subdir);
                if !dir.is_dir() {
                    tracing::warn!(dir = %dir.display(), "category directory missing, skipping");
                    continue;
                }
                let files = self.list_matching_files(&dir);
                if files.is_empty() {
                    tracing::info!(dir = %dir.display(), "no matching files");
                }
                for path in files {
                    match read_utf8(&path) {
                        Ok(text) => documents.push(Document::new(text, metadata_for(&path, &dir, subdir))),
                        Err(e) => {
                            skipped += 1;
                            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable document");
                        }
                    }
                }
            }
        }
        tracing::info!(documents = documents.len(), skipped, "loaded documents");
        Ok(documents)
    }

    fn list_matching_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() { continue; }
            let matches = entry
                .path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
            if matches { files.push(entry.path().to_path_buf()); }
        }
        files.sort();
        files
    }
}

fn read_utf8(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::load_io(path, e))?;
    String::from_utf8(bytes).map_err(|e| Error::load_io(path, std::io::Error::new(ErrorKind::InvalidData, e)))
}

fn metadata_for(path: &Path, category_dir: &Path, category: &str) -> DocumentMetadata {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let relative = path.strip_prefix(category_dir).unwrap_or(path);
    let relative_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    DocumentMetadata { source_category: category.to_string(), file_name, relative_path }
}
