//! Owns the serving generation: decides build vs. load at startup, rebuilds on
//! demand and publishes each new `(index, engine)` pair with one pointer swap.
//!
//! Readers call [`IndexLifecycle::current`] once per request and keep the
//! returned `Arc` for the whole request, so a concurrent rebuild never changes
//! what an in-flight request sees.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use ragchat_core::config::{resolve_with_base, Settings};
use ragchat_core::loader::DocumentLoader;
use ragchat_core::traits::{ChatModel, Embedder};
use ragchat_core::types::Document;
use ragchat_core::{Error, Result};
use ragchat_index::{IndexStore, VectorIndex};

use crate::engine::{ChatEngine, EngineOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Rebuilding,
}

/// An index and the engine derived from it, published together.
pub struct ServingGeneration {
    pub id: Uuid,
    pub index: Arc<VectorIndex>,
    pub engine: ChatEngine,
    pub activated_at: DateTime<Utc>,
}

impl fmt::Debug for ServingGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingGeneration")
            .field("id", &self.id)
            .field("index_id", &self.index.id())
            .field("chunks", &self.index.len())
            .field("activated_at", &self.activated_at)
            .finish()
    }
}

pub struct IndexLifecycle {
    loader: DocumentLoader,
    store: IndexStore,
    chat: Arc<dyn ChatModel>,
    options: EngineOptions,
    persist_dir: PathBuf,
    current: RwLock<Option<Arc<ServingGeneration>>>,
    rebuild_lock: Mutex<()>,
    rebuilding: AtomicBool,
}

impl IndexLifecycle {
    pub fn new(
        loader: DocumentLoader,
        store: IndexStore,
        chat: Arc<dyn ChatModel>,
        options: EngineOptions,
        persist_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            loader,
            store,
            chat,
            options,
            persist_dir: persist_dir.into(),
            current: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            rebuilding: AtomicBool::new(false),
        }
    }

    /// Wire everything from settings. Relative paths resolve against `root`.
    pub fn from_settings(settings: &Settings, root: &Path, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self::new(
            DocumentLoader::from_settings(&settings.documents, root),
            IndexStore::from_settings(settings, embedder),
            chat,
            EngineOptions::from_settings(settings),
            resolve_with_base(root, &settings.index.persist_dir),
        )
    }

    pub fn persist_dir(&self) -> &Path { &self.persist_dir }

    pub async fn state(&self) -> LifecycleState {
        if self.current.read().await.is_none() {
            LifecycleState::Uninitialized
        } else if self.rebuilding.load(Ordering::SeqCst) {
            LifecycleState::Rebuilding
        } else {
            LifecycleState::Ready
        }
    }

    /// The published generation. Clone of the `Arc`; the read lock is released on return.
    pub async fn current(&self) -> Result<Arc<ServingGeneration>> {
        self.current.read().await.clone().ok_or(Error::NotReady)
    }

    /// Load the persisted snapshot if there is a usable one, otherwise build and persist.
    pub async fn initialize(&self) -> Result<Arc<ServingGeneration>> {
        let _guard = self.rebuild_lock.try_lock().map_err(|_| Error::RebuildInProgress)?;
        let _flag = RebuildingFlag::raise(&self.rebuilding);

        if IndexStore::exists(&self.persist_dir) {
            tracing::info!(location = %self.persist_dir.display(), "loading persisted index");
            match self.store.load(&self.persist_dir).await {
                Ok(index) => return Ok(self.publish(index).await),
                Err(e @ Error::SnapshotCorruptOrMissing { .. }) => {
                    tracing::warn!(error = %e, "persisted index unusable, rebuilding");
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!(location = %self.persist_dir.display(), "no persisted index, building");
        }
        let index = self.build_and_persist().await?;
        Ok(self.publish(index).await)
    }

    /// Rebuild from the document sources. At most one rebuild runs at a time; a
    /// concurrent call fails with [`Error::RebuildInProgress`]. On failure the
    /// previous generation stays current.
    pub async fn rebuild(&self) -> Result<Arc<ServingGeneration>> {
        let _guard = self.rebuild_lock.try_lock().map_err(|_| Error::RebuildInProgress)?;
        let _flag = RebuildingFlag::raise(&self.rebuilding);
        tracing::info!("index rebuild started");
        match self.build_and_persist().await {
            Ok(index) => Ok(self.publish(index).await),
            Err(e) => {
                tracing::error!(error = %e, "index rebuild failed, keeping current index");
                Err(e)
            }
        }
    }

    async fn build_and_persist(&self) -> Result<VectorIndex> {
        let documents = self.load_documents().await?;
        let index = self.store.build(&documents).await?;
        self.store.persist(&index, &self.persist_dir).await?;
        Ok(index)
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        let loader = self.loader.clone();
        tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| Error::load_io(PathBuf::from("<document loader>"), std::io::Error::other(e)))?
    }

    async fn publish(&self, index: VectorIndex) -> Arc<ServingGeneration> {
        let index = Arc::new(index);
        let engine = ChatEngine::new(index.clone(), self.store.embedder().clone(), self.chat.clone(), self.options.clone());
        let generation = Arc::new(ServingGeneration { id: Uuid::new_v4(), index, engine, activated_at: Utc::now() });
        *self.current.write().await = Some(generation.clone());
        tracing::info!(
            generation = %generation.id,
            index_id = generation.index.id(),
            chunks = generation.index.len(),
            "serving generation published"
        );
        generation
    }
}

/// Holds the `rebuilding` flag up for as long as it lives.
struct RebuildingFlag<'a>(&'a AtomicBool);

impl<'a> RebuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RebuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
