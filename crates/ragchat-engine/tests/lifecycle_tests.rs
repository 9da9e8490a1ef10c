use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use ragchat_core::chunker::Chunker;
use ragchat_core::loader::{DocumentLoader, SourceDir};
use ragchat_core::traits::Embedder;
use ragchat_core::{Error, ProviderError, ProviderErrorKind, Result};
use ragchat_engine::{EngineOptions, IndexLifecycle, LifecycleState};
use ragchat_index::IndexStore;
use ragchat_provider::{FakeChatModel, FakeEmbedder};

/// Fake embedder that takes a while, to keep a rebuild in flight.
struct SlowEmbedder {
    inner: FakeEmbedder,
    delay: Duration,
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }
}

fn write_docs(root: &Path) {
    let web = root.join("L1/web");
    std::fs::create_dir_all(&web).expect("mkdir");
    std::fs::write(web.join("password.txt"), "Reset your password from Settings.").expect("write");
    std::fs::write(web.join("export.txt"), "Export reports from the dashboard.").expect("write");
}

/// Embedder that starts failing once `broken` is set.
struct FlakyEmbedder {
    inner: FakeEmbedder,
    broken: AtomicBool,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ProviderError::new(ProviderErrorKind::Unavailable, "embedding service down").into());
        }
        self.inner.embed_batch(texts).await
    }
}

fn lifecycle(root: &Path, embedder: Arc<dyn Embedder>) -> IndexLifecycle {
    lifecycle_at(root, embedder, root.join("index"))
}

fn lifecycle_at(root: &Path, embedder: Arc<dyn Embedder>, persist_dir: PathBuf) -> IndexLifecycle {
    let loader = DocumentLoader::new(
        vec![SourceDir { base: root.join("L1"), subdirs: vec!["web".into(), "mobile".into()] }],
        vec!["txt".into()],
    );
    let store = IndexStore::new(embedder, Chunker::default(), 1);
    let options = EngineOptions { system_prompt: "Be accurate.".into(), top_k: 2, lexical_weight: 0.3 };
    IndexLifecycle::new(loader, store, Arc::new(FakeChatModel::default()), options, persist_dir)
}

#[tokio::test]
async fn not_ready_before_initialize() {
    let tmp = TempDir::new().expect("tmp");
    let lc = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    assert_eq!(lc.state().await, LifecycleState::Uninitialized);
    assert!(matches!(lc.current().await, Err(Error::NotReady)));
}

#[tokio::test]
async fn initialize_builds_then_reuses_snapshot() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());

    let first = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    let built = first.initialize().await.expect("build");
    assert_eq!(first.state().await, LifecycleState::Ready);
    assert_eq!(built.index.len(), 2);
    assert!(tmp.path().join("index/manifest.json").exists());

    // new documents are not picked up: the snapshot is loaded, not rebuilt
    std::fs::write(tmp.path().join("L1/web/new.txt"), "Brand new article.").expect("write");
    let second = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    let loaded = second.initialize().await.expect("load");
    assert_eq!(loaded.index.id(), built.index.id());
    assert_eq!(loaded.index.len(), 2);
}

#[tokio::test]
async fn corrupt_snapshot_falls_back_to_build() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let index_dir = tmp.path().join("index");
    std::fs::create_dir_all(&index_dir).expect("mkdir");
    std::fs::write(index_dir.join("manifest.json"), b"garbage").expect("write");

    let lc = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    let generation = lc.initialize().await.expect("rebuilt");
    assert_eq!(generation.index.len(), 2);
}

#[tokio::test]
async fn generation_pairs_stay_consistent_across_rebuild() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let lc = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    lc.initialize().await.expect("init");

    let before = lc.current().await.expect("current");
    let old_index_id = before.index.id().to_string();
    std::fs::write(tmp.path().join("L1/web/new.txt"), "Brand new article.").expect("write");
    lc.rebuild().await.expect("rebuild");
    let after = lc.current().await.expect("current");

    assert!(Arc::ptr_eq(&before.index, before.engine.index()));
    assert!(Arc::ptr_eq(&after.index, after.engine.index()));
    assert!(!Arc::ptr_eq(&before.index, &after.index));
    assert_ne!(before.id, after.id);
    // the request that snapshotted `before` still sees the old index
    assert_eq!(before.index.id(), old_index_id);
    assert_eq!(before.index.len(), 2);
    assert_eq!(after.index.len(), 3);
}

#[tokio::test]
async fn failed_rebuild_keeps_current_generation() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let lc = lifecycle(tmp.path(), Arc::new(FakeEmbedder::new(32)));
    let before = lc.initialize().await.expect("init");

    std::fs::remove_dir_all(tmp.path().join("L1")).expect("rm docs");
    let err = lc.rebuild().await.expect_err("missing base dir");
    assert!(matches!(err, Error::LoadIo { .. }));

    let after = lc.current().await.expect("current");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(lc.state().await, LifecycleState::Ready);
    // snapshot on disk untouched as well
    assert!(IndexStore::exists(lc.persist_dir()));
}

#[tokio::test]
async fn embedding_failure_during_rebuild_keeps_current_generation() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let embedder = Arc::new(FlakyEmbedder { inner: FakeEmbedder::new(32), broken: AtomicBool::new(false) });
    let lc = lifecycle(tmp.path(), embedder.clone());
    let before = lc.initialize().await.expect("init");

    embedder.broken.store(true, Ordering::SeqCst);
    let err = lc.rebuild().await.expect_err("embedding down");
    assert!(matches!(err, Error::Provider(_)));

    let after = lc.current().await.expect("current");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(lc.state().await, LifecycleState::Ready);
    assert!(IndexStore::exists(lc.persist_dir()));
}

#[tokio::test]
async fn persist_failure_during_rebuild_keeps_current_generation() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let store_dir = tmp.path().join("store");
    let lc = lifecycle_at(tmp.path(), Arc::new(FakeEmbedder::new(32)), store_dir.join("index"));
    let before = lc.initialize().await.expect("init");

    // a plain file where the snapshot's parent directory should be
    std::fs::remove_dir_all(&store_dir).expect("rm store");
    std::fs::write(&store_dir, b"not a directory").expect("write");
    let err = lc.rebuild().await.expect_err("cannot persist");
    assert!(matches!(err, Error::Persist { .. }));

    let after = lc.current().await.expect("current");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(lc.state().await, LifecycleState::Ready);
}

#[tokio::test]
async fn concurrent_rebuild_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    write_docs(tmp.path());
    let slow = Arc::new(SlowEmbedder { inner: FakeEmbedder::new(32), delay: Duration::from_millis(300) });
    let lc = Arc::new(lifecycle(tmp.path(), slow));
    lc.initialize().await.expect("init");

    let running = {
        let lc = lc.clone();
        tokio::spawn(async move { lc.rebuild().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(lc.state().await, LifecycleState::Rebuilding);
    assert!(matches!(lc.rebuild().await, Err(Error::RebuildInProgress)));
    // readers are not blocked while the rebuild runs
    assert!(lc.current().await.is_ok());

    running.await.expect("join").expect("first rebuild succeeds");
    assert_eq!(lc.state().await, LifecycleState::Ready);
}
