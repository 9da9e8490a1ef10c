use indicatif::{ProgressBar, ProgressStyle};

use ragchat_core::config::resolve_with_base;
use ragchat_core::loader::DocumentLoader;
use ragchat_index::IndexStore;
use ragchat_provider::Providers;
use ragchat_server::bootstrap::{self, CliArgs};
use ragchat_server::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = CliArgs::parse(&args).map_err(|e| {
        eprintln!("Usage: ragchat-indexer [--force] [--config-dir DIR]");
        e
    })?;
    let root = cli.root()?;
    let settings = bootstrap::load_settings(&root)?;
    let persist_dir = resolve_with_base(&root, &settings.index.persist_dir);

    println!("ragchat indexer\n===============");
    println!("Index location: {}", persist_dir.display());
    if IndexStore::exists(&persist_dir) && !cli.force {
        println!("✅ Snapshot already present, nothing to do (use --force to rebuild)");
        return Ok(());
    }

    let loader = DocumentLoader::from_settings(&settings.documents, &root);
    for source in loader.sources() {
        println!("📂 {} [{}]", source.base.display(), source.subdirs.join(", "));
    }
    let documents = tokio::task::spawn_blocking(move || loader.load()).await??;
    println!("📄 Loaded {} documents", documents.len());

    let providers = Providers::from_settings(&settings.provider)?;
    let store = IndexStore::from_settings(&settings, providers.embedder);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let index = store
        .build_with_progress(&documents, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await?;
    pb.finish_with_message("embedded");

    store.persist(&index, &persist_dir).await?;
    println!("\n✅ Indexed {} chunks from {} documents", index.len(), documents.len());
    println!("📦 Snapshot {} written to {}", index.id(), persist_dir.display());
    Ok(())
}
