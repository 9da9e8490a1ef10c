use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use ragchat_core::config::{Config, Settings};
use ragchat_engine::{IndexLifecycle, TranscriptStore};
use ragchat_provider::Providers;

use crate::gateway::AppState;

/// Parsed command line shared by both binaries.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_dir: Option<PathBuf>,
    pub force: bool,
}

impl CliArgs {
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut out = Self::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--force" | "-f" => out.force = true,
                "--config-dir" | "-c" => {
                    let dir = args.get(i + 1).context("--config-dir requires a path")?;
                    out.config_dir = Some(PathBuf::from(dir));
                    i += 1;
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
            i += 1;
        }
        Ok(out)
    }

    pub fn root(&self) -> anyhow::Result<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("cannot determine working directory"),
        }
    }
}

/// `.env`, then layered config from `root`, then validation.
pub fn load_settings(root: &Path) -> anyhow::Result<Settings> {
    let env_file = root.join(".env");
    if dotenvy::from_path(&env_file).is_ok() {
        tracing::debug!(path = %env_file.display(), "loaded .env");
    }
    let config = Config::load_from(root)?;
    let settings = config.settings().with_context(|| format!("invalid configuration for env '{}'", config.env_name()))?;
    tracing::info!(env = config.env_name(), provider = ?settings.provider.kind, mode = ?settings.chat.mode, "configuration loaded");
    Ok(settings)
}

pub fn build_lifecycle(settings: &Settings, root: &Path) -> anyhow::Result<IndexLifecycle> {
    let providers = Providers::from_settings(&settings.provider)?;
    Ok(IndexLifecycle::from_settings(settings, root, providers.embedder, providers.chat))
}

pub fn app_state(settings: &Settings, lifecycle: Arc<IndexLifecycle>) -> AppState {
    AppState::new(lifecycle, TranscriptStore::new(settings.chat.max_history_turns), settings.chat.mode)
}
