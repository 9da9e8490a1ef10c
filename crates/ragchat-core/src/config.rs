use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable and accurate Q&A assistant specializing in product support.
Your goal is to provide precise and relevant answers and instructions based on the provided knowledge about resolution steps to queries on mobile applications and web applications for L1, and SQL queries for L2/Database queries.
If you do not know the answer or the question isn't relevant to knowledge base, it is better to say \"I don't know\" rather than providing incorrect information.";

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    /// Defaults, then `config.toml`, then `config.<env>.toml`, then `APP_*` env vars.
    /// Nested keys use `__`, e.g. `APP_SERVER__PORT=9000`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, env_name })
    }

    pub fn from_figment(figment: Figment, env_name: impl Into<String>) -> Self {
        Self { figment, env_name: env_name.into() }
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    /// Extract and validate the typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        self.validate_for_env(&settings)?;
        Ok(settings)
    }

    fn validate_for_env(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.provider.kind == ProviderKind::Fake {
                    return Err(Error::InvalidConfig("provider.kind = \"fake\" is not allowed in production".into()));
                }
            }
            "dev" | "development" => {}
            "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub documents: DocumentSettings,
    pub chunking: ChunkingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub provider: ProviderSettings,
    pub chat: ChatSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.documents.sources.is_empty() {
            return Err(Error::InvalidConfig("documents.sources must name at least one directory".into()));
        }
        if self.documents.extensions.is_empty() {
            return Err(Error::InvalidConfig("documents.extensions must not be empty".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.lexical_weight) {
            return Err(Error::InvalidConfig("retrieval.lexical_weight must be within [0, 1]".into()));
        }
        if self.index.embed_batch_size == 0 {
            return Err(Error::InvalidConfig("index.embed_batch_size must be at least 1".into()));
        }
        if self.chunking.max_tokens == 0 || !(0.0..1.0).contains(&self.chunking.overlap_percent) {
            return Err(Error::InvalidConfig("chunking.max_tokens must be > 0 and overlap_percent within [0, 1)".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000 }
    }
}

/// One document root and the category subdirectories to read beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub base: String,
    pub subdirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub sources: Vec<SourceSettings>,
    pub extensions: Vec<String>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceSettings { base: "data/L1".to_string(), subdirs: vec!["web".to_string(), "mobile".to_string()] },
                SourceSettings { base: "data/L2".to_string(), subdirs: vec!["queries".to_string()] },
            ],
            extensions: vec!["txt".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub persist_dir: String,
    pub embed_batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { persist_dir: "./index".to_string(), embed_batch_size: 64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub lexical_weight: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 2, lexical_weight: 0.3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    /// Name of the environment variable holding the API key. The key itself never enters config.
    pub api_key_env: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dim: 1536,
            temperature: 0.0,
            request_timeout_secs: 60,
            stream_idle_timeout_secs: 30,
        }
    }
}

/// How `/chat` answers an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Retrieve for the utterance alone, one non-streamed completion.
    Stateless,
    /// Condense history + utterance into a standalone question, retrieve, stream.
    #[default]
    CondensePlusContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub mode: ChatMode,
    pub system_prompt: String,
    /// Keep at most this many turns per session transcript. `None` keeps everything.
    pub max_history_turns: Option<usize>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self { mode: ChatMode::default(), system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(), max_history_turns: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
