//! Embedding and chat model providers behind the `ragchat-core` traits.

use std::sync::Arc;

use ragchat_core::config::{ProviderKind, ProviderSettings};
use ragchat_core::traits::{ChatModel, Embedder};
use ragchat_core::Result;

pub mod fake;
pub mod openai;
mod sse;

pub use fake::{FailMode, FakeChatModel, FakeEmbedder};
pub use openai::{ApiKey, OpenAiChatModel, OpenAiClient, OpenAiEmbedder};

/// The pair of models a deployment talks to.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

impl Providers {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        match settings.kind {
            ProviderKind::OpenAi => {
                let key = ApiKey::from_env(&settings.api_key_env)?;
                let client = OpenAiClient::new(settings, key)?;
                tracing::info!(
                    base_url = %settings.base_url,
                    chat_model = %settings.chat_model,
                    embedding_model = %settings.embedding_model,
                    "using OpenAI-compatible provider"
                );
                Ok(Self {
                    embedder: Arc::new(OpenAiEmbedder::new(
                        client.clone(),
                        settings.embedding_model.clone(),
                        settings.embedding_dim,
                    )),
                    chat: Arc::new(OpenAiChatModel::new(client, settings.chat_model.clone(), settings.temperature)),
                })
            }
            ProviderKind::Fake => {
                tracing::warn!(dim = settings.embedding_dim, "using fake offline providers");
                Ok(Self {
                    embedder: Arc::new(FakeEmbedder::new(settings.embedding_dim)),
                    chat: Arc::new(FakeChatModel::default()),
                })
            }
        }
    }
}
