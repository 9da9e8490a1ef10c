//! Conversational query engine bound to one index.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;

pub use ragchat_core::config::ChatMode;
use ragchat_core::config::Settings;
use ragchat_core::traits::{ChatModel, Embedder};
use ragchat_core::types::{ChatMessage, SearchHit};
use ragchat_core::{Error, Result};
use ragchat_index::VectorIndex;

use crate::prompt;
use crate::stream::{AnswerEvent, AnswerStream};
use crate::transcript::Transcript;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub system_prompt: String,
    pub top_k: usize,
    pub lexical_weight: f32,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            system_prompt: settings.chat.system_prompt.clone(),
            top_k: settings.retrieval.top_k,
            lexical_weight: settings.retrieval.lexical_weight,
        }
    }
}

/// Complete answer for `/query`.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SearchHit>,
}

/// Handle derived from exactly one [`VectorIndex`]. Cheap to clone and holds no
/// per-conversation state.
#[derive(Clone)]
pub struct ChatEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    options: Arc<EngineOptions>,
}

impl ChatEngine {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>, options: EngineOptions) -> Self {
        Self { index, embedder, chat, options: Arc::new(options) }
    }

    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }

    /// Top-k chunks for `query`. A blank query retrieves nothing.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let query_vec = vectors.pop().ok_or_else(|| {
            Error::Provider(ragchat_core::ProviderError::new(
                ragchat_core::ProviderErrorKind::BadResponse,
                "no embedding returned for query",
            ))
        })?;
        let hits = self.index.search(&query_vec, query, self.options.top_k, self.options.lexical_weight);
        tracing::debug!(hits = hits.len(), top_score = hits.first().map(|h| h.score), "retrieved context");
        Ok(hits)
    }

    /// Stateless retrieve-then-answer.
    pub async fn query(&self, utterance: &str) -> Result<Answer> {
        let sources = self.retrieve(utterance).await?;
        let messages = vec![ChatMessage::system(self.options.system_prompt.trim()), prompt::qa_prompt(&sources, utterance)];
        let response = self.chat.complete(&messages).await?;
        Ok(Answer { response, sources })
    }

    /// Standalone question for retrieval. Without history the utterance is used as is.
    pub async fn condense(&self, history: &[ChatMessage], utterance: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(utterance.to_string());
        }
        let condensed = self.chat.complete(&[prompt::condense_prompt(history, utterance)]).await?;
        let condensed = condensed.trim();
        Ok(if condensed.is_empty() { utterance.to_string() } else { condensed.to_string() })
    }

    /// Answer `utterance` in `mode`. All work happens lazily as the stream is polled.
    /// The exchange is appended to `transcript` only once the answer completes.
    pub fn respond(&self, mode: ChatMode, transcript: Arc<Transcript>, utterance: String) -> AnswerStream {
        let engine = self.clone();
        let stream = async_stream::stream! {
            let mut answer = String::new();
            match mode {
                ChatMode::Stateless => {
                    match engine.query(&utterance).await {
                        Ok(a) => {
                            answer = a.response;
                            let item: Result<AnswerEvent> = Ok(AnswerEvent::Token(answer.clone()));
                            yield item;
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                ChatMode::CondensePlusContext => {
                    let history = transcript.history().await;
                    let opened = engine.open_context_stream(&history, &utterance).await;
                    let mut tokens = match opened {
                        Ok(tokens) => tokens,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    while let Some(next) = tokens.next().await {
                        match next {
                            Ok(token) => {
                                answer.push_str(&token);
                                yield Ok(AnswerEvent::Token(token));
                            }
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                }
            }
            transcript.record_exchange(utterance, answer).await;
            yield Ok(AnswerEvent::Done);
        };
        Box::pin(stream)
    }

    async fn open_context_stream(&self, history: &[ChatMessage], utterance: &str) -> Result<ragchat_core::traits::TokenStream> {
        let question = self.condense(history, utterance).await?;
        let hits = self.retrieve(&question).await?;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(prompt::context_system_message(&self.options.system_prompt, &hits));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(utterance));
        self.chat.stream(&messages).await
    }
}
