use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::types::ChatMessage;

/// Incremental model output. Finite, lazy and consumed once.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `openai:text-embedding-ada-002`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Single non-streamed completion.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
    /// Token-by-token completion.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;
}
