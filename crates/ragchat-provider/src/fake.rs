//! Deterministic offline providers for tests and local development.

use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use twox_hash::XxHash64;

use ragchat_core::traits::{ChatModel, Embedder, TokenStream};
use ragchat_core::types::ChatMessage;
use ragchat_core::{Error, ProviderError, ProviderErrorKind, Result};

/// Hashed bag-of-words embedding. Texts sharing words land close together.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("fake:xxhash:d{dim}") }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() { continue; }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// When a [`FakeChatModel`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailMode {
    #[default]
    Never,
    /// Both `complete` and `stream` fail before producing anything.
    Immediately,
    /// `stream` yields this many tokens, then an error.
    AfterTokens(usize),
}

/// Scripted chat model. Every call is recorded so tests can inspect the prompts sent.
pub struct FakeChatModel {
    tokens: Vec<String>,
    fail: FailMode,
    token_delay: Option<Duration>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl Default for FakeChatModel {
    fn default() -> Self {
        Self::with_tokens(["I", " don't", " know."])
    }
}

impl FakeChatModel {
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            fail: FailMode::Never,
            token_delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, fail: FailMode) -> Self {
        self.fail = fail;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Every message list passed to `complete` or `stream`, oldest first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, messages: &[ChatMessage]) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
    }

    fn scripted_failure() -> Error {
        ProviderError::new(ProviderErrorKind::Unavailable, "scripted failure").into()
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    fn model_name(&self) -> &str { "fake" }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(messages);
        match self.fail {
            FailMode::Never => Ok(self.tokens.concat()),
            _ => Err(Self::scripted_failure()),
        }
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        self.record(messages);
        let fail_after = match self.fail {
            FailMode::Never => None,
            FailMode::Immediately => return Err(Self::scripted_failure()),
            FailMode::AfterTokens(n) => Some(n),
        };
        let tokens = self.tokens.clone();
        let delay = self.token_delay;
        let stream = async_stream::stream! {
            for (i, token) in tokens.into_iter().enumerate() {
                if fail_after == Some(i) { break; }
                if let Some(d) = delay { tokio::time::sleep(d).await; }
                let item: Result<String> = Ok(token);
                yield item;
            }
            if fail_after.is_some() {
                yield Err(FakeChatModel::scripted_failure());
            }
        };
        Ok(Box::pin(stream))
    }
}
