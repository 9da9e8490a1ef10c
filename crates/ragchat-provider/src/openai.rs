//! OpenAI-compatible HTTP provider: `/embeddings` and `/chat/completions`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use ragchat_core::config::ProviderSettings;
use ragchat_core::traits::{ChatModel, Embedder, TokenStream};
use ragchat_core::types::ChatMessage;
use ragchat_core::{Error, ProviderError, ProviderErrorKind, Result};

use crate::sse::SseLineDecoder;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 512;

/// API credential. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(Self(v.trim().to_string())),
            _ => Err(Error::InvalidConfig(format!("environment variable {var} is not set"))),
        }
    }

    fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ApiKey(***)") }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("***") }
}

/// Shared HTTP client; cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(settings: &ProviderSettings, api_key: ApiKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            stream_idle_timeout: Duration::from_secs(settings.stream_idle_timeout_secs),
        })
    }

    /// POST a JSON body and return the response once headers arrive with a 2xx status.
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, path);
        let send = self.http.post(&url).bearer_auth(self.api_key.expose()).json(body).send();
        let response = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(map_reqwest(e).into()),
            Err(_) => {
                return Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    format!("no response from {} within {}s", path, self.request_timeout.as_secs()),
                )
                .into())
            }
        };
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let raw = response.text().await.unwrap_or_default();
        let text = clip(&raw, MAX_ERROR_BODY);
        Err(ProviderError::new(kind_for_status(status), format!("{} {}: {}", status.as_u16(), path, text)).into())
    }

    async fn post_for_json<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.post(path, body).await?;
        match tokio::time::timeout(self.request_timeout, response.json::<R>()).await {
            Ok(Ok(parsed)) => Ok(parsed),
            Ok(Err(e)) => Err(map_reqwest(e).into()),
            Err(_) => Err(ProviderError::new(ProviderErrorKind::Timeout, format!("reading {path} body timed out")).into()),
        }
    }
}

/// At most `max` bytes of `text`, cut on a char boundary.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn kind_for_status(status: reqwest::StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        401 | 403 => ProviderErrorKind::Auth,
        408 => ProviderErrorKind::Timeout,
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::Unavailable,
        _ => ProviderErrorKind::BadResponse,
    }
}

fn map_reqwest(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_decode() {
        ProviderErrorKind::BadResponse
    } else {
        ProviderErrorKind::Transport
    };
    ProviderError::new(kind, e.to_string())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dim: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>, dim: usize) -> Self {
        let model = model.into();
        let id = format!("openai:{}:d{}", model, dim);
        Self { client, model, dim, id }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let request = EmbeddingRequest { model: &self.model, input: texts };
        let mut response: EmbeddingResponse = self.client.post_for_json("embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(ProviderError::new(
                ProviderErrorKind::BadResponse,
                format!("expected {} embeddings, got {}", texts.len(), response.data.len()),
            )
            .into());
        }
        response.data.sort_by_key(|d| d.index);
        let mut out = Vec::with_capacity(texts.len());
        for d in response.data {
            if d.embedding.len() != self.dim {
                return Err(ProviderError::new(
                    ProviderErrorKind::BadResponse,
                    format!("dim mismatch: got {} expected {}", d.embedding.len(), self.dim),
                )
                .into());
            }
            out.push(d.embedding);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
}

#[derive(Deserialize, Default)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum StreamData {
    Token(String),
    Done,
}

/// Interpret one upstream `data:` payload. Role-only or empty deltas yield an empty token.
fn parse_stream_data(data: &str) -> Result<StreamData> {
    if data.trim() == "[DONE]" {
        return Ok(StreamData::Done);
    }
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::new(ProviderErrorKind::BadResponse, format!("invalid stream chunk: {e}")))?;
    if let Some(err) = value.get("error") {
        return Err(ProviderError::new(ProviderErrorKind::Unavailable, format!("upstream error mid-stream: {err}")).into());
    }
    let chunk: ChatStreamChunk = serde_json::from_value(value)
        .map_err(|e| ProviderError::new(ProviderErrorKind::BadResponse, format!("invalid stream chunk: {e}")))?;
    let token = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();
    Ok(StreamData::Token(token))
}

pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(client: OpenAiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self { client, model: model.into(), temperature }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str { &self.model }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatCompletionRequest { model: &self.model, messages, temperature: self.temperature, stream: false };
        let response: ChatCompletionResponse = self.client.post_for_json("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::BadResponse, "completion had no content").into())
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let request = ChatCompletionRequest { model: &self.model, messages, temperature: self.temperature, stream: true };
        let response = self.client.post("chat/completions", &request).await?;
        let idle = self.client.stream_idle_timeout;
        let mut body = Box::pin(response.bytes_stream());

        // Dropping this stream drops `body`, which aborts the upstream request.
        let stream = async_stream::stream! {
            let mut decoder = SseLineDecoder::default();
            'read: loop {
                let next = match tokio::time::timeout(idle, body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let err: Result<String> = Err(ProviderError::new(
                            ProviderErrorKind::Timeout,
                            format!("no stream data for {}s", idle.as_secs()),
                        ).into());
                        yield err;
                        break 'read;
                    }
                };
                let payloads = match next {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        yield Err(Error::from(map_reqwest(e)));
                        break 'read;
                    }
                    None => {
                        if let Some(data) = decoder.finish() {
                            match parse_stream_data(&data) {
                                Ok(StreamData::Token(t)) if !t.is_empty() => {
                                    yield Ok(t);
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!(error = %e, "upstream stream ended mid-line, answer may be truncated"),
                            }
                        }
                        break 'read;
                    }
                };
                for data in payloads {
                    match parse_stream_data(&data) {
                        Ok(StreamData::Done) => break 'read,
                        Ok(StreamData::Token(t)) => {
                            if !t.is_empty() { yield Ok(t); }
                        }
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert_eq!(key.to_string(), "***");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let body = format!("{}\u{e9} tail", "x".repeat(511));
        assert_eq!(clip(&body, 512), "x".repeat(511));
        assert_eq!(clip("short", 512), "short");
        assert_eq!(clip("\u{e9}\u{e9}", 3), "\u{e9}");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(kind_for_status(reqwest::StatusCode::UNAUTHORIZED), ProviderErrorKind::Auth);
        assert_eq!(kind_for_status(reqwest::StatusCode::TOO_MANY_REQUESTS), ProviderErrorKind::RateLimited);
        assert_eq!(kind_for_status(reqwest::StatusCode::BAD_GATEWAY), ProviderErrorKind::Unavailable);
        assert_eq!(kind_for_status(reqwest::StatusCode::BAD_REQUEST), ProviderErrorKind::BadResponse);
    }

    #[test]
    fn parses_stream_payloads() {
        assert_eq!(parse_stream_data("[DONE]").unwrap(), StreamData::Done);
        assert_eq!(
            parse_stream_data(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#).unwrap(),
            StreamData::Token("Hel".into())
        );
        assert_eq!(
            parse_stream_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            StreamData::Token(String::new())
        );
        assert!(parse_stream_data(r#"{"error":{"message":"overloaded"}}"#).is_err());
        assert!(parse_stream_data("not json").is_err());
    }
}
