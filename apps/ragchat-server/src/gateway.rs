//! HTTP surface: `/chat` (SSE), `/query`, `/update_index` and `/health`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ragchat_engine::{AnswerEvent, AnswerStream, ChatMode, IndexLifecycle, TranscriptStore};

use crate::error::ApiError;

pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<IndexLifecycle>,
    pub transcripts: Arc<TranscriptStore>,
    pub mode: ChatMode,
}

impl AppState {
    pub fn new(lifecycle: Arc<IndexLifecycle>, transcripts: TranscriptStore, mode: ChatMode) -> Self {
        Self { lifecycle, transcripts: Arc::new(transcripts), mode }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/query", post(query))
        .route("/update_index", post(update_index))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub prompt: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub query: String,
}

/// One SSE frame carrying a token: `data: {"response": "<token>"}\n\n`.
pub fn token_frame(token: &str) -> Bytes {
    let encoded = serde_json::Value::String(token.to_string());
    Bytes::from(format!("data: {{\"response\": {}}}\n\n", encoded))
}

/// Wire frames for an answer. Always ends with exactly one `[DONE]` frame; a
/// failed answer is logged and terminated the same way.
pub fn sse_frames(mut answer: AnswerStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        let mut tokens = 0usize;
        while let Some(event) = answer.next().await {
            match event {
                Ok(AnswerEvent::Token(t)) => {
                    tokens += 1;
                    let frame: Result<Bytes, Infallible> = Ok(token_frame(&t));
                    yield frame;
                }
                Ok(AnswerEvent::Done) => break,
                Err(e) => {
                    tracing::error!(error = %e, tokens, "chat answer failed mid-stream");
                    break;
                }
            }
        }
        tracing::debug!(tokens, "chat stream finished");
        yield Ok(Bytes::from_static(DONE_FRAME));
    }
}

fn event_stream_response(body: Body) -> Response {
    (
        [(header::CONTENT_TYPE, "text/event-stream"), (header::CACHE_CONTROL, "no-cache")],
        body,
    )
        .into_response()
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let generation = match state.lifecycle.current().await {
        Ok(g) => g,
        Err(e) => return ApiError::for_query(&e).into_response(),
    };
    let transcript = state.transcripts.session(req.session_id.as_deref()).await;
    tracing::info!(generation = %generation.id, mode = ?state.mode, "chat request");
    // The stream owns its engine clone, so it keeps this generation for its whole life.
    let answer = generation.engine.respond(state.mode, transcript, req.prompt);
    event_stream_response(Body::from_stream(sse_frames(answer)))
}

async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let generation = match state.lifecycle.current().await {
        Ok(g) => g,
        Err(e) => return ApiError::for_query(&e).into_response(),
    };
    match generation.engine.query(&req.query).await {
        Ok(answer) => {
            tracing::info!(sources = answer.sources.len(), "query answered");
            Json(json!({ "response": answer.response })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            ApiError::for_query(&e).into_response()
        }
    }
}

async fn update_index(State(state): State<AppState>) -> Response {
    match state.lifecycle.rebuild().await {
        Ok(generation) => {
            tracing::info!(generation = %generation.id, chunks = generation.index.len(), "index updated");
            (StatusCode::OK, Json(json!({ "message": "Index updated successfully" }))).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "index update rejected or failed");
            ApiError::for_admin(&e).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lifecycle_state = state.lifecycle.state().await;
    match state.lifecycle.current().await {
        Ok(g) => Json(json!({
            "state": lifecycle_state,
            "generation": g.id,
            "index_id": g.index.id(),
            "chunks": g.index.len(),
            "built_at": g.index.built_at(),
            "activated_at": g.activated_at,
        })),
        Err(_) => Json(json!({ "state": lifecycle_state })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_frame_escapes_json() {
        assert_eq!(&token_frame("hi")[..], b"data: {\"response\": \"hi\"}\n\n");
        assert_eq!(&token_frame("a \"b\"\n")[..], b"data: {\"response\": \"a \\\"b\\\"\\n\"}\n\n");
    }
}
