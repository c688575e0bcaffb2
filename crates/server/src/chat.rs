//! Chat endpoint.
//!
//! `POST /api/chat` accepts `{ prompt: { role, content }, threadId,
//! responseId }` and replies with a live `text/event-stream` of incremental
//! answer text. Pipeline failures never surface here as HTTP errors; they
//! come back inside the narrated answer. The only hard failure at this
//! boundary is a malformed request body.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use leadlens_agent::{ChatPipeline, ChatRequest};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Clone)]
pub struct ChatState {
    pipeline: Arc<ChatPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub prompt: PromptBody,
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(rename = "responseId")]
    pub response_id: Option<String>,
}

/// Inbound prompt shape. `content` arrives as arbitrary JSON from UI
/// clients; anything that is not a string is coerced to empty.
#[derive(Debug, Deserialize)]
pub struct PromptBody {
    #[allow(dead_code)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

pub fn router(pipeline: Arc<ChatPipeline>) -> Router {
    Router::new().route("/api/chat", post(chat)).with_state(ChatState { pipeline })
}

pub async fn chat(State(state): State<ChatState>, Json(body): Json<ChatRequestBody>) -> Response {
    let question = body.prompt.content.as_str().unwrap_or("").to_string();
    let response_id =
        body.response_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(
        event_name = "chat.endpoint.request",
        thread_id = %body.thread_id,
        response_id = %response_id,
        "chat stream opened"
    );

    let request =
        ChatRequest { thread_id: body.thread_id, response_id, question };

    let (tx, rx) = mpsc::channel::<String>(64);
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        pipeline.handle(request, tx).await;
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let delta = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(delta)), rx))
    });

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
