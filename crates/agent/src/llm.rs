//! LLM service client.
//!
//! `ChatClient` is the pluggable seam the pipeline talks through; the
//! production implementation speaks the OpenAI-compatible chat-completions
//! protocol over HTTPS, in both non-streaming (SQL generation) and
//! streaming (answer composition) modes.

use async_trait::async_trait;
use futures::StreamExt;
use leadlens_core::Role;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }

    pub fn from_turn(role: Role, content: String) -> Self {
        Self { role: role.as_str(), content }
    }
}

#[derive(Clone, Debug)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatOptions {
    pub fn deterministic(model: impl Into<String>) -> Self {
        Self { model: model.into(), temperature: 0.0, max_tokens: 1024 }
    }

    pub fn narrative(model: impl Into<String>) -> Self {
        Self { model: model.into(), temperature: 0.7, max_tokens: 2048 }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm network failure: {0}")]
    Network(String),
    #[error("llm rate limited")]
    RateLimited,
    #[error("llm api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm returned a malformed response")]
    MalformedResponse,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One non-streaming completion; returns the full assistant text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, LlmError>;

    /// One streaming completion; each incremental text delta is sent on
    /// `tx` as it arrives. Returns once the upstream stream is exhausted.
    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: SecretString, base_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string() }
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = json!({
            "model": options.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, LlmError> {
        let response = self.post_chat(messages, options, false).await?;
        let payload: serde_json::Value =
            response.json().await.map_err(|err| LlmError::Network(err.to_string()))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(LlmError::MalformedResponse)
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError> {
        let response = self.post_chat(messages, options, true).await?;

        let mut stream = response.bytes_stream();
        let mut pending = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|err| LlmError::Network(err.to_string()))?;
            pending.push_str(&String::from_utf8_lossy(&bytes));

            // SSE events are newline-delimited; a chunk may end mid-line,
            // so only complete lines are consumed here.
            while let Some(newline) = pending.find('\n') {
                let line = pending[..newline].trim().to_string();
                pending.drain(..=newline);

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
                    continue;
                };
                if let Some(delta) = event["choices"][0]["delta"]["content"].as_str() {
                    if tx.send(delta.to_string()).await.is_err() {
                        // receiver dropped; drain quietly
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}
