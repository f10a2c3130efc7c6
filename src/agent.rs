//! Agent transport client
//!
//! Sends a user message to the remote agent and receives the reply, either
//! as one bulk JSON body or as a live event stream. The coordinator only
//! sees the [`AgentTransport`] capability, so tests and alternative
//! backends plug in at this seam.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::AgentConfig;
use crate::stream::{StreamEvent, decode_stream};
use crate::{Error, Result};

/// Bulk endpoint path under the agent base URL
const CHAT_PATH: &str = "/api/chat";

/// Streaming endpoint path under the agent base URL
const CHAT_STREAM_PATH: &str = "/api/chat/stream";

/// A fully received agent reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Reply text to speak and display
    pub text: String,

    /// Model that produced the reply, when reported
    pub model: Option<String>,

    /// Server-pre-synthesized audio; takes priority over local synthesis
    pub audio_url: Option<String>,
}

/// Message-send capability (bulk and streaming)
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Send a message and wait for the complete reply
    async fn send(&self, message: &str) -> Result<AgentReply>;

    /// Send a message and receive the reply as a live event stream
    async fn send_streaming(&self, message: &str) -> Result<BoxStream<'static, StreamEvent>>;

    /// Fetch pre-synthesized reply audio by URL
    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a str,
    session_id: &'a str,
}

/// HTTP client for the agent backend
pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    auth_token: Option<SecretString>,
}

impl AgentClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty
    pub fn new(config: &AgentConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::Config("agent base URL not set".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_id: config.session_id.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn request(&self, path: &str, message: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&SendRequest {
                message,
                session_id: &self.session_id,
            });

        if let Some(token) = &self.auth_token {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        builder
    }
}

#[async_trait]
impl AgentTransport for AgentClient {
    async fn send(&self, message: &str) -> Result<AgentReply> {
        let response = self
            .request(CHAT_PATH, message)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("agent error {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("unreadable reply body: {e}")))?;

        parse_reply(&body)
            .ok_or_else(|| Error::Transport("reply body had no recognizable text".to_string()))
    }

    async fn send_streaming(&self, message: &str) -> Result<BoxStream<'static, StreamEvent>> {
        let response = self
            .request(CHAT_STREAM_PATH, message)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Transport(format!("stream connect failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Transport(format!("agent stream error {status}")));
        }

        Ok(decode_stream(response.bytes_stream()).boxed())
    }

    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("audio fetch failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Transport(format!("audio fetch error {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Extract the reply from any of the accepted body shapes.
///
/// First matching field wins: `response`, OpenAI-style
/// `choices[0].message.content`, `text`, `message`, `content`.
fn parse_reply(body: &serde_json::Value) -> Option<AgentReply> {
    let text = body
        .get("response")
        .and_then(serde_json::Value::as_str)
        .or_else(|| {
            body.get("choices")?
                .get(0)?
                .get("message")?
                .get("content")?
                .as_str()
        })
        .or_else(|| body.get("text").and_then(serde_json::Value::as_str))
        .or_else(|| body.get("message").and_then(serde_json::Value::as_str))
        .or_else(|| body.get("content").and_then(serde_json::Value::as_str))?;

    if text.is_empty() {
        return None;
    }

    Some(AgentReply {
        text: text.to_string(),
        model: body
            .get("model")
            .and_then(serde_json::Value::as_str)
            .map(String::from),
        audio_url: body
            .get("audio_url")
            .and_then(serde_json::Value::as_str)
            .map(String::from),
    })
}
