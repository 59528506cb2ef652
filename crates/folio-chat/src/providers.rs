//! OpenAI-compatible `chat/completions` client shared by every provider.
//!
//! Grok, Groq, Mistral and OpenAI all accept the same request body and
//! stream the same SSE event format; only base URL, model and sampling
//! parameters differ (see [`ProviderSettings`]).

use std::pin::Pin;

use folio_core::{Error, Result};
use futures::Stream;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::ProviderSettings;
use crate::types::ChatMessage;

/// Completion events as delivered by a streaming request.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// Message chunks carrying only the generated text.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<MessageChunk>> + Send>>;

/// One `chat.completion.chunk` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// `choices[0].delta.content`, if present.
    pub fn delta_content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    pub content: String,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

fn request_body(
    settings: &ProviderSettings,
    model: &str,
    messages: &[ChatMessage],
    stream: bool,
) -> serde_json::Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": settings.temperature,
        "stream": stream,
    });
    if let Some(max_tokens) = settings.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(top_p) = settings.top_p {
        body["top_p"] = json!(top_p);
    }
    body
}

async fn send(
    client: &Client,
    settings: &ProviderSettings,
    model: &str,
    messages: &[ChatMessage],
    stream: bool,
) -> Result<Response> {
    let url = format!("{}/chat/completions", settings.base_url);
    debug!(
        "POST {} (provider={}, model={}, stream={})",
        url, settings.kind, model, stream
    );

    let response = client
        .post(&url)
        .bearer_auth(&settings.api_key)
        .json(&request_body(settings, model, messages, stream))
        .send()
        .await
        .map_err(|e| Error::Http(format!("Request to {} failed: {}", settings.kind, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::from_api_response(status.as_u16(), &body));
    }
    Ok(response)
}

/// Interpret one SSE line. `None` means the line carries no event.
fn parse_line(line: &str) -> Option<Result<Option<CompletionChunk>>> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(Ok(None));
    }
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            debug!("Skipping malformed stream event: {}", e);
            return None;
        }
    };
    if let Some(err) = value.get("error") {
        let message = err["message"]
            .as_str()
            .or_else(|| err.as_str())
            .unwrap_or("Unknown stream error");
        return Some(Err(Error::Provider {
            status: None,
            code: err["code"].as_str().map(|c| c.to_string()),
            message: message.to_string(),
        }));
    }
    match serde_json::from_value(value) {
        Ok(chunk) => Some(Ok(Some(chunk))),
        Err(e) => {
            debug!("Skipping unrecognized stream event: {}", e);
            None
        }
    }
}

/// Start a streaming completion and yield its events.
///
/// The HTTP status is checked before this returns, so request-level
/// failures (bad key, retired model) surface here rather than mid-stream.
pub async fn stream_events(
    client: &Client,
    settings: &ProviderSettings,
    model: &str,
    messages: &[ChatMessage],
) -> Result<EventStream> {
    let response = send(client, settings, model, messages, true).await?;

    let events: EventStream = Box::pin(async_stream::stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(Error::Http(format!("Stream read error: {}", e)));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            // Split on complete lines only; a multi-byte character may straddle chunks.
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                let line = line.trim();
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                match parse_line(line) {
                    Some(Ok(Some(event))) => {
                        yield Ok(event);
                    }
                    Some(Ok(None)) => return,
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => {}
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        match parse_line(&rest) {
            Some(Ok(Some(event))) => {
                yield Ok(event);
            }
            Some(Err(e)) => {
                yield Err(e);
            }
            _ => {}
        }
    });
    Ok(events)
}

/// Start a streaming completion and yield only the text of each message chunk.
pub async fn stream_messages(
    client: &Client,
    settings: &ProviderSettings,
    model: &str,
    messages: &[ChatMessage],
) -> Result<MessageStream> {
    let events = stream_events(client, settings, model, messages).await?;
    let chunks: MessageStream = Box::pin(events.filter_map(|event| match event {
        Ok(chunk) => chunk
            .delta_content()
            .filter(|c| !c.is_empty())
            .map(|c| {
                Ok(MessageChunk {
                    content: c.to_string(),
                })
            }),
        Err(e) => Some(Err(e)),
    }));
    Ok(chunks)
}

/// Single non-streaming completion; returns `choices[0].message.content`.
pub async fn complete(
    client: &Client,
    settings: &ProviderSettings,
    model: &str,
    messages: &[ChatMessage],
) -> Result<String> {
    let response = send(client, settings, model, messages, false).await?;
    let completion: Completion = response
        .json()
        .await
        .map_err(|e| Error::provider(format!("Malformed completion response: {}", e)))?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| Error::provider("Completion response had no choices"))
}
