//! Streaming chat endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use folio_chat::HistoryTurn;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::state::AppState;
use crate::transport;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/api/chat", post(chat))
}

/// A validated chat request.
#[derive(Debug)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryTurn>,
}

impl ChatRequest {
    /// `None` unless the body is JSON with a non-empty string `message`.
    /// A malformed `history` is dropped rather than rejected.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())?
            .to_string();

        let history = match value.get("history") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                warn!("Ignoring malformed chat history: {}", e);
                Vec::new()
            }),
        };

        Some(Self { message, history })
    }
}

fn preview(message: &str) -> String {
    message.chars().take(50).collect()
}

/// POST /chat. Answers as a server-sent event stream.
async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(req) = ChatRequest::parse(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        )
            .into_response();
    };

    let service = match state.chat_service().await {
        Ok(service) => service,
        Err(e) => {
            error!("Chat service unavailable: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Chat service unavailable",
                    "details": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    debug!(
        "Chat request: {:?}... (history={})",
        preview(&req.message),
        req.history.len()
    );

    let (mut sink, stream) = transport::channel();
    tokio::spawn(async move {
        if let Err(e) = service.chat(&req.message, &req.history, &mut sink).await {
            error!("Chat via {} failed: {}", service.provider_kind(), e);
        }
        sink.finish();
    });

    stream.into_response()
}
