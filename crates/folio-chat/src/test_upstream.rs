//! Scripted in-process stand-in for an OpenAI-compatible provider.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// What the upstream answers to one `chat/completions` call.
pub enum Reply {
    /// SSE body: each payload as a `data:` event, then `[DONE]`.
    Sse(Vec<String>),
    /// Raw body bytes sent as separate network chunks.
    Chunks(Vec<Vec<u8>>),
    Json(u16, Value),
}

impl Reply {
    pub fn sse(contents: &[&str]) -> Self {
        Reply::Sse(contents.iter().map(|c| delta(c)).collect())
    }

    pub fn json(status: u16, body: Value) -> Self {
        Reply::Json(status, body)
    }
}

/// A streaming delta event carrying `content`.
pub fn delta(content: &str) -> String {
    json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    })
    .to_string()
}

/// A non-streaming completion body.
pub fn completion(content: &str) -> Value {
    json!({
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
}

#[derive(Clone, Default)]
struct Script {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

pub struct FakeUpstream {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeUpstream {
    /// Body of the `n`th request received.
    pub fn request(&self, n: usize) -> Value {
        self.requests.lock()[n].clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

async fn completions(State(script): State<Script>, Json(body): Json<Value>) -> Response {
    script.requests.lock().push(body);
    let reply = script.replies.lock().pop_front();

    match reply {
        Some(Reply::Sse(events)) => {
            let mut payload: String = events
                .iter()
                .map(|e| format!("data: {}\n\n", e))
                .collect();
            payload.push_str("data: [DONE]\n\n");
            ([(header::CONTENT_TYPE, "text/event-stream")], payload).into_response()
        }
        Some(Reply::Chunks(chunks)) => {
            let stream = futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Some(Reply::Json(status, value)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(value)).into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "unexpected request"}})),
        )
            .into_response(),
    }
}

/// Serve `replies` in order on an ephemeral local port.
pub async fn spawn(replies: Vec<Reply>) -> FakeUpstream {
    let script = Script {
        replies: Arc::new(Mutex::new(replies.into())),
        requests: Arc::default(),
    };
    let requests = script.requests.clone();

    let app = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(script);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeUpstream {
        base_url: format!("http://{}", addr),
        requests,
    }
}
