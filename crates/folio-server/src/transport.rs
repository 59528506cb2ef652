//! SSE framing for chat fragments.
//!
//! Fragments travel over an unbounded channel from the chat task to the
//! response body. Each becomes `data: {"content": ...}`; the stream ends
//! with `data: [DONE]`. Once the client is gone the receiver is dropped and
//! sends silently do nothing.

use std::convert::Infallible;

use axum::http::header::{HeaderName, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use folio_chat::{ContentEvent, FragmentSink};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Terminal sentinel payload.
pub const DONE: &str = "[DONE]";

/// Writing half of a chat event stream.
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink {
    /// Send the sentinel and close the stream. Later calls do nothing.
    pub fn finish(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Event::default().data(DONE));
        }
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_none()
    }
}

impl FragmentSink for EventSink {
    fn send(&mut self, fragment: String) {
        let Some(tx) = &self.tx else {
            return;
        };
        match Event::default().json_data(ContentEvent { content: fragment }) {
            // A closed receiver means the client disconnected.
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!("Dropping unencodable fragment: {}", e),
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Reading half, ready to be returned from a handler.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    fn into_stream(self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        UnboundedReceiverStream::new(self.rx).map(Ok)
    }
}

impl IntoResponse for EventStream {
    fn into_response(self) -> Response {
        let mut response = Sse::new(self.into_stream()).into_response();
        let headers = response.headers_mut();
        headers.insert(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
        response
    }
}

pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, EventStream { rx })
}
