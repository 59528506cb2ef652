//! Provider dispatch: one selected provider, one fragment sequence.
//!
//! The provider and its streaming strategy are fixed when the dispatcher is
//! built. Whatever the backend does (raw completion events, message chunks,
//! or a single synchronous completion) the caller sees the same thing:
//! sanitized fragments pushed into a [`FragmentSink`] in order.

use std::pin::Pin;
use std::time::Duration;

use folio_core::{Error, Result};
use futures::Stream;
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{ProviderSettings, GROQ_FALLBACK_MODEL};
use crate::providers;
use crate::sanitize::{sanitize, ReasoningFilter};
use crate::types::{CallingConvention, ChatMessage, FragmentSink, ProviderKind};

/// Replay slices completions into pieces of this many characters.
pub const REPLAY_CHUNK_CHARS: usize = 5;
/// Pause between replayed pieces.
pub const REPLAY_DELAY: Duration = Duration::from_millis(10);

type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The active provider, tagged with how its output is obtained.
#[derive(Debug, Clone)]
pub enum Provider {
    /// Native stream read as raw completion events. A decommissioned
    /// primary model is retried once with `fallback_model`.
    RawEvents {
        settings: ProviderSettings,
        fallback_model: Option<String>,
    },
    /// Native stream read as message chunks; replayed from a synchronous
    /// completion when streaming fails before any output.
    MessageStream { settings: ProviderSettings },
    /// Synchronous completion only, replayed as a simulated stream.
    Replayed { settings: ProviderSettings },
}

impl Provider {
    pub fn from_settings(settings: ProviderSettings) -> Self {
        match (settings.kind, settings.kind.convention()) {
            (ProviderKind::Mistral, _) => Provider::Replayed { settings },
            (_, CallingConvention::RawEvents) => {
                let fallback_model = (settings.kind == ProviderKind::Groq
                    && settings.model != GROQ_FALLBACK_MODEL)
                    .then(|| GROQ_FALLBACK_MODEL.to_string());
                Provider::RawEvents {
                    settings,
                    fallback_model,
                }
            }
            (_, CallingConvention::MessageStream) => Provider::MessageStream { settings },
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        match self {
            Provider::RawEvents { settings, .. }
            | Provider::MessageStream { settings }
            | Provider::Replayed { settings } => settings,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.settings().kind
    }
}

/// A native stream that stopped early.
struct StreamFailure {
    error: Error,
    /// Whether any fragment reached the sink before the failure.
    emitted: bool,
}

impl StreamFailure {
    fn before_output(error: Error) -> Self {
        Self {
            error,
            emitted: false,
        }
    }
}

#[derive(Default)]
struct Emitted {
    text: String,
    count: usize,
}

impl Emitted {
    fn push(&mut self, piece: String, sink: &mut dyn FragmentSink) {
        if !piece.is_empty() {
            self.text.push_str(&piece);
            self.count += 1;
            sink.send(piece);
        }
    }
}

pub struct Dispatcher {
    client: Client,
    provider: Provider,
}

impl Dispatcher {
    pub fn new(provider: Provider) -> Self {
        Self {
            client: Client::new(),
            provider,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Run one completion, pushing sanitized fragments into `sink`.
    ///
    /// Returns the full sanitized text that was emitted. On error, whatever
    /// was already emitted stays emitted; fallbacks are only attempted while
    /// nothing has been.
    pub async fn dispatch(
        &self,
        messages: &[ChatMessage],
        sink: &mut dyn FragmentSink,
    ) -> Result<String> {
        match &self.provider {
            Provider::RawEvents {
                settings,
                fallback_model,
            } => {
                let first = self
                    .relay(settings, &settings.model, CallingConvention::RawEvents, messages, sink)
                    .await;
                match (first, fallback_model) {
                    (Ok(text), _) => Ok(text),
                    (Err(failure), Some(fallback))
                        if !failure.emitted && failure.error.is_model_decommissioned() =>
                    {
                        warn!(
                            "Model {} is decommissioned, retrying with {}",
                            settings.model, fallback
                        );
                        self.relay(settings, fallback, CallingConvention::RawEvents, messages, sink)
                            .await
                            .map_err(|f| f.error)
                    }
                    (Err(failure), _) => Err(failure.error),
                }
            }
            Provider::MessageStream { settings } => {
                let streamed = self
                    .relay(
                        settings,
                        &settings.model,
                        CallingConvention::MessageStream,
                        messages,
                        sink,
                    )
                    .await;
                match streamed {
                    Ok(text) => Ok(text),
                    Err(failure) if !failure.emitted => {
                        warn!(
                            "Streaming from {} failed ({}), falling back to a single completion",
                            settings.kind, failure.error
                        );
                        self.replay_completion(settings, messages, sink).await
                    }
                    Err(failure) => Err(failure.error),
                }
            }
            Provider::Replayed { settings } => {
                self.replay_completion(settings, messages, sink).await
            }
        }
    }

    async fn fragments(
        &self,
        settings: &ProviderSettings,
        model: &str,
        convention: CallingConvention,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream> {
        let stream: FragmentStream = match convention {
            CallingConvention::RawEvents => {
                let events =
                    providers::stream_events(&self.client, settings, model, messages).await?;
                Box::pin(events.filter_map(|event| match event {
                    Ok(chunk) => chunk.delta_content().map(|c| Ok(c.to_string())),
                    Err(e) => Some(Err(e)),
                }))
            }
            CallingConvention::MessageStream => {
                let chunks =
                    providers::stream_messages(&self.client, settings, model, messages).await?;
                Box::pin(chunks.map(|chunk| chunk.map(|c| c.content)))
            }
        };
        Ok(stream)
    }

    /// Forward a native stream through the reasoning filter.
    async fn relay(
        &self,
        settings: &ProviderSettings,
        model: &str,
        convention: CallingConvention,
        messages: &[ChatMessage],
        sink: &mut dyn FragmentSink,
    ) -> std::result::Result<String, StreamFailure> {
        let mut fragments = self
            .fragments(settings, model, convention, messages)
            .await
            .map_err(StreamFailure::before_output)?;
        info!("Streaming from {} (model={})", settings.kind, model);

        let mut filter = ReasoningFilter::new();
        let mut out = Emitted::default();

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(raw) => out.push(filter.push(&raw), sink),
                Err(error) => {
                    if out.count == 0 {
                        return Err(StreamFailure::before_output(error));
                    }
                    out.push(filter.finish(), sink);
                    return Err(StreamFailure {
                        error,
                        emitted: true,
                    });
                }
            }
        }
        out.push(filter.finish(), sink);
        debug!("Stream from {} finished after {} fragments", settings.kind, out.count);
        Ok(out.text)
    }

    async fn replay_completion(
        &self,
        settings: &ProviderSettings,
        messages: &[ChatMessage],
        sink: &mut dyn FragmentSink,
    ) -> Result<String> {
        let text = providers::complete(&self.client, settings, &settings.model, messages).await?;
        info!("Replaying completion from {} (model={})", settings.kind, settings.model);
        Ok(replay(&text, sink).await)
    }
}

/// Simulated streaming: sanitize `text`, then emit it in
/// [`REPLAY_CHUNK_CHARS`]-character pieces spaced by [`REPLAY_DELAY`].
///
/// Returns the sanitized text; the emitted pieces concatenate to it exactly.
pub async fn replay(text: &str, sink: &mut dyn FragmentSink) -> String {
    let clean = sanitize(text);
    let chars: Vec<char> = clean.chars().collect();
    for (i, piece) in chars.chunks(REPLAY_CHUNK_CHARS).enumerate() {
        if i > 0 {
            tokio::time::sleep(REPLAY_DELAY).await;
        }
        sink.send(piece.iter().collect());
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_upstream::{completion, delta, spawn, Reply};
    use serde_json::json;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("be brief"), ChatMessage::user("Hi")]
    }

    fn dispatcher(kind: ProviderKind, base: &str) -> Dispatcher {
        let settings = ProviderSettings::for_kind(kind, "test-key").with_base_url(base);
        Dispatcher::new(Provider::from_settings(settings))
    }

    fn decommissioned() -> Reply {
        Reply::json(
            400,
            json!({"error": {"message": "The model `qwen/qwen3-32b` has been decommissioned", "code": "model_decommissioned"}}),
        )
    }

    #[test]
    fn test_strategy_per_provider() {
        let p = |kind| Provider::from_settings(ProviderSettings::for_kind(kind, "k"));
        assert!(matches!(
            p(ProviderKind::Groq),
            Provider::RawEvents { fallback_model: Some(ref m), .. } if m == GROQ_FALLBACK_MODEL
        ));
        assert!(matches!(p(ProviderKind::Grok), Provider::MessageStream { .. }));
        assert!(matches!(p(ProviderKind::OpenAI), Provider::MessageStream { .. }));
        assert!(matches!(p(ProviderKind::Mistral), Provider::Replayed { .. }));

        let already_fallback = ProviderSettings::for_kind(ProviderKind::Groq, "k")
            .with_model(GROQ_FALLBACK_MODEL);
        assert!(matches!(
            Provider::from_settings(already_fallback),
            Provider::RawEvents { fallback_model: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_raw_events_are_sanitized_fragments() {
        let upstream = spawn(vec![Reply::sse(&[
            "<think>user wants",
            " a summary</think>",
            "**KYARA** is ",
            "an HR consultant.",
        ])])
        .await;
        let d = dispatcher(ProviderKind::Groq, &upstream.base_url);

        let mut sink = Vec::new();
        let text = d.dispatch(&messages(), &mut sink).await.unwrap();
        assert_eq!(sink, vec!["KYARA is ", "an HR consultant."]);
        assert_eq!(text, "KYARA is an HR consultant.");
    }

    #[tokio::test]
    async fn test_decommissioned_model_retries_once_with_fallback() {
        let upstream = spawn(vec![decommissioned(), Reply::sse(&["Fallback ", "answer"])]).await;
        let d = dispatcher(ProviderKind::Groq, &upstream.base_url);

        let mut sink = Vec::new();
        let text = d.dispatch(&messages(), &mut sink).await.unwrap();
        assert_eq!(text, "Fallback answer");
        assert_eq!(upstream.request_count(), 2);
        assert_eq!(upstream.request(0)["model"], "qwen/qwen3-32b");
        assert_eq!(upstream.request(1)["model"], GROQ_FALLBACK_MODEL);
    }

    #[tokio::test]
    async fn test_fallback_model_failure_is_surfaced() {
        let upstream = spawn(vec![decommissioned(), decommissioned()]).await;
        let d = dispatcher(ProviderKind::Groq, &upstream.base_url);

        let mut sink = Vec::new();
        let err = d.dispatch(&messages(), &mut sink).await.unwrap_err();
        assert!(err.is_model_decommissioned());
        assert!(sink.is_empty());
        assert_eq!(upstream.request_count(), 2);
    }

    #[tokio::test]
    async fn test_other_groq_errors_are_not_retried() {
        let upstream = spawn(vec![Reply::json(
            401,
            json!({"error": {"message": "Invalid API Key", "code": "invalid_api_key"}}),
        )])
        .await;
        let d = dispatcher(ProviderKind::Groq, &upstream.base_url);

        let mut sink = Vec::new();
        let err = d.dispatch(&messages(), &mut sink).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid API Key");
        assert_eq!(upstream.request_count(), 1);
    }

    #[tokio::test]
    async fn test_message_stream_native() {
        let upstream = spawn(vec![Reply::sse(&["Manish leads ", "the team."])]).await;
        let d = dispatcher(ProviderKind::Grok, &upstream.base_url);

        let mut sink = Vec::new();
        let text = d.dispatch(&messages(), &mut sink).await.unwrap();
        assert_eq!(sink, vec!["Manish leads ", "the team."]);
        assert_eq!(text, "Manish leads the team.");
        assert_eq!(upstream.request(0)["model"], "grok-beta");
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_stream_failure_replays_completion() {
        let upstream = spawn(vec![
            Reply::json(500, json!({"error": {"message": "stream unavailable"}})),
            Reply::json(200, completion("Cloud work on **AWS**.")),
        ])
        .await;
        let d = dispatcher(ProviderKind::OpenAI, &upstream.base_url);

        let mut sink = Vec::new();
        let text = d.dispatch(&messages(), &mut sink).await.unwrap();
        assert_eq!(text, "Cloud work on AWS.");
        assert_eq!(sink, vec!["Cloud", " work", " on A", "WS."]);
        assert_eq!(upstream.request(0)["stream"], true);
        assert_eq!(upstream.request(1)["stream"], false);
    }

    #[tokio::test]
    async fn test_failure_after_output_is_not_replayed() {
        let upstream = spawn(vec![Reply::Sse(vec![
            delta("Half an "),
            json!({"error": {"message": "connection reset"}}).to_string(),
        ])])
        .await;
        let d = dispatcher(ProviderKind::OpenAI, &upstream.base_url);

        let mut sink = Vec::new();
        let err = d.dispatch(&messages(), &mut sink).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(sink, vec!["Half an "]);
        assert_eq!(upstream.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mistral_is_replayed() {
        let upstream = spawn(vec![Reply::json(
            200,
            completion("<think>hm</think>Hello there, friend"),
        )])
        .await;
        let d = dispatcher(ProviderKind::Mistral, &upstream.base_url);

        let mut sink = Vec::new();
        let text = d.dispatch(&messages(), &mut sink).await.unwrap();
        assert_eq!(text, "Hello there, friend");
        assert_eq!(sink, vec!["Hello", " ther", "e, fr", "iend"]);
        assert_eq!(upstream.request(0)["model"], "mistral-medium-latest");
        assert_eq!(upstream.request(0)["stream"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_pieces_reassemble_exactly() {
        let text = "Ünïcödé aware: KYARA → HR, surveys ✓";
        let mut sink = Vec::new();
        let start = tokio::time::Instant::now();
        let clean = replay(text, &mut sink).await;

        assert_eq!(clean, text);
        assert_eq!(sink.concat(), clean);
        assert!(sink.iter().all(|p| p.chars().count() <= REPLAY_CHUNK_CHARS));
        assert!(sink[..sink.len() - 1]
            .iter()
            .all(|p| p.chars().count() == REPLAY_CHUNK_CHARS));
        assert!(start.elapsed() >= REPLAY_DELAY * (sink.len() as u32 - 1));
    }

    #[tokio::test]
    async fn test_replay_of_empty_text_emits_nothing() {
        let mut sink = Vec::new();
        assert_eq!(replay("", &mut sink).await, "");
        assert!(sink.is_empty());
    }
}
