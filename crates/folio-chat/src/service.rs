//! Chat orchestration: prompt, history, provider, error reporting.

use folio_core::{Error, FolioConfig, Result};
use folio_infer::create_embedder;
use folio_store::load_knowledge_base;
use tracing::{debug, info, warn};

use crate::config::resolve_provider;
use crate::dispatcher::{Dispatcher, Provider};
use crate::prompt::{PromptAssembler, Retrieval};
use crate::types::{recent_history, ChatMessage, FragmentSink, HistoryTurn, ProviderKind};

/// In-band fragment reporting a failure the caller could not recover from.
pub fn error_fragment(err: &Error) -> String {
    format!(
        "\n\n[Error: {}. Please check server logs for details.]",
        err
    )
}

/// System prompt, then the last few history turns, then the new message.
pub fn build_messages(system: String, history: &[HistoryTurn], message: &str) -> Vec<ChatMessage> {
    let recent = recent_history(history);
    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(recent.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(message));
    messages
}

pub struct ChatService {
    dispatcher: Dispatcher,
    prompts: PromptAssembler,
}

impl ChatService {
    pub fn new(dispatcher: Dispatcher, prompts: PromptAssembler) -> Self {
        Self {
            dispatcher,
            prompts,
        }
    }

    /// Select the provider and prepare prompts.
    ///
    /// When an embedder is available the retrieval index is loaded (or
    /// built) in the background; chats use the full prompt until it is
    /// ready. Must be called inside a tokio runtime.
    pub fn from_config(config: &FolioConfig) -> Result<Self> {
        let mut settings = resolve_provider(&config.keys)?;
        if let Some(model) = &config.chat_model {
            settings = settings.with_model(model.clone());
        }
        info!("Chat provider: {} (model={})", settings.kind, settings.model);

        let passages = load_knowledge_base();
        let prompts = PromptAssembler::new(&passages);

        if let Some(embedder) = create_embedder(&config.keys) {
            let slot = prompts.retrieval_slot();
            let dir = config.data_paths.vectors.clone();
            tokio::spawn(async move {
                let result = slot
                    .get_or_try_init(|| Retrieval::initialize(&dir, passages, embedder))
                    .await;
                match result {
                    Ok(r) => info!("Retrieval index ready ({} passages)", r.index.len()),
                    Err(e) => warn!("Retrieval index unavailable, using full knowledge base: {}", e),
                }
            });
        }

        Ok(Self::new(
            Dispatcher::new(Provider::from_settings(settings)),
            prompts,
        ))
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.dispatcher.provider().kind()
    }

    /// Answer `message`, pushing sanitized fragments into `sink`.
    ///
    /// On failure one [`error_fragment`] is pushed after whatever was
    /// already emitted, and the error is returned for logging.
    pub async fn chat(
        &self,
        message: &str,
        history: &[HistoryTurn],
        sink: &mut dyn FragmentSink,
    ) -> Result<String> {
        let system = self.prompts.system_prompt_for(message).await;
        let messages = build_messages(system, history, message);

        match self.dispatcher.dispatch(&messages, sink).await {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!("Chat with {} failed, reporting in-band", self.provider_kind());
                sink.send(error_fragment(&e));
                Err(e)
            }
        }
    }
}
