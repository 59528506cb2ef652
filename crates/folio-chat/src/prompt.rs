//! System prompt assembly with optional retrieval.

use std::path::Path;
use std::sync::Arc;

use folio_core::Result;
use folio_infer::EmbedderBackend;
use folio_store::{Passage, RetrievalIndex, OWNER_NAME};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Passages retrieved per message when the index is ready.
pub const RETRIEVAL_TOP_K: usize = 3;

fn render(knowledge: &str) -> String {
    format!(
        "You are a friendly, interactive assistant for {owner}'s developer portfolio. \
You answer questions about his projects, skills, experience and achievements using the knowledge below.

KNOWLEDGE BASE:
{knowledge}

Rules:
- Only answer questions about {owner}'s projects, skills, experience and achievements. If the knowledge base does not cover a question, say so politely.
- Keep every answer to at most two sentences unless the user explicitly asks for detail.
- End every answer with one short follow-up question about {owner}'s work, for example \"Want to know more about KYARA's AI capabilities?\" or \"Curious about his tech stack?\".
- Give only the final answer. Never output reasoning or internal thoughts, and never use tags such as <think>, <thinking> or <reasoning>.
- Write plain text without markdown formatting.",
        owner = OWNER_NAME,
        knowledge = knowledge,
    )
}

fn fallback_prompt() -> String {
    format!(
        "You are a friendly, interactive assistant for {owner}'s developer portfolio. \
{owner} is a Tech Lead, AI/ML Engineer and Cloud Architect with 6+ years of experience, \
known for KYARA (an AI HR consultant), enterprise platforms and cloud migrations.
Answer questions about his experience, skills and projects in at most two sentences unless the user asks for detail.
End every answer with a short follow-up question about his work.
Never output reasoning or internal thoughts, and never use tags such as <think>.",
        owner = OWNER_NAME,
    )
}

fn join_passages<'a>(contents: impl Iterator<Item = &'a str>) -> String {
    contents.collect::<Vec<_>>().join("\n\n")
}

/// A loaded index and the embedder that queries it.
pub struct Retrieval {
    pub index: RetrievalIndex,
    pub embedder: Arc<dyn EmbedderBackend>,
}

impl Retrieval {
    /// Load the persisted index under `dir`, or build and persist it.
    pub async fn initialize(
        dir: &Path,
        passages: Vec<Passage>,
        embedder: Arc<dyn EmbedderBackend>,
    ) -> Result<Self> {
        let index = RetrievalIndex::load_or_build(dir, passages, embedder.as_ref()).await?;
        Ok(Self { index, embedder })
    }

    /// Joined text of the top passages for `message`.
    pub async fn context_for(&self, message: &str) -> Result<String> {
        let hits = self
            .index
            .query(self.embedder.as_ref(), message, RETRIEVAL_TOP_K)
            .await?;
        Ok(join_passages(hits.iter().map(|h| h.passage.content.as_str())))
    }
}

/// Builds the system prompt for each message.
///
/// The full-knowledge prompt is rendered once. Once the retrieval slot is
/// filled, prompts carry only the passages closest to the message; until
/// then, or if a query fails, the full prompt is used.
#[derive(Clone)]
pub struct PromptAssembler {
    full_prompt: Arc<str>,
    retrieval: Arc<OnceCell<Retrieval>>,
}

impl PromptAssembler {
    pub fn new(passages: &[Passage]) -> Self {
        let full_prompt = if passages.is_empty() {
            warn!("Knowledge base is empty, using the fallback system prompt");
            fallback_prompt()
        } else {
            render(&join_passages(passages.iter().map(|p| p.content.as_str())))
        };
        Self {
            full_prompt: full_prompt.into(),
            retrieval: Arc::new(OnceCell::new()),
        }
    }

    /// Use an already-initialized retrieval index.
    pub fn with_retrieval(self, retrieval: Retrieval) -> Self {
        Self {
            retrieval: Arc::new(OnceCell::new_with(Some(retrieval))),
            ..self
        }
    }

    /// The slot a background task fills once the index is ready.
    pub fn retrieval_slot(&self) -> Arc<OnceCell<Retrieval>> {
        self.retrieval.clone()
    }

    /// The prompt used when retrieval is unavailable.
    pub fn cached_prompt(&self) -> &str {
        &self.full_prompt
    }

    pub async fn system_prompt_for(&self, message: &str) -> String {
        let Some(retrieval) = self.retrieval.get() else {
            return self.full_prompt.to_string();
        };
        match retrieval.context_for(message).await {
            Ok(context) if !context.is_empty() => {
                debug!("Using retrieved context ({} chars)", context.len());
                render(&context)
            }
            Ok(_) => self.full_prompt.to_string(),
            Err(e) => {
                warn!("Retrieval failed, using full knowledge base: {}", e);
                self.full_prompt.to_string()
            }
        }
    }
}
