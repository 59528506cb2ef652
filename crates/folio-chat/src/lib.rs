//! Portfolio chat with external LLM streaming (Grok/Groq/Mistral/OpenAI).
//!
//! Exactly one provider is selected from the configured credentials. Its
//! output is normalized into sanitized text fragments regardless of how the
//! backend streams (or does not stream) its completions.

pub mod config;
pub mod dispatcher;
pub mod prompt;
pub mod providers;
pub mod sanitize;
pub mod service;
pub mod types;

#[cfg(test)]
mod test_upstream;

pub use config::{resolve_provider, ProviderSettings};
pub use dispatcher::{Dispatcher, Provider};
pub use prompt::{PromptAssembler, Retrieval};
pub use sanitize::{sanitize, ReasoningFilter};
pub use service::ChatService;
pub use types::*;
