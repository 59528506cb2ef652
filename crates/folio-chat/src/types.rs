//! Chat types shared by the dispatcher, the service and the HTTP layer.

use serde::{Deserialize, Serialize};

/// Number of trailing history turns forwarded to the provider.
pub const MAX_HISTORY_TURNS: usize = 6;

/// Chat provider identifier, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// xAI, OpenAI-compatible endpoint.
    Grok,
    /// Groq, consumed as raw completion events.
    Groq,
    Mistral,
    OpenAI,
}

impl ProviderKind {
    /// First configured provider wins.
    pub const PRIORITY: [ProviderKind; 4] = [
        ProviderKind::Grok,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::OpenAI,
    ];

    pub fn env_var(self) -> &'static str {
        match self {
            ProviderKind::Grok => "GROK_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }

    pub fn convention(self) -> CallingConvention {
        match self {
            ProviderKind::Groq => CallingConvention::RawEvents,
            _ => CallingConvention::MessageStream,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Grok => write!(f, "grok"),
            ProviderKind::Groq => write!(f, "groq"),
            ProviderKind::Mistral => write!(f, "mistral"),
            ProviderKind::OpenAI => write!(f, "openai"),
        }
    }
}

/// How a provider's incremental output is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// Iterate completion events and read `choices[0].delta.content`.
    RawEvents,
    /// Iterate message chunks and read their `content`.
    MessageStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message as forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A conversation turn as supplied by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl From<&HistoryTurn> for ChatMessage {
    /// Anything that is not a user turn is replayed as the assistant.
    fn from(turn: &HistoryTurn) -> Self {
        if turn.role == "user" {
            ChatMessage::user(turn.content.clone())
        } else {
            ChatMessage::assistant(turn.content.clone())
        }
    }
}

/// The last [`MAX_HISTORY_TURNS`] turns, oldest first.
pub fn recent_history(history: &[HistoryTurn]) -> &[HistoryTurn] {
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    &history[start..]
}

/// Payload of one SSE `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentEvent {
    pub content: String,
}

/// Receives sanitized fragments in emission order.
pub trait FragmentSink: Send {
    fn send(&mut self, fragment: String);
}

impl FragmentSink for Vec<String> {
    fn send(&mut self, fragment: String) {
        self.push(fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<HistoryTurn> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { "user" } else { "assistant" };
                HistoryTurn::new(role, format!("turn {}", i))
            })
            .collect()
    }

    #[test]
    fn test_recent_history_keeps_last_six_in_order() {
        let history = turns(9);
        let recent = recent_history(&history);
        assert_eq!(recent.len(), MAX_HISTORY_TURNS);
        let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["turn 3", "turn 4", "turn 5", "turn 6", "turn 7", "turn 8"]
        );
    }

    #[test]
    fn test_recent_history_short_is_untouched() {
        let history = turns(2);
        assert_eq!(recent_history(&history).len(), 2);
        assert!(recent_history(&[]).is_empty());
    }

    #[test]
    fn test_unknown_roles_become_assistant() {
        let msg = ChatMessage::from(&HistoryTurn::new("bot", "hi"));
        assert_eq!(msg.role, Role::Assistant);
        let msg = ChatMessage::from(&HistoryTurn::new("user", "hello"));
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "be brief"}));
    }

    #[test]
    fn test_provider_conventions() {
        assert_eq!(ProviderKind::Groq.convention(), CallingConvention::RawEvents);
        assert_eq!(ProviderKind::Grok.convention(), CallingConvention::MessageStream);
        assert_eq!(ProviderKind::OpenAI.to_string(), "openai");
    }
}
