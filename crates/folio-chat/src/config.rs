//! Provider catalogue and credential-based selection.

use folio_core::{Error, ProviderKeys, Result};

use crate::types::ProviderKind;

pub const GROK_BASE_URL: &str = "https://api.x.ai/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_GROK_MODEL: &str = "grok-beta";
pub const DEFAULT_GROQ_MODEL: &str = "qwen/qwen3-32b";
/// Used once when the primary Groq model has been decommissioned.
pub const GROQ_FALLBACK_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-medium-latest";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Everything needed to call one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

impl ProviderSettings {
    /// Catalogue defaults for `kind`.
    pub fn for_kind(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        let (base_url, model) = match kind {
            ProviderKind::Grok => (GROK_BASE_URL, DEFAULT_GROK_MODEL),
            ProviderKind::Groq => (GROQ_BASE_URL, DEFAULT_GROQ_MODEL),
            ProviderKind::Mistral => (MISTRAL_BASE_URL, DEFAULT_MISTRAL_MODEL),
            ProviderKind::OpenAI => (OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL),
        };
        let (max_tokens, top_p) = match kind {
            ProviderKind::Groq => (Some(4096), Some(0.95)),
            _ => (None, None),
        };

        Self {
            kind,
            api_key: api_key.into(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens,
            top_p,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn key_for(keys: &ProviderKeys, kind: ProviderKind) -> Option<&str> {
    match kind {
        ProviderKind::Grok => keys.grok_api_key.as_deref(),
        ProviderKind::Groq => keys.groq_api_key.as_deref(),
        ProviderKind::Mistral => keys.mistral_api_key.as_deref(),
        ProviderKind::OpenAI => keys.openai_api_key.as_deref(),
    }
}

/// Pick the highest-priority provider that has a credential.
pub fn resolve_provider(keys: &ProviderKeys) -> Result<ProviderSettings> {
    ProviderKind::PRIORITY
        .iter()
        .find_map(|&kind| key_for(keys, kind).map(|key| ProviderSettings::for_kind(kind, key)))
        .ok_or_else(|| {
            let vars: Vec<&str> = ProviderKind::PRIORITY.iter().map(|k| k.env_var()).collect();
            Error::Config(format!(
                "No API key found. Please set one of {} in the environment",
                vars.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(grok: bool, groq: bool, mistral: bool, openai: bool) -> ProviderKeys {
        let k = |on: bool, v: &str| on.then(|| v.to_string());
        ProviderKeys {
            grok_api_key: k(grok, "xai-key"),
            groq_api_key: k(groq, "gsk-key"),
            mistral_api_key: k(mistral, "mistral-key"),
            openai_api_key: k(openai, "sk-key"),
        }
    }

    #[test]
    fn test_no_keys_is_config_error() {
        let err = resolve_provider(&keys(false, false, false, false)).unwrap_err();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("GROK_API_KEY"));
                assert!(msg.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_grok_beats_groq() {
        let settings = resolve_provider(&keys(true, true, false, false)).unwrap();
        assert_eq!(settings.kind, ProviderKind::Grok);
        assert_eq!(settings.api_key, "xai-key");
        assert_eq!(settings.base_url, GROK_BASE_URL);
    }

    #[test]
    fn test_mistral_beats_openai() {
        let settings = resolve_provider(&keys(false, false, true, true)).unwrap();
        assert_eq!(settings.kind, ProviderKind::Mistral);
        assert_eq!(settings.model, DEFAULT_MISTRAL_MODEL);
    }

    #[test]
    fn test_each_key_alone_selects_its_provider() {
        let cases = [
            (keys(true, false, false, false), ProviderKind::Grok),
            (keys(false, true, false, false), ProviderKind::Groq),
            (keys(false, false, true, false), ProviderKind::Mistral),
            (keys(false, false, false, true), ProviderKind::OpenAI),
        ];
        for (k, expected) in cases {
            assert_eq!(resolve_provider(&k).unwrap().kind, expected);
        }
    }

    #[test]
    fn test_groq_sampling_defaults() {
        let settings = ProviderSettings::for_kind(ProviderKind::Groq, "gsk");
        assert_eq!(settings.model, DEFAULT_GROQ_MODEL);
        assert_eq!(settings.max_tokens, Some(4096));
        assert_eq!(settings.top_p, Some(0.95));

        let settings = ProviderSettings::for_kind(ProviderKind::OpenAI, "sk")
            .with_base_url("http://127.0.0.1:9/v1/")
            .with_model("gpt-4o-mini");
        assert_eq!(settings.base_url, "http://127.0.0.1:9/v1");
        assert_eq!(settings.model, "gpt-4o-mini");
        assert!(settings.max_tokens.is_none());
    }
}
