//! Provider selection — maps a model name to `(api_base, api_key)`.
//!
//! No inheritance hierarchy: every supported backend speaks the same
//! OpenAI-compatible protocol, so selection is a lookup over static specs.
//! A spec matches when one of its keywords appears in the model name and
//! the user has configured that provider (or the spec allows running
//! without a key, as local servers do).

use std::collections::HashMap;

use tinyclaw_core::config::ProviderConfig;

/// Static description of one provider backend.
#[derive(Debug)]
pub struct ProviderSpec {
    /// Config key (e.g. `"openai"`).
    pub name: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Substrings of model names this provider serves.
    pub keywords: &'static [&'static str],
    /// Default API base when the config doesn't override it.
    pub default_api_base: Option<&'static str>,
    /// Whether an empty API key is acceptable (local endpoints).
    pub key_optional: bool,
}

/// All supported providers, in matching priority order.
pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        keywords: &["openrouter/", "anthropic/", "meta-llama/", "mistralai/"],
        default_api_base: Some("https://openrouter.ai/api/v1"),
        key_optional: false,
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        keywords: &["deepseek"],
        default_api_base: Some("https://api.deepseek.com/v1"),
        key_optional: false,
    },
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        keywords: &["groq/", "llama-", "qwen"],
        default_api_base: Some("https://api.groq.com/openai/v1"),
        key_optional: false,
    },
    ProviderSpec {
        name: "zhipu",
        display_name: "ZhiPu",
        keywords: &["glm"],
        default_api_base: Some("https://open.bigmodel.cn/api/paas/v4"),
        key_optional: false,
    },
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        keywords: &["gpt-", "o1", "o3", "chatgpt"],
        default_api_base: Some("https://api.openai.com/v1"),
        key_optional: false,
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama",
        keywords: &["ollama/"],
        default_api_base: Some("http://localhost:11434/v1"),
        key_optional: true,
    },
];

/// Look up a spec by its config name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name == name)
}

/// Match a model name to a configured provider.
///
/// Returns the first spec whose keyword matches and whose config carries a
/// usable key (or needs none). Falls back to any configured provider so a
/// single-key setup serves unknown model names through that gateway.
pub fn match_provider<'a>(
    model: &str,
    providers: &'a HashMap<String, ProviderConfig>,
) -> Option<(&'a ProviderConfig, &'static ProviderSpec)> {
    let lower = model.to_lowercase();

    for spec in PROVIDERS {
        if !spec.keywords.iter().any(|kw| lower.contains(kw)) {
            continue;
        }
        if let Some(config) = providers.get(spec.name) {
            if !config.api_key.is_empty() || spec.key_optional {
                return Some((config, spec));
            }
        }
        if spec.key_optional {
            // Local endpoints work with no config entry at all.
            static EMPTY: ProviderConfig = ProviderConfig {
                api_key: String::new(),
                api_base: None,
            };
            return Some((&EMPTY, spec));
        }
    }

    // Fallback: any configured provider, spec resolved by name.
    for spec in PROVIDERS {
        if let Some(config) = providers.get(spec.name) {
            if !config.api_key.is_empty() || spec.key_optional {
                return Some((config, spec));
            }
        }
    }

    None
}

/// Strip a provider routing prefix (`ollama/llama3` → `llama3`).
pub fn resolve_model_name(model: &str, spec: &ProviderSpec) -> String {
    let prefix = format!("{}/", spec.name);
    model
        .strip_prefix(&prefix)
        .map(|m| m.to_string())
        .unwrap_or_else(|| model.to_string())
}

/// Whether this model family rejects `max_tokens` in favor of
/// `max_completion_tokens`.
pub fn uses_completion_tokens_field(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("glm") || lower.contains("o1")
}
