//! Provider selection: builds the configured capability backend.

use std::sync::Arc;
use std::time::Duration;
use sessionloom_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider described by the configuration.
///
/// Every supported backend speaks the OpenAI-compatible wire format; the
/// provider name only selects the default base URL.
pub fn build_from_config(config: &sessionloom_config::AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    tracing::debug!(provider = %config.provider, base_url = %base_url, "Building provider");

    Arc::new(OpenAiCompatProvider::with_timeout(
        config.provider.clone(),
        base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    ))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = sessionloom_config::AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn api_url_override_is_respected() {
        let config = sessionloom_config::AppConfig {
            provider: "custom".into(),
            api_url: Some("http://localhost:9999/v1".into()),
            ..sessionloom_config::AppConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "custom");
    }
}
