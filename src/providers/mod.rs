pub mod gemini;
pub mod ollama;

use crate::config::LLMConfig;
use crate::error::AssistantError;
use crate::llm_manager::{LLMProvider, LocalProvider};

use gemini::GeminiProvider;
use ollama::OllamaProvider;

/// Construct the provider selected in `config`.
pub fn build(config: &LLMConfig) -> Result<Box<dyn LLMProvider>, AssistantError> {
    match config.provider.to_lowercase().as_str() {
        "gemini" => {
            let settings = config.gemini.clone().unwrap_or_default();
            let provider =
                GeminiProvider::new(settings.model, settings.temperature, settings.base_url)
                    .map_err(|e| AssistantError::Config(format!("{:#}", e)))?;
            Ok(Box::new(provider))
        }
        "ollama" => {
            let settings = config.ollama.clone().unwrap_or_default();
            Ok(Box::new(OllamaProvider::new(
                settings.model,
                settings.temperature,
                settings.base_url,
            )))
        }
        "local" => Ok(Box::new(LocalProvider)),
        other => Err(AssistantError::Config(format!(
            "unknown provider '{}' (expected gemini, ollama or local)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_local_and_ollama() {
        let mut config = LLMConfig::default();
        config.provider = "local".to_string();
        assert_eq!(build(&config).unwrap().name(), "local");

        config.provider = "Ollama".to_string();
        assert_eq!(build(&config).unwrap().name(), "Ollama");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut config = LLMConfig::default();
        config.provider = "clippy".to_string();
        assert!(matches!(build(&config), Err(AssistantError::Config(_))));
    }
}
