use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm_manager::{ChatMessage, LLMProvider};

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    choices: Vec<OllamaChoice>,
}

#[derive(Debug, Deserialize)]
struct OllamaChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: OllamaErrorDetails,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Ollama local LLM provider implementation
pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: Client,
    temperature: f32,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default settings
    pub fn new(model: Option<String>, temperature: Option<f32>, base_url: Option<String>) -> Self {
        Self {
            model: model.unwrap_or_else(|| "llama3.2".to_string()),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: Client::new(),
            temperature: temperature.unwrap_or(0.2),
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_messages(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            if let Ok(error_response) = serde_json::from_str::<OllamaError>(&response_text) {
                return Err(anyhow!(
                    "Ollama API error: {} (type: {:?})",
                    error_response.error.message,
                    error_response.error.error_type
                ));
            }
            return Err(anyhow!(
                "Ollama API error (status {}): {}",
                status,
                response_text
            ));
        }

        let api_response: OllamaResponse = serde_json::from_str(&response_text)
            .context("Failed to parse Ollama API response")?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in Ollama response"))?;

        match choice.finish_reason.as_deref() {
            Some("length") => warn!("Ollama response was truncated. Response may be incomplete."),
            Some("stop") | None => {}
            Some(other) => warn!("Ollama response finished with reason: {}", other),
        }

        Ok(choice.message.content)
    }
}
