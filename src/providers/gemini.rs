use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;

use crate::llm_manager::{ChatMessage, LLMProvider};

/// Gemini API provider, talking to the OpenAI compatible endpoint
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetails {
    message: String,
    status: Option<String>,
    code: Option<u16>,
}

impl GeminiProvider {
    /// Create a new Gemini provider. The key comes from `GEMINI_API_KEY` or `API_KEY`.
    pub fn new(
        model: Option<String>,
        temperature: Option<f32>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .context("GEMINI_API_KEY environment variable not set")?;
        Ok(Self::with_config(api_key, model, temperature, base_url))
    }

    pub fn with_config(
        api_key: String,
        model: Option<String>,
        temperature: Option<f32>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            base_url: base_url.unwrap_or_else(|| {
                "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
            }),
            client: reqwest::Client::new(),
            max_tokens: 2048,
            temperature: temperature.unwrap_or(0.2),
        }
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_messages(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = GeminiRequest {
            model: &self.model,
            messages,
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status, &response_text));
        }

        let gemini_response: GeminiResponse =
            serde_json::from_str(&response_text).context("Failed to parse Gemini response")?;

        let choice = gemini_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No response choices from Gemini"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(
                "Gemini response was truncated due to max_tokens limit ({}). Response may be incomplete.",
                self.max_tokens
            );
        }

        if let Some(usage) = gemini_response.usage {
            debug!(
                "Gemini token usage - Prompt: {}, Completion: {}, Total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        Ok(choice.message.content)
    }
}

fn parse_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    // Gemini wraps errors in a one element array on some endpoints
    let parsed = serde_json::from_str::<GeminiError>(body).or_else(|_| {
        serde_json::from_str::<Vec<GeminiError>>(body).and_then(|mut errors| {
            errors
                .pop()
                .ok_or_else(|| serde::de::Error::custom("empty error list"))
        })
    });

    match parsed {
        Ok(error) => anyhow!(
            "Gemini API error: {} (status: {:?}, code: {:?})",
            error.error.message,
            error.error.status,
            error.error.code
        ),
        Err(_) => anyhow!("Gemini API error (status {}): {}", status, body),
    }
}
