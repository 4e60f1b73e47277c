use super::openai::chat_messages;
use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::response::clean_llm_response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

/// Local Ollama server, non-streaming `/api/chat`.
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn chat(&self, config: &LLMConfig, messages: Vec<Value>) -> Result<String> {
        let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
        let body = OllamaChatRequest {
            model: &config.model,
            stream: false,
            messages,
            options: config.temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let json: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        Ok(clean_llm_response(&json.message.content))
    }
}

/// Ollama takes bare base64 payloads, not data URLs.
fn strip_data_url(url: &str) -> &str {
    match url.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => url,
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        self.chat(config, chat_messages(system, Value::String(user.to_string())))
            .await
    }

    async fn generate_with_images(
        &self,
        config: &LLMConfig,
        system: &str,
        user: Option<&str>,
        image_urls: &[String],
    ) -> Result<String> {
        let user = Value::String(user.unwrap_or_default().to_string());
        let mut messages = chat_messages(system, user);
        if let Some(last) = messages.last_mut() {
            last["images"] = json!(image_urls
                .iter()
                .map(|url| strip_data_url(url))
                .collect::<Vec<_>>());
        }
        self.chat(config, messages).await
    }
}
