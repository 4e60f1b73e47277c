use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct OpenAIClient {
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn api_key(config: &LLMConfig) -> Result<String> {
        config
            .api_key
            .clone()
            .ok_or_else(|| AppError::LLMError("Missing API key for OpenAI".to_string()))
    }

    fn endpoint(config: &LLMConfig, path: &str) -> String {
        if config.base_url.ends_with('/') {
            format!("{}{}", config.base_url, path)
        } else {
            format!("{}/{}", config.base_url, path)
        }
    }

    async fn complete(&self, config: &LLMConfig, messages: Vec<Value>) -> Result<String> {
        let api_key = Self::api_key(config)?;
        let url = Self::endpoint(config, "chat/completions");

        let body = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
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

        let json: Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))
    }
}

/// System message first (skipped when blank), then the user turn.
pub(crate) fn chat_messages(system: &str, user: Value) -> Vec<Value> {
    let mut messages = Vec::new();
    if !system.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": user }));
    messages
}

/// Multi-part user content: optional text, then one `image_url` part per data URL.
pub(crate) fn image_parts(user: Option<&str>, image_urls: &[String]) -> Value {
    let mut parts = Vec::new();
    if let Some(text) = user.filter(|t| !t.trim().is_empty()) {
        parts.push(json!({ "type": "text", "text": text }));
    }
    for url in image_urls {
        parts.push(json!({ "type": "image_url", "image_url": { "url": url } }));
    }
    Value::Array(parts)
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        self.complete(config, chat_messages(system, Value::String(user.to_string())))
            .await
    }

    async fn generate_with_images(
        &self,
        config: &LLMConfig,
        system: &str,
        user: Option<&str>,
        image_urls: &[String],
    ) -> Result<String> {
        self.complete(config, chat_messages(system, image_parts(user, image_urls)))
            .await
    }
}
