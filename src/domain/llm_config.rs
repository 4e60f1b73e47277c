use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum LLMProvider {
    OpenAI,
    Ollama,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LLMConfig {
    /// Same endpoint and credentials, different model.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            max_tokens: None,
            temperature: Some(DEFAULT_TEMPERATURE),
        }
    }
}
