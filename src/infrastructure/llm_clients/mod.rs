pub mod media;
pub mod ollama;
pub mod openai;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use async_trait::async_trait;
use ollama::OllamaClient;
use openai::OpenAIClient;

#[async_trait]
pub trait LLMClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String>;
    async fn generate_with_images(
        &self,
        config: &LLMConfig,
        system: &str,
        user: Option<&str>,
        image_urls: &[String],
    ) -> Result<String>;
}

pub type SharedLLMClient = std::sync::Arc<dyn LLMClient + Send + Sync>;

pub struct RouterClient {
    openai: OpenAIClient,
    ollama: OllamaClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAIClient::new(),
            ollama: OllamaClient::new(),
        }
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        match config.provider {
            LLMProvider::Ollama => self.ollama.generate(config, system, user).await,
            LLMProvider::OpenAI => self.openai.generate(config, system, user).await,
        }
    }

    async fn generate_with_images(
        &self,
        config: &LLMConfig,
        system: &str,
        user: Option<&str>,
        image_urls: &[String],
    ) -> Result<String> {
        match config.provider {
            LLMProvider::Ollama => {
                self.ollama
                    .generate_with_images(config, system, user, image_urls)
                    .await
            }
            LLMProvider::OpenAI => {
                self.openai
                    .generate_with_images(config, system, user, image_urls)
                    .await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted client for use-case tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub system: String,
        pub user: Option<String>,
        pub model: String,
        pub images: usize,
    }

    pub struct ScriptedClient {
        replies: Mutex<VecDeque<String>>,
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedClient {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self, call: RecordedCall) -> Result<String> {
            self.calls.lock().unwrap().push(call);
            self.replies.lock().unwrap().pop_front().ok_or_else(|| {
                crate::domain::error::AppError::LLMError("no scripted reply left".to_string())
            })
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
            self.next(RecordedCall {
                system: system.to_string(),
                user: Some(user.to_string()),
                model: config.model.clone(),
                images: 0,
            })
        }

        async fn generate_with_images(
            &self,
            config: &LLMConfig,
            system: &str,
            user: Option<&str>,
            image_urls: &[String],
        ) -> Result<String> {
            self.next(RecordedCall {
                system: system.to_string(),
                user: user.map(|u| u.to_string()),
                model: config.model.clone(),
                images: image_urls.len(),
            })
        }
    }
}
