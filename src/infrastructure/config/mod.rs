use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider, DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE};

const CONFIG_FILE: &str = "agent-tasks.toml";

const ENV_KEYS: &[&str] = &[
    "CENTRAL_API_URL",
    "POLIGON_API_URL",
    "AI_DEVS_API_KEY",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OLLAMA_API_URL",
    "QDRANT_URL",
    "QDRANT_API_KEY",
    "NEO4J_URL",
    "NEO4J_USERNAME",
    "NEO4J_PASSWORD",
    "SERVER_PORT",
    "SERVER_PUBLIC_URL",
    "RESOURCES_DIR",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub central_api_url: Option<String>,
    pub poligon_api_url: Option<String>,
    pub ai_devs_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub ollama_api_url: String,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub neo4j_url: Option<String>,
    pub neo4j_username: Option<String>,
    pub neo4j_password: Option<String>,
    pub server_port: u16,
    pub server_public_url: Option<String>,
    pub resources_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            central_api_url: None,
            poligon_api_url: None,
            ai_devs_api_key: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ollama_api_url: "http://localhost:11434".to_string(),
            qdrant_url: None,
            qdrant_api_key: None,
            neo4j_url: None,
            neo4j_username: None,
            neo4j_password: None,
            server_port: 8080,
            server_public_url: None,
            resources_dir: PathBuf::from("../resources"),
        }
    }
}

impl Settings {
    /// Defaults, then `agent-tasks.toml`, then the process environment (after `.env`).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::figment().extract().map_err(|e| AppError::ConfigError(e.to_string()))
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS))
    }

    pub fn central_api_url(&self) -> Result<&str> {
        required(&self.central_api_url, "CENTRAL_API_URL")
    }

    pub fn poligon_api_url(&self) -> Result<&str> {
        required(&self.poligon_api_url, "POLIGON_API_URL")
    }

    pub fn api_key(&self) -> Result<&str> {
        required(&self.ai_devs_api_key, "AI_DEVS_API_KEY")
    }

    pub fn server_public_url(&self) -> Result<&str> {
        required(&self.server_public_url, "SERVER_PUBLIC_URL")
    }

    pub fn qdrant_url(&self) -> Result<&str> {
        required(&self.qdrant_url, "QDRANT_URL")
    }

    pub fn neo4j_credentials(&self) -> Result<(&str, &str, &str)> {
        Ok((
            required(&self.neo4j_url, "NEO4J_URL")?,
            required(&self.neo4j_username, "NEO4J_USERNAME")?,
            required(&self.neo4j_password, "NEO4J_PASSWORD")?,
        ))
    }

    pub fn resource_path(&self, relative: &str) -> PathBuf {
        self.resources_dir.join(relative)
    }

    pub fn chat_config(&self) -> LLMConfig {
        LLMConfig {
            provider: LLMProvider::OpenAI,
            base_url: self.openai_base_url.clone(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: self.openai_api_key.clone(),
            max_tokens: None,
            temperature: Some(DEFAULT_TEMPERATURE),
        }
    }

    pub fn ollama_config(&self, model: &str) -> LLMConfig {
        LLMConfig {
            provider: LLMProvider::Ollama,
            base_url: self.ollama_api_url.clone(),
            model: model.to_string(),
            api_key: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::ConfigError(format!("{} is not set", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let settings: Settings = Settings::figment().extract()?;
            assert_eq!(settings.server_port, 8080);
            assert_eq!(settings.ollama_api_url, "http://localhost:11434");
            assert!(settings.central_api_url().is_err());
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "agent-tasks.toml",
                r#"
                central_api_url = "https://from-file.example"
                server_port = 9000
                "#,
            )?;
            jail.set_env("CENTRAL_API_URL", "https://central.example");
            jail.set_env("AI_DEVS_API_KEY", "key-123");

            let settings: Settings = Settings::figment().extract()?;
            assert_eq!(settings.server_port, 9000);
            assert_eq!(settings.central_api_url().unwrap(), "https://central.example");
            assert_eq!(settings.api_key().unwrap(), "key-123");
            Ok(())
        });
    }

    #[test]
    fn test_blank_value_is_missing() {
        let settings = Settings {
            ai_devs_api_key: Some("  ".to_string()),
            ..Settings::default()
        };
        assert!(matches!(settings.api_key(), Err(AppError::ConfigError(_))));
    }
}
