use std::sync::Arc;

use tracing::info;

use crate::domain::error::Result;
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;

pub const CENSORSHIP_MODEL: &str = "llama3.2";

const CENSORSHIP_PROMPT: &str = r#"You will be provided with short user message in Polish language. Your job is to hide any nevraligc data, such as name, address, age, by replacing it's actual value with word "CENZURA". Don't add any additional comments, return just the censored text with preserved initial structure.

<rules>
- Replace following values with word "CENZURA"
  * First, last name
  * Street name
  * City
  * Age
- Do not modify structure of the message
- Preserve all other words, punctuation, etc.
</rules>

<examples>
- INPUT: "Podejrzany nazywa się Tomasz Kaczmarek. Jest zameldowany w Poznaniu, ul. Konwaliowa 18. Ma 25 lat." | OUTPUT: "Podejrzany nazywa się CENZURA. Jest zameldowany w CENZURA, ul. CENZURA. Ma CENZURA lat."
- INPUT: "Tożsamość osoby podejrzanej: Piotr Lewandowski. Zamieszkały w Łodzi przy ul. Wspólnej 22. Ma 34 lata." | OUTPUT: "Tożsamość osoby podejrzanej: CENZURA. Zamieszkały w CENZURA przy ul. CENZURA. Ma CENZURA lata."
</examples>"#;

/// Anonymizes the agent's report with a local model before submitting it.
pub struct CensorshipUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl CensorshipUseCase {
    /// `config` should point at the local Ollama model.
    pub fn new(hub: Arc<HubClient>, llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            hub,
            llm_client,
            config,
        }
    }

    pub async fn censor(&self, text: &str) -> Result<String> {
        let censored = self
            .llm_client
            .generate(&self.config, CENSORSHIP_PROMPT, text)
            .await?;
        Ok(censored.trim().to_string())
    }

    pub async fn execute(&self) -> Result<()> {
        let data = self
            .hub
            .fetch_text(&self.hub.data_file_url("cenzura.txt"))
            .await?;
        info!(data = %data, "Data");

        let censored = self.censor(&data).await?;
        info!(result = %censored, "Censored");

        self.hub
            .submit("CENZURA", censored, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    #[tokio::test]
    async fn test_censor_uses_configured_model() {
        let llm = Arc::new(ScriptedClient::new(["Osoba podejrzana to CENZURA.\n"]));
        let config = LLMConfig {
            model: CENSORSHIP_MODEL.to_string(),
            ..LLMConfig::default()
        };
        let use_case = CensorshipUseCase::new(offline_hub(), llm.clone(), config);

        let censored = use_case
            .censor("Osoba podejrzana to Jan Nowak.")
            .await
            .unwrap();

        assert_eq!(censored, "Osoba podejrzana to CENZURA.");
        let calls = llm.calls();
        assert_eq!(calls[0].model, "llama3.2");
        assert_eq!(calls[0].user.as_deref(), Some("Osoba podejrzana to Jan Nowak."));
    }
}
