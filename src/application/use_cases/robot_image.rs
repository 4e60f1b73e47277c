use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::error::Result;
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::media::MediaClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::require_completion;

const IMAGE_PROMPT_PROMPT: &str = "You will be provided with a description of some robot. Your job is to focus on all most important points from this description and prepare a prompt for image model, that will create an image of this robot. Use all best practices for prompting image models.";

#[derive(Debug, Deserialize)]
struct RobotDescription {
    description: String,
}

/// Turns the witness description into an image and submits its URL.
pub struct RobotImageUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    media: Arc<MediaClient>,
    config: LLMConfig,
}

impl RobotImageUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        media: Arc<MediaClient>,
        config: LLMConfig,
    ) -> Self {
        Self {
            hub,
            llm_client,
            media,
            config,
        }
    }

    pub async fn image_prompt(&self, description: &str) -> Result<String> {
        let completion = self
            .llm_client
            .generate(&self.config, IMAGE_PROMPT_PROMPT, description)
            .await?;
        require_completion(completion, "Image description")
    }

    pub async fn execute(&self) -> Result<()> {
        let robot: RobotDescription = self
            .hub
            .fetch_json(&self.hub.data_file_url("robotid.json"))
            .await?;

        let prompt = self.image_prompt(&robot.description).await?;
        info!(prompt = %prompt, "Image prompt");

        let url = self.media.generate_image(&prompt).await?;
        info!(url = %url, "Image generated");

        self.hub.submit("robotid", url, SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    fn use_case(llm: Arc<ScriptedClient>) -> RobotImageUseCase {
        RobotImageUseCase::new(
            offline_hub(),
            llm,
            Arc::new(MediaClient::new(LLMConfig::default())),
            LLMConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_image_prompt_from_description() {
        let llm = Arc::new(ScriptedClient::new(["A tall robot on caterpillar tracks"]));
        let prompt = use_case(llm.clone())
            .image_prompt("Ma gąsienice zamiast nóg")
            .await
            .unwrap();

        assert_eq!(prompt, "A tall robot on caterpillar tracks");
        assert_eq!(llm.calls()[0].user.as_deref(), Some("Ma gąsienice zamiast nóg"));
    }

    #[tokio::test]
    async fn test_empty_image_prompt_is_rejected() {
        let llm = Arc::new(ScriptedClient::new([""]));
        let result = use_case(llm).image_prompt("opis").await;
        assert!(matches!(result, Err(AppError::LLMError(_))));
    }
}
