//! Drone flight descriptions over a fixed 4x4 map, and the webhook registration.

use std::sync::Arc;

use tracing::info;

use crate::domain::error::Result;
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::domain::records::DroneDescription;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{completion_record, require_completion};

const MAP_PROMPT: &str = r#"We are playing a game. Below, you will find a description of 4x4 map. Each field will be described with points (x, y). The description for each point on map will say, what is present on that specific point. User's message will be a description of his move in natural, Polish language. Your job is to determine, what is user's position after his move and return description for that specific point.
<rules>
  - You can move on 4x4 map
  - Fields are 1 base indexed, so the left most position is 1 on X axis, and the top most position is 1 on Y axis
  - Fields are described as points, where first value is position on X axis, and second value is position on Y axis. Ex. (2, 4) - X = 2, Y = 4
  - The starting point is always (1, 1)
  - User messages will be in Polish language
  - First of all, output your reasoning and thoughts about user's message. Analyse his natural human language in a way, that will allow you to determine a specific point, that is the position after his described move.
  - After you determined a specific point, look up the description for that point and return it in your final answer
  - Your final answer should always be at the end in form of JSON
</rules>

<map_size>
  - Square
  - X axis length: 4
  - Y axis length: 4
</map_size>

<map_field_descriptions>
  - (1, 1) - pozycja startowa
  - (2, 1) - trawa
  - (3, 1) - drzewo
  - (4, 1) - budynek
  - (1, 2) - trawa
  - (2, 2) - wiatrak
  - (3, 2) - trawa
  - (4, 2) - trawa
  - (1, 3) - trawa
  - (2, 3) - trawa
  - (3, 3) - kamień
  - (4, 3) - drzewa
  - (1, 4) - skały
  - (2, 4) - skały
  - (3, 4) - samochód
  - (4, 4) - jaskinia
</map_field_descriptions>

<final_answer>
{
  "point": "{user's position after his move}"
  "description": "{description of the field, that user is positioned after his move}"
}
</final_answer>"#;

pub struct DroneNavigator {
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl DroneNavigator {
    pub fn new(llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self { llm_client, config }
    }

    /// What lies on the field the drone reaches after `instruction`, starting at (1, 1).
    pub async fn describe(&self, instruction: &str) -> Result<DroneDescription> {
        info!(instruction, "Instruction");
        let completion = self
            .llm_client
            .generate(&self.config, MAP_PROMPT, instruction)
            .await?;
        let completion = require_completion(completion, "Completion")?;
        info!(completion = %completion, "Completion");
        completion_record(&completion)
    }
}

/// Registers the public drone endpoint with the hub.
pub struct WebhookUseCase {
    hub: Arc<HubClient>,
    public_url: String,
}

impl WebhookUseCase {
    pub fn new(hub: Arc<HubClient>, public_url: &str) -> Self {
        Self {
            hub,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/drones", self.public_url)
    }

    pub async fn execute(&self) -> Result<()> {
        self.hub
            .submit("webhook", self.endpoint(), SubmitTarget::Central)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    #[tokio::test]
    async fn test_describe_reads_final_json() {
        let llm = Arc::new(ScriptedClient::new([
            "Lecimy w prawo o jedno pole, potem w dół.\n{\n  \"point\": \"(2, 2)\",\n  \"description\": \"wiatrak\"\n}",
        ]));
        let navigator = DroneNavigator::new(llm.clone(), LLMConfig::default());

        let description = navigator
            .describe("poleciałem jedno pole w prawo, a później na sam dół... nie, jedno w dół")
            .await
            .unwrap();

        assert_eq!(description.description, "wiatrak");
        assert!(llm.calls()[0].system.contains("(4, 4) - jaskinia"));
    }

    #[tokio::test]
    async fn test_describe_rejects_missing_description() {
        let llm = Arc::new(ScriptedClient::new(["{ \"point\": \"(1, 1)\" }"]));
        let navigator = DroneNavigator::new(llm, LLMConfig::default());

        let result = navigator.describe("stój").await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_webhook_endpoint() {
        let webhook = WebhookUseCase::new(offline_hub(), "https://agent.example/");
        assert_eq!(webhook.endpoint(), "https://agent.example/drones");
    }
}
