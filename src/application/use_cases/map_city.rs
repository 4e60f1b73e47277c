use std::path::PathBuf;

use futures::future::try_join_all;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::to_data_url;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::require_completion;
use crate::infrastructure::storage::list_files;

const MAP_PROMPT: &str = "Your job is to detect the name of the Polish city presented on provided images. Hint is that in this city were some granaries and fortresses. Gather all useful information such as street names and characteristc points. One image is invalid and represents different city - ignore it. Respond with just the city name and nothing more.";

/// Names the city shown on the map fragments. The answer is only logged.
pub struct MapCityUseCase {
    llm_client: SharedLLMClient,
    config: LLMConfig,
    chunks_dir: PathBuf,
}

impl MapCityUseCase {
    pub fn new(llm_client: SharedLLMClient, config: LLMConfig, chunks_dir: PathBuf) -> Self {
        Self {
            llm_client,
            config,
            chunks_dir,
        }
    }

    async fn image_urls(&self) -> Result<Vec<String>> {
        let files = list_files(&self.chunks_dir).await?;
        try_join_all(files.iter().map(|file| async move {
            let bytes = tokio::fs::read(self.chunks_dir.join(file)).await?;
            Ok::<_, AppError>(to_data_url("image/jpeg", &bytes))
        }))
        .await
    }

    pub async fn execute(&self) -> Result<String> {
        let images = self.image_urls().await?;
        if images.is_empty() {
            return Err(AppError::NotFound(format!(
                "No map chunks in {}",
                self.chunks_dir.display()
            )));
        }

        let completion = self
            .llm_client
            .generate_with_images(&self.config, MAP_PROMPT, None, &images)
            .await?;
        let city = require_completion(completion, "City")?;
        info!(images = images.len(), city = %city, "Map city");
        Ok(city)
    }
}
