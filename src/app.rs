use std::sync::Arc;

use tracing::info;

use crate::application::use_cases::censorship::CENSORSHIP_MODEL;
use crate::application::{
    ArticleSummaryUseCase, CalibrationUseCase, CensorshipUseCase, ConnectionsUseCase,
    DatacentersUseCase, DroneNavigator, FineTuneUseCase, InterrogationUseCase, LoginUseCase,
    LoopUseCase, MapCityUseCase, NotebookQa, NotebookUseCase, PhotosUseCase, PoligonUseCase,
    ReportCategoriesUseCase, ReportTagsUseCase, ResearchUseCase, RobotImageUseCase,
    SoftoUseCase, VerifyUseCase, WeaponsSearchUseCase, WebhookUseCase,
};
use crate::cli::Task;
use crate::domain::error::Result;
use crate::domain::llm_config::{LLMConfig, VISION_MODEL};
use crate::infrastructure::config::Settings;
use crate::infrastructure::graph_db::GraphDb;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::media::MediaClient;
use crate::infrastructure::llm_clients::{RouterClient, SharedLLMClient};
use crate::infrastructure::vector_store::VectorStore;

/// Shared clients for one process run.
pub struct AppState {
    pub settings: Settings,
    pub llm_client: SharedLLMClient,
    pub media: Arc<MediaClient>,
    pub chat_config: LLMConfig,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let chat_config = settings.chat_config();
        Self {
            llm_client: Arc::new(RouterClient::new()),
            media: Arc::new(MediaClient::new(chat_config.clone())),
            chat_config,
            settings,
        }
    }

    fn hub(&self) -> Result<Arc<HubClient>> {
        Ok(Arc::new(HubClient::new(&self.settings)?))
    }

    pub async fn run(&self, task: Task) -> Result<()> {
        info!(?task, "Running task");
        let settings = &self.settings;
        let llm = self.llm_client.clone();
        let config = self.chat_config.clone();

        match task {
            Task::Poligon => PoligonUseCase::new(self.hub()?).execute().await,
            Task::Login => LoginUseCase::new(llm, config).execute().await,
            Task::Verify => VerifyUseCase::new(llm, config).execute().await,
            Task::Json => CalibrationUseCase::new(self.hub()?, llm, config).execute().await,
            Task::Censorship => {
                CensorshipUseCase::new(
                    self.hub()?,
                    llm,
                    settings.ollama_config(CENSORSHIP_MODEL),
                )
                .execute()
                .await
            }
            Task::Mp3 => {
                InterrogationUseCase::new(
                    self.hub()?,
                    llm,
                    self.media.clone(),
                    config,
                    settings.resource_path("audio"),
                    settings.resource_path("transcriptions.json"),
                )
                .execute()
                .await
            }
            Task::Map => {
                let city = MapCityUseCase::new(
                    llm,
                    config.with_model(VISION_MODEL),
                    settings.resource_path("maps/chunks"),
                )
                .execute()
                .await?;
                info!(city = %city, "Map city");
                Ok(())
            }
            Task::Robotid => {
                RobotImageUseCase::new(self.hub()?, llm, self.media.clone(), config)
                    .execute()
                    .await
            }
            Task::Kategorie => {
                ReportCategoriesUseCase::new(
                    self.hub()?,
                    llm,
                    self.media.clone(),
                    config,
                    settings.resource_path("pliki-z-fabryki/reports"),
                )
                .execute()
                .await
            }
            Task::Arxiv => {
                ArticleSummaryUseCase::new(
                    self.hub()?,
                    llm,
                    self.media.clone(),
                    config,
                    settings.resources_dir.clone(),
                )
                .execute()
                .await
            }
            Task::Dokumenty => {
                ReportTagsUseCase::new(
                    self.hub()?,
                    llm,
                    config,
                    settings.resource_path("pliki-z-fabryki"),
                )
                .execute()
                .await
            }
            Task::Wektory => {
                let store = VectorStore::new(
                    settings.qdrant_url()?,
                    settings.qdrant_api_key.clone(),
                );
                WeaponsSearchUseCase::new(
                    self.hub()?,
                    self.media.clone(),
                    store,
                    settings.resource_path("pliki-z-fabryki/weapons/do-not-share"),
                )
                .execute()
                .await
            }
            Task::Database => DatacentersUseCase::new(self.hub()?, llm, config).execute().await,
            Task::Loop => {
                LoopUseCase::new(self.hub()?, llm, config, settings.resource_path("loop-logs"))
                    .execute()
                    .await
            }
            Task::Connections => {
                let (url, username, password) = settings.neo4j_credentials()?;
                ConnectionsUseCase::new(self.hub()?, GraphDb::new(url, username, password))
                    .execute()
                    .await
            }
            Task::Photos => {
                PhotosUseCase::new(
                    self.hub()?,
                    llm,
                    config,
                    settings.resource_path("barbara-photos"),
                    settings.resource_path("barbara-photos-repaired"),
                )
                .execute()
                .await
            }
            Task::FineTune => {
                FineTuneUseCase::new(self.media.clone(), settings.resource_path("lab-data"))
                    .execute()
                    .await
            }
            Task::Research => {
                ResearchUseCase::new(self.hub()?, llm, config, settings.resource_path("lab-data"))
                    .execute()
                    .await
            }
            Task::Softo => {
                SoftoUseCase::new(self.hub()?, llm, config, settings.resource_path("softo"))
                    .execute()
                    .await
            }
            Task::Notes => {
                NotebookUseCase::new(
                    self.hub()?,
                    NotebookQa::new(llm, config),
                    settings.resources_dir.clone(),
                )
                .execute()
                .await
            }
            Task::Webhook => {
                WebhookUseCase::new(self.hub()?, settings.server_public_url()?)
                    .execute()
                    .await
            }
            Task::Serve => {
                let navigator = Arc::new(DroneNavigator::new(llm, config));
                info!(port = settings.server_port, "Starting drone server");
                crate::interfaces::http::start_server(navigator, settings.server_port)?.await?;
                Ok(())
            }
        }
    }
}
