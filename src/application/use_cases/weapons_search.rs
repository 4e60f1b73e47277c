//! Semantic search over the weapons test reports stored in Qdrant.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::media::{Embedder, EMBEDDING_DIMENSIONS};
use crate::infrastructure::storage::list_files;
use crate::infrastructure::vector_store::{PointInput, ScoredPoint, VectorStore};

pub const COLLECTION_NAME: &str = "ai-devs-3-weapons";
const QUESTION: &str =
    "W raporcie, z którego dnia znajduje się wzmianka o kradzieży prototypu broni?";

/// `2024_02_21.txt` becomes `2024-02-21`.
pub fn report_date(file_name: &str) -> Result<String> {
    let stem = file_name.trim_end_matches(".txt");
    NaiveDate::parse_from_str(stem, "%Y_%m_%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|e| {
            AppError::ValidationError(format!("Report name is not a date: {} ({})", file_name, e))
        })
}

fn create_date(point: &ScoredPoint) -> Option<&str> {
    point.payload.as_ref()?.get("createDate")?.as_str()
}

pub struct WeaponsSearchUseCase {
    hub: Arc<HubClient>,
    embedder: Arc<dyn Embedder + Send + Sync>,
    store: VectorStore,
    reports_dir: PathBuf,
}

impl WeaponsSearchUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        embedder: Arc<dyn Embedder + Send + Sync>,
        store: VectorStore,
        reports_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            embedder,
            store,
            reports_dir,
        }
    }

    async fn report_point(&self, dir: &Path, file: &str) -> Result<PointInput> {
        let content = tokio::fs::read_to_string(dir.join(file)).await?;
        let mut payload = Map::new();
        payload.insert("createDate".to_string(), Value::String(report_date(file)?));
        Ok(PointInput {
            id: uuid::Uuid::new_v4().to_string(),
            vector: self.embedder.embed(&content).await?,
            payload,
        })
    }

    async fn index_reports(&self) -> Result<()> {
        self.store
            .create_collection(COLLECTION_NAME, EMBEDDING_DIMENSIONS)
            .await?;

        let files = list_files(&self.reports_dir).await?;
        let points = try_join_all(
            files
                .iter()
                .map(|file| self.report_point(&self.reports_dir, file)),
        )
        .await?;
        info!(points = points.len(), "Indexing reports");

        self.store.upsert(COLLECTION_NAME, points).await
    }

    pub async fn execute(&self) -> Result<()> {
        if !self.store.collection_exists(COLLECTION_NAME).await? {
            self.index_reports().await?;
        }

        let question = self.embedder.embed(QUESTION).await?;
        let points = self.store.query(COLLECTION_NAME, question, 1).await?;
        let date = points
            .first()
            .and_then(create_date)
            .ok_or_else(|| AppError::NotFound("\"createDate\" payload not found.".to_string()))?
            .to_string();
        info!(date = %date, score = points[0].score, "Best match");

        self.hub.submit("wektory", date, SubmitTarget::Central).await?;
        Ok(())
    }
}
