//! Qdrant over its REST API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct PointInput {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

pub struct VectorStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl VectorStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    async fn send<T: for<'de> Deserialize<'de>>(builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Vector store request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::DatabaseError(format!(
                "Vector store error ({}): {}",
                status, text
            )));
        }
        let envelope: QdrantEnvelope<T> = response.json().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to parse vector store response: {}", e))
        })?;
        Ok(envelope.result)
    }

    pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let result: ExistsResult = Self::send(self.request(
            reqwest::Method::GET,
            &format!("collections/{}/exists", collection),
        ))
        .await?;
        Ok(result.exists)
    }

    pub async fn create_collection(&self, collection: &str, size: usize) -> Result<()> {
        let _: Value = Self::send(
            self.request(reqwest::Method::PUT, &format!("collections/{}", collection))
                .json(&json!({ "vectors": { "size": size, "distance": "Cosine" } })),
        )
        .await?;
        info!(collection, size, "Created collection");
        Ok(())
    }

    pub async fn upsert(&self, collection: &str, points: Vec<PointInput>) -> Result<()> {
        let _: Value = Self::send(
            self.request(
                reqwest::Method::PUT,
                &format!("collections/{}/points?wait=true", collection),
            )
            .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    pub async fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let result: QueryResult = Self::send(
            self.request(
                reqwest::Method::POST,
                &format!("collections/{}/points/query", collection),
            )
            .json(&json!({ "query": vector, "limit": limit, "with_payload": true })),
        )
        .await?;
        Ok(result.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_parsing() {
        let envelope: QdrantEnvelope<QueryResult> = serde_json::from_value(json!({
            "result": {
                "points": [
                    { "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "score": 0.87,
                      "payload": { "createDate": "2024-02-21" } }
                ]
            },
            "status": "ok",
            "time": 0.002
        }))
        .unwrap();
        let point = &envelope.result.points[0];
        assert_eq!(
            point.payload.as_ref().unwrap()["createDate"],
            json!("2024-02-21")
        );
    }
}
