//! Client for the course hub: task data files, grading, and the query proxies
//! (`apidb`, `people`, `places`).

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::error::{AppError, Result};
use crate::domain::hub::{DbReply, HubMessage, SubmitTarget, Submission};
use crate::infrastructure::config::Settings;

/// Name lookups behind the `people` and `places` endpoints.
#[async_trait]
pub trait PeopleDirectory {
    /// Cities a person was seen in.
    async fn people(&self, name: &str) -> Result<String>;
    /// People seen in a city.
    async fn places(&self, name: &str) -> Result<String>;
}

pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub struct HubClient {
    client: Client,
    central_url: String,
    poligon_url: Option<String>,
    api_key: String,
}

impl HubClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            central_url: settings.central_api_url()?.trim_end_matches('/').to_string(),
            poligon_url: settings
                .poligon_api_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            api_key: settings.api_key()?.to_string(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn central_url(&self) -> &str {
        &self.central_url
    }

    fn submit_url(&self, target: SubmitTarget) -> Result<String> {
        match target {
            SubmitTarget::Poligon => self
                .poligon_url
                .as_ref()
                .map(|url| format!("{}/verify", url))
                .ok_or_else(|| AppError::ConfigError("POLIGON_API_URL is not set".to_string())),
            SubmitTarget::Central => Ok(format!("{}/report", self.central_url)),
        }
    }

    /// Sends `{ apikey, task, answer }` to the grading endpoint.
    pub async fn submit<T: Serialize + Send>(
        &self,
        task: &str,
        answer: T,
        target: SubmitTarget,
    ) -> Result<HubMessage> {
        let url = self.submit_url(target)?;
        let body = Submission {
            apikey: &self.api_key,
            task,
            answer,
        };
        debug!(task, url = %url, "Submitting answer");
        let reply: HubMessage = self.post_json(&url, &body).await?;
        info!(task, code = reply.code, message = %reply.message, "Submission result");
        Ok(reply)
    }

    pub async fn query_db(&self, task: &str, query: &str) -> Result<DbReply> {
        let url = format!("{}/apidb", self.central_url);
        let body = json!({ "task": task, "apikey": self.api_key, "query": query });
        let reply: DbReply = self.post_json(&url, &body).await?;
        if !reply.error.is_empty() && reply.error != "OK" {
            return Err(AppError::DatabaseError(reply.error));
        }
        Ok(reply)
    }

    pub fn poligon_file_url(&self, file: &str) -> Result<String> {
        self.poligon_url
            .as_ref()
            .map(|url| format!("{}/{}", url, file))
            .ok_or_else(|| AppError::ConfigError("POLIGON_API_URL is not set".to_string()))
    }

    /// File from the per-key data directory, e.g. `cenzura.txt`.
    pub fn data_file_url(&self, file: &str) -> String {
        format!("{}/data/{}/{}", self.central_url, self.api_key, file)
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {}", e)))
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Failed to parse {}: {}", url, e)))
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes> {
        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {}", e)))?;
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP error {}: {}",
                response.status(),
                url
            )));
        }
        Ok(response)
    }

    /// Hub endpoints answer errors with a JSON body too, so status is not checked here.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {}", e)))?;

        serde_json::from_str(&text).map_err(|e| {
            AppError::ParseError(format!(
                "Unexpected response from {} ({}): {} | body={}",
                url, status, e, text
            ))
        })
    }

    async fn lookup(&self, endpoint: &str, name: &str) -> Result<String> {
        let url = format!("{}/{}", self.central_url, endpoint);
        let body = json!({ "apikey": self.api_key, "query": name });
        let reply: HubMessage = self.post_json(&url, &body).await?;
        Ok(reply.message)
    }
}

#[async_trait]
impl PeopleDirectory for HubClient {
    async fn people(&self, name: &str) -> Result<String> {
        self.lookup("people", name).await
    }

    async fn places(&self, name: &str) -> Result<String> {
        self.lookup("places", name).await
    }
}

/// `data:<mime>;base64,<payload>` for vision prompts.
pub fn to_data_url(content_type: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            central_api_url: Some("https://central.example/".to_string()),
            ai_devs_api_key: Some("key-1".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_submit_urls() {
        let hub = HubClient::new(&settings()).unwrap();
        assert_eq!(
            hub.submit_url(SubmitTarget::Central).unwrap(),
            "https://central.example/report"
        );
        assert!(matches!(
            hub.submit_url(SubmitTarget::Poligon),
            Err(AppError::ConfigError(_))
        ));

        let with_poligon = HubClient::new(&Settings {
            poligon_api_url: Some("https://poligon.example".to_string()),
            ..settings()
        })
        .unwrap();
        assert_eq!(
            with_poligon.submit_url(SubmitTarget::Poligon).unwrap(),
            "https://poligon.example/verify"
        );
        assert_eq!(
            with_poligon.poligon_file_url("dane.txt").unwrap(),
            "https://poligon.example/dane.txt"
        );
    }

    #[test]
    fn test_data_file_url() {
        let hub = HubClient::new(&settings()).unwrap();
        assert_eq!(
            hub.data_file_url("robotid.json"),
            "https://central.example/data/key-1/robotid.json"
        );
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let result = HubClient::new(&Settings {
            central_api_url: Some("https://central.example".to_string()),
            ..Settings::default()
        });
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_to_data_url() {
        assert_eq!(to_data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }
}
