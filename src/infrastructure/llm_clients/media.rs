//! OpenAI endpoints beyond chat: transcription, image generation, embeddings
//! and fine-tuning.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::response::extract_extension;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const TRANSCRIPTION_LANGUAGE: &str = "pl";
pub const IMAGE_MODEL: &str = "dall-e-3";
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait AudioTranscriber {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String>;
}

#[async_trait]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Upload mime type for an audio file, by extension.
pub fn audio_mime(file_name: &str) -> &'static str {
    match extract_extension(file_name)
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct FineTuneRequest<'a> {
    model: &'a str,
    suffix: &'a str,
    training_file: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FineTuneJob {
    pub id: String,
    pub status: String,
}

pub struct MediaClient {
    client: Client,
    config: LLMConfig,
}

impl MediaClient {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::LLMError("Missing API key for OpenAI".to_string()))
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LLMError(format!(
                "{} API returned error {}: {}",
                what, status, error_text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse {} response: {}", what, e)))
    }

    /// Returns the URL of the generated 1024x1024 image.
    pub async fn generate_image(&self, prompt: &str) -> Result<String> {
        let request = ImageRequest {
            model: IMAGE_MODEL,
            prompt,
            size: "1024x1024",
            response_format: "url",
        };
        let response = self
            .client
            .post(self.url("images/generations"))
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to call image API: {}", e)))?;

        let image: ImageResponse = Self::read_json(response, "Image").await?;
        image
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| AppError::LLMError("Image not completed.".to_string()))
    }

    pub async fn upload_fine_tune_file(
        &self,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<UploadedFile> {
        let form = Form::new()
            .text("purpose", "fine-tune")
            .part("file", Part::bytes(content).file_name(file_name.to_string()));
        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to upload file: {}", e)))?;

        Self::read_json(response, "Files").await
    }

    pub async fn create_fine_tune_job(
        &self,
        base_model: &str,
        suffix: &str,
        training_file: &str,
    ) -> Result<FineTuneJob> {
        let request = FineTuneRequest {
            model: base_model,
            suffix,
            training_file,
        };
        let response = self
            .client
            .post(self.url("fine_tuning/jobs"))
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to create fine-tuning job: {}", e)))?;

        Self::read_json(response, "Fine-tuning").await
    }
}

#[async_trait]
impl AudioTranscriber for MediaClient {
    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(audio_mime(file_name))
            .map_err(|e| AppError::ValidationError(format!("Invalid audio part: {}", e)))?;
        let form = Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", TRANSCRIPTION_LANGUAGE)
            .part("file", part);

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to call transcription API: {}", e)))?;

        let transcription: TranscriptionResponse =
            Self::read_json(response, "Transcription").await?;
        Ok(transcription.text)
    }
}

#[async_trait]
impl Embedder for MediaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            input: text,
        };
        let response = self
            .client
            .post(self.url("embeddings"))
            .bearer_auth(self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to call embedding API: {}", e)))?;

        let embedding_response: EmbeddingResponse = Self::read_json(response, "Embedding").await?;
        let embedding = embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::LLMError("No embedding data in response".to_string()))?;

        if embedding.is_empty() {
            return Err(AppError::LLMError("Empty embedding response".to_string()));
        }
        Ok(embedding)
    }
}
