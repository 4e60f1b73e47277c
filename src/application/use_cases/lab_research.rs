//! Lab sample classification: build a fine-tuning set from labelled samples,
//! then classify the unlabelled ones with the resulting model.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::media::MediaClient;
use crate::infrastructure::llm_clients::SharedLLMClient;

const PATTERN_PROMPT: &str = "Determine if set of four numbers follows specific pattern.";
pub const BASE_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const MODEL_SUFFIX: &str = "lab-data-verification";
pub const FINE_TUNED_MODEL: &str =
    "ft:gpt-4o-mini-2024-07-18:personal:lab-data-verification:AZIQqq21";
pub const TRAINING_FILE: &str = "lab-data-verification-training-data.jsonl";

#[derive(Debug, Serialize)]
struct TrainingMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TrainingLine<'a> {
    messages: [TrainingMessage<'a>; 3],
}

fn training_line(sample: &str, label: &str) -> Result<String> {
    let line = TrainingLine {
        messages: [
            TrainingMessage {
                role: "system",
                content: PATTERN_PROMPT,
            },
            TrainingMessage {
                role: "user",
                content: sample,
            },
            TrainingMessage {
                role: "assistant",
                content: label,
            },
        ],
    };
    Ok(serde_json::to_string(&line)?)
}

/// One chat example per sample line, `correct` samples first.
pub fn training_jsonl(correct: &str, incorrect: &str) -> Result<String> {
    let lines = correct
        .trim()
        .lines()
        .map(|sample| training_line(sample, "correct"))
        .chain(
            incorrect
                .trim()
                .lines()
                .map(|sample| training_line(sample, "incorrect")),
        )
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// `id=sample` lines, split on the first `=`.
pub fn parse_samples(content: &str) -> Result<Vec<(String, String)>> {
    content
        .trim()
        .lines()
        .map(|line| {
            line.split_once('=')
                .map(|(id, sample)| (id.to_string(), sample.to_string()))
                .ok_or_else(|| AppError::ValidationError(format!("Invalid sample line: {}", line)))
        })
        .collect()
}

pub struct FineTuneUseCase {
    media: Arc<MediaClient>,
    lab_dir: PathBuf,
}

impl FineTuneUseCase {
    pub fn new(media: Arc<MediaClient>, lab_dir: PathBuf) -> Self {
        Self { media, lab_dir }
    }

    pub async fn execute(&self) -> Result<()> {
        let training_path = self.lab_dir.join(TRAINING_FILE);
        if training_path.exists() {
            info!(path = %training_path.display(), "Training data already exists");
            return Ok(());
        }

        let correct = tokio::fs::read_to_string(self.lab_dir.join("correct.txt")).await?;
        let incorrect = tokio::fs::read_to_string(self.lab_dir.join("incorrect.txt")).await?;
        let jsonl = training_jsonl(&correct, &incorrect)?;
        tokio::fs::write(&training_path, &jsonl).await?;

        let file = self
            .media
            .upload_fine_tune_file(TRAINING_FILE, jsonl.into_bytes())
            .await?;
        let job = self
            .media
            .create_fine_tune_job(BASE_MODEL, MODEL_SUFFIX, &file.id)
            .await?;
        info!(job = %job.id, status = %job.status, "Fine tuning started");
        Ok(())
    }
}

pub struct ResearchUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    lab_dir: PathBuf,
}

impl ResearchUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        lab_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            config: config.with_model(FINE_TUNED_MODEL),
            lab_dir,
        }
    }

    /// Ids of the samples the fine-tuned model labels `correct`, in file order.
    pub async fn classify(&self, samples: &[(String, String)]) -> Result<Vec<String>> {
        let results = try_join_all(samples.iter().map(|(id, sample)| async move {
            let completion = self
                .llm_client
                .generate(&self.config, PATTERN_PROMPT, sample)
                .await?;
            info!(id = %id, completion = %completion, "Classified");
            Ok::<_, AppError>((id, completion.trim() == "correct"))
        }))
        .await?;

        Ok(results
            .into_iter()
            .filter(|(_, correct)| *correct)
            .map(|(id, _)| id.clone())
            .collect())
    }

    pub async fn execute(&self) -> Result<()> {
        let content = tokio::fs::read_to_string(self.lab_dir.join("verify.txt")).await?;
        let samples = parse_samples(&content)?;
        let correct = self.classify(&samples).await?;
        info!(?correct, "Correct samples");

        self.hub
            .submit("research", correct, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}
