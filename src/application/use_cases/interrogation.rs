//! Witness interrogation recordings: transcribe once, then reason over all statements.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::domain::records::ResultObj;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::media::AudioTranscriber;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{completion_record, require_completion};
use crate::infrastructure::storage::{list_files, JsonCache};

const STATEMENTS_PROMPT: &str = r#"You will be provided with a couple of statements in Polish language made by some people. Your job is to gather information from these statements, that will allow you to answer the question (in Polish): "Jaka jest nazwa ulicy, na której znajduje się departament uczelni, na którym wykłada Profesor Andrzej Maj?"

<main_question>
  Jaka jest nazwa ulicy, na której znajduje się departament uczelni, na którym wykłada Profesor Andrzej Maj?
</main_question>

<rules>
  - Analyse one statement at the time.
  - After each statement, think about it, and output a brief conclusion / reasoning, that you have about the statement
  - Pay special attention to things like city names, university names, departament names
  - Decide if the statement is valid - determine if the person is worth considering, if there are any suspicious things like unconscious talking, hate from the person, etc. about it. If so, ignore it.
  - The street name of the university departament will likely not directly provided in the statements. You need to figure out, what is the street name, based only on information you have and information about the university and it's departament from the statements.
  - After you are done with iterating over statements, print a summary, that consists only of valid information and is helpful to answer the main question. Focus on the city, university name and departament name.
  - After outputting the summary, try to figure out what is the street of university departament, that Andrzej Maj teaches on.
  - Once you figured out university and departament name, output street name of the departament, that might not be directly included in statements and use it as final response
  - IMPORTANT: You need to respond with the name of the street of specific university departament, not the university itself
</rules>

<reasoning_format>
  **{number wypowiedzi} wypowiedź**: "reasoning"
</reasoning_format>

<final_response_format>
  {
    "result": "{street name of the university departament}"
  }
</final_response_format>"#;

/// File name without its extension, used as the transcription cache key.
pub fn file_stem(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
}

/// Transcribes every recording in `audio_dir` that the cache does not know yet.
pub async fn transcribe_pending(
    audio_dir: &Path,
    cache: &mut JsonCache,
    transcriber: &(dyn AudioTranscriber + Send + Sync),
) -> Result<usize> {
    let pending: Vec<String> = list_files(audio_dir)
        .await?
        .into_iter()
        .filter(|file| !cache.contains(file_stem(file)))
        .collect();

    let transcriptions = try_join_all(pending.iter().map(|file| async move {
        let audio = tokio::fs::read(audio_dir.join(file)).await?;
        let text = transcriber.transcribe(file, audio).await?;
        info!(file = %file, "Transcribed");
        Ok::<_, AppError>((file_stem(file).to_string(), text))
    }))
    .await?;

    let count = transcriptions.len();
    for (stem, text) in transcriptions {
        cache.insert(stem, text);
    }
    Ok(count)
}

/// Statements as a markdown list, one `- ` line each.
pub fn statements_query<'a>(statements: impl IntoIterator<Item = &'a String>) -> String {
    statements
        .into_iter()
        .map(|statement| format!("\n- {}", statement))
        .collect()
}

pub struct InterrogationUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
    config: LLMConfig,
    audio_dir: PathBuf,
    cache_path: PathBuf,
}

impl InterrogationUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
        config: LLMConfig,
        audio_dir: PathBuf,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            transcriber,
            config,
            audio_dir,
            cache_path,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let mut cache = JsonCache::load(self.cache_path.clone()).await?;
        let transcribed =
            transcribe_pending(&self.audio_dir, &mut cache, self.transcriber.as_ref()).await?;
        cache.save().await?;
        info!(transcribed, total = cache.entries().len(), "Transcriptions ready");

        let query = statements_query(cache.entries().values());
        let completion = self
            .llm_client
            .generate(&self.config, STATEMENTS_PROMPT, &query)
            .await?;
        let completion = require_completion(completion, "Completion")?;
        info!(completion = %completion, "Completion");

        let answer: ResultObj = completion_record(&completion)?;
        let street = answer
            .result
            .ok_or_else(|| AppError::NotFound("Street name not found".to_string()))?;
        info!(answer = %street, "Answer");

        self.hub.submit("mp3", street, SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeTranscriber {
        files: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AudioTranscriber for FakeTranscriber {
        async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String> {
            self.files.lock().unwrap().push(file_name.to_string());
            Ok(String::from_utf8_lossy(&audio).to_uppercase())
        }
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("adam.m4a"), "adam");
        assert_eq!(file_stem("rafal.v2.mp3"), "rafal.v2");
        assert_eq!(file_stem("bez-rozszerzenia"), "bez-rozszerzenia");
    }

    #[test]
    fn test_statements_query() {
        let statements = vec!["Pierwsza".to_string(), "Druga".to_string()];
        assert_eq!(statements_query(&statements), "\n- Pierwsza\n- Druga");
    }

    #[tokio::test]
    async fn test_only_missing_recordings_are_transcribed() {
        let root = std::env::temp_dir().join(format!("mp3-{}", uuid::Uuid::new_v4()));
        let audio_dir = root.join("audio");
        std::fs::create_dir_all(&audio_dir).unwrap();
        std::fs::write(audio_dir.join("adam.m4a"), b"adam").unwrap();
        std::fs::write(audio_dir.join("monika.m4a"), b"monika").unwrap();

        let mut cache = JsonCache::load(root.join("transcriptions.json")).await.unwrap();
        cache.insert("adam", "cached");
        let transcriber = FakeTranscriber {
            files: Mutex::new(Vec::new()),
        };

        let count = transcribe_pending(&audio_dir, &mut cache, &transcriber)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(*transcriber.files.lock().unwrap(), vec!["monika.m4a"]);
        assert_eq!(cache.get("adam"), Some("cached"));
        assert_eq!(cache.get("monika"), Some("MONIKA"));
    }
}
