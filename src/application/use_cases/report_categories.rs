//! Factory report triage: which reports mention captured people or repaired hardware.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::{to_data_url, HubClient};
use crate::infrastructure::llm_clients::media::AudioTranscriber;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{extract_extension, extract_xml_tag};
use crate::infrastructure::storage::list_files;

const CATEGORY_PROMPT: &str = r#"You will be provided with a report. You job is to determine if the report contains information related to repaired hardware or captured people.
<rules>
  - Focus on key things included in report
  - Determine if the report contains any information about captured people or repaired hardware / machines
  - If the report contains specific information about captured people or repaired hardware / machines, you need to determine, which category it relates to
  - Before your answer, always output your thoughts / reasoning about what is contained in the report. Analyse if there could be any information about captured people or repaired machines.
  - DO NOT categorize unrelevant people or technology that is not directly related to reapairing machine / hardware / robots (such as AI modules, systems, algorithms)
  - DO NOT categorize reports, that mention unrelevant, random, not impornant people
  - DO NOT categorize reports, that mention updated / improvements to hardware. Repairing / fixes only
  - Your final response should be just the category, you assigned the report to, or "null", if it does not include information we look for
</rules>

<allowed_categories>
- hardware - if the report contains infrmation on repaired machines / hardware. This must be directly about repairing or fixing hardware / machines / robots only, not the software or other components such as AI, systems, or algorithms
- people - if the report mentions specific, captured or kidnapped people and has some about them. This is specifically for reports, that mention captured / kidnapped people, so other people should not be included
- null - if the report does not contain any information about repaired hardware or captured people
</allowed_categories>

<final_response_format>
<final_answer>
{category}
</final_answer>
</final_response_format>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCategory {
    Hardware,
    People,
}

impl ReportCategory {
    /// Category named in the completion's `<final_answer>`; `null` and anything else is none.
    pub fn from_completion(completion: &str) -> Option<Self> {
        match extract_xml_tag(completion, "final_answer")?.as_str() {
            "hardware" => Some(ReportCategory::Hardware),
            "people" => Some(ReportCategory::People),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct CategorizedReports {
    pub hardware: Vec<String>,
    pub people: Vec<String>,
}

impl CategorizedReports {
    /// Both lists sorted by file name.
    pub fn collect(results: impl IntoIterator<Item = (String, Option<ReportCategory>)>) -> Self {
        let mut answer = Self::default();
        for (file, category) in results {
            match category {
                Some(ReportCategory::Hardware) => answer.hardware.push(file),
                Some(ReportCategory::People) => answer.people.push(file),
                None => {}
            }
        }
        answer.hardware.sort();
        answer.people.sort();
        answer
    }
}

pub struct ReportCategoriesUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
    config: LLMConfig,
    reports_dir: PathBuf,
}

impl ReportCategoriesUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
        config: LLMConfig,
        reports_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            transcriber,
            config,
            reports_dir,
        }
    }

    /// Categorizes one report file; unsupported extensions are skipped.
    pub async fn categorize(&self, file: &str) -> Result<Option<ReportCategory>> {
        let path = self.reports_dir.join(file);
        let completion = match extract_extension(file) {
            Some("txt") => {
                let text = tokio::fs::read_to_string(&path).await?;
                self.llm_client
                    .generate(&self.config, CATEGORY_PROMPT, &text)
                    .await?
            }
            Some("png") => {
                let bytes = tokio::fs::read(&path).await?;
                self.llm_client
                    .generate_with_images(
                        &self.config,
                        CATEGORY_PROMPT,
                        None,
                        &[to_data_url("image/png", &bytes)],
                    )
                    .await?
            }
            Some("mp3") => {
                let audio = tokio::fs::read(&path).await?;
                let text = self.transcriber.transcribe(file, audio).await?;
                self.llm_client
                    .generate(&self.config, CATEGORY_PROMPT, &text)
                    .await?
            }
            _ => {
                debug!(file, "Skipping unsupported report");
                return Ok(None);
            }
        };

        let category = ReportCategory::from_completion(&completion);
        info!(file, ?category, "Report categorized");
        Ok(category)
    }

    pub async fn categorize_all(&self) -> Result<CategorizedReports> {
        let files = list_files(&self.reports_dir).await?;
        let results = try_join_all(files.into_iter().map(|file| async move {
            let category = self.categorize(&file).await?;
            Ok::<_, AppError>((file, category))
        }))
        .await?;
        Ok(CategorizedReports::collect(results))
    }

    pub async fn execute(&self) -> Result<()> {
        let answer = self.categorize_all().await?;
        info!(hardware = ?answer.hardware, people = ?answer.people, "Categories");

        self.hub
            .submit("kategorie", &answer, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;
    use async_trait::async_trait;

    struct EchoTranscriber;

    #[async_trait]
    impl AudioTranscriber for EchoTranscriber {
        async fn transcribe(&self, _file_name: &str, audio: Vec<u8>) -> Result<String> {
            Ok(String::from_utf8_lossy(&audio).to_string())
        }
    }

    #[test]
    fn test_category_from_completion() {
        assert_eq!(
            ReportCategory::from_completion("Thinking...\n<final_answer>\npeople\n</final_answer>"),
            Some(ReportCategory::People)
        );
        assert_eq!(
            ReportCategory::from_completion("<final_answer>hardware</final_answer>"),
            Some(ReportCategory::Hardware)
        );
        assert_eq!(ReportCategory::from_completion("<final_answer>null</final_answer>"), None);
        assert_eq!(ReportCategory::from_completion("hardware"), None);
    }

    #[test]
    fn test_collect_sorts_lists() {
        let answer = CategorizedReports::collect(vec![
            ("b.txt".to_string(), Some(ReportCategory::People)),
            ("c.mp3".to_string(), Some(ReportCategory::Hardware)),
            ("a.png".to_string(), Some(ReportCategory::People)),
            ("d.txt".to_string(), None),
        ]);
        assert_eq!(answer.people, vec!["a.png", "b.txt"]);
        assert_eq!(answer.hardware, vec!["c.mp3"]);
    }

    #[tokio::test]
    async fn test_dispatch_by_extension() {
        let dir = std::env::temp_dir().join(format!("reports-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("report.mp3"), b"naprawiono robota").unwrap();
        std::fs::write(dir.join("notes.md"), b"ignored").unwrap();

        let llm = Arc::new(ScriptedClient::new(["<final_answer>hardware</final_answer>"]));
        let use_case = ReportCategoriesUseCase::new(
            offline_hub(),
            llm.clone(),
            Arc::new(EchoTranscriber),
            LLMConfig::default(),
            dir,
        );

        let answer = use_case.categorize_all().await.unwrap();

        assert_eq!(answer.hardware, vec!["report.mp3"]);
        assert!(answer.people.is_empty());
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user.as_deref(), Some("naprawiono robota"));
    }
}
