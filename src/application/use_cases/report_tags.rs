//! Keyword tags for every text report, using all reports and people facts as context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{extract_extension, extract_json_array, require_completion};
use crate::infrastructure::storage::list_files;

pub const TAGS_MODEL: &str = "gpt-4o";

fn tags_prompt(reports: &str, facts: &str) -> String {
    format!(
        r#"You will be provided with a user message in Polish language. The message will be one selected report of reports, that are listed below among with list of facts. Your job is to generate a JSON array of tags, that describe given report based on all reports and facts.

<rules>
  - Make the tags descriptive, that fully describe related subjects
  - Always include information about sectors and places if possible
  - NEVER use generic words like "patrol" or "cisza". Focus on characteristics specific to:
    * People and their roles
    * Specific events
    * Exact locations
    * Technologies/tools
    * Programming languages
    * Sectors
    * Unusal events and information about them
    * Information about research on fidings and suspicious activities in sectors
  - Always generate 10 - 20 tags
  - Tags must be in polish language, all lowercase
</rules>

<steps>
  1. First, determine which subjects are meaningful in the raport, that are specific and unorthodox, that I may want to search for later. Such as places, people, events, sectors, findings during patrols. Output your thoughts
  2. After you determined the subjects, find as much information as possible in the context of listed patrol_reports and facts_about_people. Focus on specific things related to these subjects. Output your thoughts and findings about it.
  3. Having the information, that you found, think what is specific to the subjects and might be helpful in finding them later. Output your thoughts
  4. Based on found information, generate set of tags, that is descriptive and exhaustive and fully describes them in detail. Focus on things like technologies, programming languages, places, sectors, etc. Make sure, these words are not against the rules
  5. Output generated tags in a form of JSON array at the very end
</steps>

<patrol_reports>
{reports}
</patrol_reports>

<facts_about_people>
{facts}
</facts_about_people>

<response_format>
**THOUGHTS ON RELEVANT SUBJECTS**
{{your thoughts}}

**FINDINGS ABOUT RELEVENT SUBJECTS**
{{your findings}}

**THOUGHTS ABOUT PARTICALLY USEFUL INFORMATION**
{{your thoughts}}

RESULT: ["tag 1", "tag 2", "tag 3", ...]
</response_format>"#
    )
}

/// Every matching file in `dir` flattened to one line and listed under its name.
pub async fn load_listing(dir: &Path, only_txt: bool) -> Result<String> {
    let mut contents = String::new();
    for file in list_files(dir).await? {
        if only_txt && extract_extension(&file) != Some("txt") {
            continue;
        }
        let content = tokio::fs::read_to_string(dir.join(&file))
            .await?
            .replace('\n', "");
        if content.is_empty() {
            contents.push_str("- ");
        } else {
            contents.push_str(&format!("\n{}\n- {}", file, content));
        }
    }
    Ok(contents)
}

/// Comma-joined tags from the JSON array closing the completion.
pub fn tags_from_completion(completion: &str) -> Result<String> {
    let tags = extract_json_array(completion)?
        .ok_or_else(|| AppError::ParseError("No tags array in completion".to_string()))?;
    let tags = tags
        .iter()
        .map(|tag| match tag {
            Value::String(tag) => Ok(tag.as_str()),
            other => Err(AppError::ValidationError(format!("Tag is not a string: {}", other))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(tags.join(", "))
}

pub struct ReportTagsUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    factory_dir: PathBuf,
}

impl ReportTagsUseCase {
    /// `factory_dir` holds the `facts` and `reports` directories.
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        factory_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            config: config.with_model(TAGS_MODEL),
            factory_dir,
        }
    }

    pub async fn tag_reports(&self) -> Result<BTreeMap<String, String>> {
        let reports_dir = self.factory_dir.join("reports");
        let facts = load_listing(&self.factory_dir.join("facts"), false).await?;
        let reports = load_listing(&reports_dir, true).await?;
        let system = tags_prompt(&reports, &facts);

        let mut tags = BTreeMap::new();
        for report in list_files(&reports_dir).await? {
            if extract_extension(&report) != Some("txt") {
                continue;
            }
            let content = tokio::fs::read_to_string(reports_dir.join(&report)).await?;
            let completion = self
                .llm_client
                .generate(&self.config, &system, &content)
                .await?;
            let completion = require_completion(completion, "Completion")?;
            info!(report = %report, completion = %completion, "Tagged");

            tags.insert(report, tags_from_completion(&completion)?);
        }
        Ok(tags)
    }

    pub async fn execute(&self) -> Result<()> {
        let tags = self.tag_reports().await?;
        info!(?tags, "Tags");

        self.hub
            .submit("dokumenty", &tags, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    fn factory() -> PathBuf {
        let root = std::env::temp_dir().join(format!("factory-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("facts")).unwrap();
        std::fs::create_dir_all(root.join("reports")).unwrap();
        std::fs::write(root.join("facts/f01.txt"), "Aleksander Ragowski\nnauczyciel").unwrap();
        std::fs::write(root.join("reports/2024-11-12_report-00-sektor_C4.txt"), "Patrol.\nCisza.").unwrap();
        std::fs::write(root.join("reports/2024-11-12_report-13.png"), b"png").unwrap();
        root
    }

    #[test]
    fn test_tags_from_completion() {
        assert_eq!(
            tags_from_completion("RESULT: [\"sektor c4\", \"nauczyciel\"]").unwrap(),
            "sektor c4, nauczyciel"
        );
        assert!(matches!(
            tags_from_completion("RESULT: [\"a\", 3]"),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            tags_from_completion("no tags"),
            Err(AppError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_load_listing_flattens_lines() {
        let root = factory();
        let facts = load_listing(&root.join("facts"), false).await.unwrap();
        assert_eq!(facts, "\nf01.txt\n- Aleksander Ragowskinauczyciel");

        let reports = load_listing(&root.join("reports"), true).await.unwrap();
        assert!(reports.contains("- Patrol.Cisza."));
        assert!(!reports.contains("report-13.png"));
    }

    #[tokio::test]
    async fn test_only_text_reports_are_tagged() {
        let llm = Arc::new(ScriptedClient::new(["RESULT: [\"sektor c4\", \"patrol nocny\"]"]));
        let use_case =
            ReportTagsUseCase::new(offline_hub(), llm.clone(), LLMConfig::default(), factory());

        let tags = use_case.tag_reports().await.unwrap();

        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags["2024-11-12_report-00-sektor_C4.txt"],
            "sektor c4, patrol nocny"
        );
        let calls = llm.calls();
        assert_eq!(calls[0].model, "gpt-4o");
        assert!(calls[0].system.contains("Aleksander Ragowskinauczyciel"));
    }
}
