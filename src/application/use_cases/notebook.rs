//! Notebook questions: answer from the extracted PDF text page by page, falling
//! back to the rendered image of the last page.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::{LLMConfig, VISION_MODEL};
use crate::domain::records::ResultObj;
use crate::infrastructure::hub::{to_data_url, HubClient};
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::pdf::extract_pages;
use crate::infrastructure::response::{completion_record, require_completion};
use crate::infrastructure::storage::{list_files, JsonCache};

pub const NOTEBOOK_PDF: &str = "Notes Rafała.pdf";
const PARSED_TEXT: &str = "notes-rafala-parsed.txt";
const PAGE_IMAGES_DIR: &str = "notes-rafala-images";
const ANSWER_CACHE: &str = "notes-rafala-cache.json";

fn chunk_prompt(chunk: &str, previous: &str) -> String {
    format!(
        r#"User's message will be a question about the notebook. It is a notebook of Rafal - a fictional character from a story about AI and robots. Below, you will be provided with a chunk of the notebook. Your job is to determine if user's question can be answered with your knowledge and knowledge from notebook chunk. If so, answer it, if not, return null in final JSON.

<rules>
  - First, analyse the notebook current chunk content and output your thoughts and reasoning about any information, that might be useful.
  - You will also find notebook_previous_chunk_contents, use it as helper, but focus on notebook_current_chunk_content
  - The notebook is scratched, so some information might not be clear and blurred with ex. "...". Do not treat this as a concrete information, use just as a hint.
  - Take your time and analyse the note content very carefully and in detail. Output all of your thoughts.
  - Pay special attention to events, facts, occurancess. Especially things like LLM models announcments and releases (ex. GPT), etc., that are mentioned in the notebook. These are your main indicators of the time
    - Use your knowledge about these facts and events. Think about them and output, what you know about them - all dates, years, places, etc.
    - Be as exact as possible, when thinking about events, facts, etc. Give exact dates, years, places etc.
    - The answers might not be directly stated in note chunk. So if you can deduct the answer (because you know the year, when some even happened) from given information - use it as answer
    - Try to use your knowledge to answer the question based on the information you have about events, etc. Do not try to find exact answer, if you though of the answer based on your knowledge - use it as answer
    - If you know something like year, or place, based on you knowledge, that might be the answer - DO NOT say that, you don't have enough information - just answer the question with what you have
    - DO NOT try to find exact, direct answer in note - if you can deduct something, that might be the answer, based on you knowledge - ALWAYS USE IT
    - Use this information about events, facts, etc. as your prior indicator of time and place. Treat it as your most reliable information
  - If the question is about a place, describe the place in a sentence. Be specific about what you know about the place. It does not have to be exactly pointed out in text, what is the name of the place. It can be just some characteristics of the place. Try to use Sigla/Siglum
  - NEVER give non direct or unclear answers like (... "lub" ..., "prawdopodobnie", "około", etc.)
  - Output all your thinking and reasoning in <THINKING>...</THINKING> tags
  - After you are done thinking, answer user's question in concise way
  - Use polish language in your answer
  - When answering question, focus not only on provided notebook but also on your knowledge
  - If you are able to answer based on delivered notebook chnunk, do so, if not, return null as "result" field in final_response_format JSON
  - ALWAYS use final_response_format for your final JSON output
  - YOU MUST end your response with final_response_format JSON without markdown code block
</rules>

<notebook_chunk_content>
{chunk}
</notebook_chunk_content>

<notebook_previous_chunk_contents>
{previous}
</notebook_previous_chunk_contents>

<final_response_format>
{{
  "result": "{{answer to question}}" | null
}}
</final_response_format>
"#
    )
}

const IMAGE_PROMPT: &str = r#"User's message will be an image and a question about the notebook. The image is a chunk from a notebook of Rafal - a fictional character from a story about AI and robots. Below, you will be provided with a chunk of the notebook. Your job is to determine if user's question can be answered with your knowledge and knowledge from notebook chunk image. If so, answer it, if not, return null in final JSON.

<rules>
  - First, analyse the notebook chunk image and output your thoughts and reasoning about any information, that might be useful.
  - The notebook is scratched, so some information might not be clear and blurred with ex. "...". Do not treat this as a concrete information, use just as a hint.
  - Take your time and analyse the note content very carefully and in detail. Output all of your thoughts.
  - Pay special attention to events, facts, occurancess. Especially things like LLM models announcments and releases (ex. GPT), etc., that are mentioned in the notebook. These are your main indicators of the time
    - Use your knowledge about these facts and events. Think about them and output, what you know about them - all dates, years, places, etc.
    - Be as exact as possible, when thinking about events, facts, etc. Give exact dates, years, places etc.
    - The answers might not be directly stated in note chunk. So if you can deduct the answer (because you know the year, when some even happened) from given information - use it as answer
    - Try to use your knowledge to answer the question based on the information you have about events, etc. Do not try to find exact answer, if you though of the answer based on your knowledge - use it as answer
    - If you know something like year, or place, based on you knowledge, that might be the answer - DO NOT say that, you don't have enough information - just answer the question with what you have
    - DO NOT try to find exact, direct answer in note - if you can deduct something, that might be the answer, based on you knowledge - ALWAYS USE IT
    - Use this information about events, facts, etc. as your prior indicator of time and place. Treat it as your most reliable information
  - If the question is about a place, describe the place in a short sentence. It does not have to be exactly pointed out in text, what is the name of the place. It can be just some characteristics of the place
  - NEVER give non direct or unclear answers like (... "lub" ..., "prawdopodobnie", "około", etc.)
  - Output all your thinking and reasoning in <THINKING>...</THINKING> tags
  - After you are done thinking, answer user's question in concise way
  - Use polish language in your answer
  - When answering question, focus not only on provided notebook but also on your knowledge
  - If you are able to answer based on delivered notebook chnunk, do so, if not, return null as "result" field in final_response_format JSON
  - ALWAYS use final_response_format for your final JSON output
  - YOU MUST end your response with final_response_format JSON without markdown code block
</rules>

<final_response_format>
{
  "result": "{answer to question}" | null
}
</final_response_format>
"#;

/// Page number of a rendered page image named like `page.12.png`.
pub fn page_index(file_name: &str) -> Option<u32> {
    file_name.split('.').nth(1)?.parse().ok()
}

/// Rendered page with the highest page number.
pub fn last_page_image(mut files: Vec<String>) -> Option<String> {
    files.retain(|file| page_index(file).is_some());
    files.sort_by_key(|file| page_index(file));
    files.pop()
}

pub struct NotebookQa {
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl NotebookQa {
    pub fn new(llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            llm_client,
            config: config.with_model(VISION_MODEL),
        }
    }

    /// Asks chunk by chunk, each prompt carrying the chunks already tried.
    /// Stops at the first non-null answer.
    pub async fn ask_chunks(&self, question: &str, chunks: &[String]) -> Result<Option<String>> {
        let mut previous = String::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let completion = self
                .llm_client
                .generate(&self.config, &chunk_prompt(chunk, &previous), question)
                .await?;
            let completion = require_completion(completion, "Completion")?;
            info!(question, chunk = idx, completion = %completion, "Chunk answer");

            let answer: ResultObj = completion_record(&completion)?;
            if let Some(result) = answer.result.filter(|r| !r.trim().is_empty()) {
                return Ok(Some(result));
            }
            previous.push_str(&format!("\n\n{}", chunk));
        }
        Ok(None)
    }

    pub async fn ask_image(&self, question: &str, png: &[u8]) -> Result<Option<String>> {
        let completion = self
            .llm_client
            .generate_with_images(
                &self.config,
                IMAGE_PROMPT,
                Some(question),
                &[to_data_url("image/png", png)],
            )
            .await?;
        let completion = require_completion(completion, "Image completion")?;
        info!(question, completion = %completion, "Image answer");

        let answer: ResultObj = completion_record(&completion)?;
        Ok(answer.result.filter(|r| !r.trim().is_empty()))
    }
}

pub struct NotebookUseCase {
    hub: Arc<HubClient>,
    qa: NotebookQa,
    resources_dir: PathBuf,
}

impl NotebookUseCase {
    pub fn new(hub: Arc<HubClient>, qa: NotebookQa, resources_dir: PathBuf) -> Self {
        Self {
            hub,
            qa,
            resources_dir,
        }
    }

    async fn page_chunks(&self) -> Result<Vec<String>> {
        let pages = extract_pages(&self.resources_dir.join(NOTEBOOK_PDF))?;
        let chunks: Vec<String> = pages
            .into_iter()
            .map(|page| page.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        let parsed_path = self.resources_dir.join(PARSED_TEXT);
        if !parsed_path.exists() {
            tokio::fs::write(&parsed_path, chunks.join("\n\n")).await?;
        }
        Ok(chunks)
    }

    async fn last_page(&self) -> Result<Option<Vec<u8>>> {
        let dir = self.resources_dir.join(PAGE_IMAGES_DIR);
        match last_page_image(list_files(&dir).await?) {
            Some(file) => Ok(Some(tokio::fs::read(dir.join(file)).await?)),
            None => Ok(None),
        }
    }

    pub async fn answer(&self, question: &str, chunks: &[String]) -> Result<String> {
        if let Some(answer) = self.qa.ask_chunks(question, chunks).await? {
            return Ok(answer);
        }

        let answer = match self.last_page().await? {
            Some(png) => self.qa.ask_image(question, &png).await?,
            None => {
                warn!("No rendered notebook pages to fall back on");
                None
            }
        };
        answer.ok_or_else(|| AppError::NotFound(format!("Not Found answer for question: {}", question)))
    }

    pub async fn execute(&self) -> Result<()> {
        let questions: BTreeMap<String, String> = self
            .hub
            .fetch_json(&self.hub.data_file_url("notes.json"))
            .await?;
        info!(?questions, "Questions");

        let chunks = self.page_chunks().await?;
        let mut cache = JsonCache::load(self.resources_dir.join(ANSWER_CACHE)).await?;

        let mut answers = BTreeMap::new();
        for (id, question) in &questions {
            if let Some(cached) = cache.get(id) {
                answers.insert(id.clone(), cached.to_string());
                continue;
            }

            let answer = self.answer(question, &chunks).await?;
            cache.insert(id.clone(), answer.clone());
            cache.save().await?;
            answers.insert(id.clone(), answer);
        }

        info!(?answers, "Answers");
        self.hub.submit("notes", &answers, SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    fn chunks() -> Vec<String> {
        vec!["Strona pierwsza".to_string(), "Strona druga".to_string()]
    }

    #[test]
    fn test_last_page_image_sorts_numerically() {
        let files = vec![
            "page.2.png".to_string(),
            "page.10.png".to_string(),
            "page.9.png".to_string(),
            "notes.txt".to_string(),
        ];
        assert_eq!(last_page_image(files).as_deref(), Some("page.10.png"));
        assert_eq!(last_page_image(Vec::new()), None);
        assert_eq!(page_index("page.3.png"), Some(3));
        assert_eq!(page_index("cover.png"), None);
    }

    #[tokio::test]
    async fn test_chunks_accumulate_until_answered() {
        let llm = Arc::new(ScriptedClient::new([
            "<THINKING>nic</THINKING>\n{ \"result\": null }",
            "<THINKING>rok</THINKING>\n{ \"result\": \"2019\" }",
        ]));
        let qa = NotebookQa::new(llm.clone(), LLMConfig::default());

        let answer = qa.ask_chunks("Do którego roku przeniósł się Rafał?", &chunks()).await.unwrap();

        assert_eq!(answer.as_deref(), Some("2019"));
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, VISION_MODEL);
        assert!(calls[1].system.contains("<notebook_previous_chunk_contents>\n\n\nStrona pierwsza"));
        assert_eq!(calls[1].user.as_deref(), Some("Do którego roku przeniósł się Rafał?"));
    }

    #[tokio::test]
    async fn test_falls_back_to_last_page_image() {
        let dir = std::env::temp_dir().join(format!("notes-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join(PAGE_IMAGES_DIR)).unwrap();
        std::fs::write(dir.join(PAGE_IMAGES_DIR).join("page.19.png"), b"last").unwrap();
        std::fs::write(dir.join(PAGE_IMAGES_DIR).join("page.2.png"), b"first").unwrap();

        let llm = Arc::new(ScriptedClient::new([
            "{ \"result\": null }",
            "{ \"result\": \"Lubawa\" }",
        ]));
        let use_case = NotebookUseCase::new(
            offline_hub(),
            NotebookQa::new(llm.clone(), LLMConfig::default()),
            dir,
        );

        let answer = use_case
            .answer("Gdzie się ukrył?", &["Strona".to_string()])
            .await
            .unwrap();

        assert_eq!(answer, "Lubawa");
        let calls = llm.calls();
        assert_eq!(calls[1].images, 1);
        assert_eq!(calls[1].user.as_deref(), Some("Gdzie się ukrył?"));
    }

    #[tokio::test]
    async fn test_no_answer_anywhere_is_not_found() {
        let dir = std::env::temp_dir().join(format!("notes-empty-{}", uuid::Uuid::new_v4()));
        let llm = Arc::new(ScriptedClient::new(["{ \"result\": null }"]));
        let use_case = NotebookUseCase::new(
            offline_hub(),
            NotebookQa::new(llm, LLMConfig::default()),
            dir,
        );

        let result = use_case.answer("?", &["Strona".to_string()]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
