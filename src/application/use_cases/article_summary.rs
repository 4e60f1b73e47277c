//! Multimodal article questions: summarize each section (text, figures, audio)
//! into one running summary, then answer every question from it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::{to_data_url, HubClient};
use crate::infrastructure::llm_clients::media::AudioTranscriber;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{extract_json_obj, extract_xml_tag, require_completion};
use crate::infrastructure::storage::{ensure_dir, read_text_opt, write_json};

static CONTAINER: Lazy<Selector> = Lazy::new(|| Selector::parse("div.container").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static FIGCAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("figcaption").unwrap());
static SOURCE: Lazy<Selector> = Lazy::new(|| Selector::parse("source").unwrap());

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArticleImage {
    pub url: String,
    pub caption: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ArticleSection {
    pub title: String,
    pub text: String,
    pub images: Vec<ArticleImage>,
    pub audio: Vec<String>,
}

/// `id=question` lines; blank lines are skipped.
pub fn parse_questions(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once('='))
        .map(|(id, question)| (id.trim().to_string(), question.trim().to_string()))
        .collect()
}

/// Splits the article container into titled sections. Content before the
/// first heading is dropped. Media `src` values are resolved against `media_base`.
pub fn parse_sections(html: &str, media_base: &str) -> Vec<ArticleSection> {
    let document = Html::parse_document(html);
    let mut sections = Vec::new();
    if let Some(container) = document.select(&CONTAINER).next() {
        collect_sections(container, None, media_base, &mut sections);
    }
    sections
}

fn collect_sections(
    parent: ElementRef,
    mut current: Option<usize>,
    media_base: &str,
    sections: &mut Vec<ArticleSection>,
) {
    for element in parent.children().filter_map(ElementRef::wrap) {
        let name = element.value().name();

        if HEADINGS.contains(&name) {
            sections.push(ArticleSection {
                title: element.text().collect(),
                ..ArticleSection::default()
            });
            current = Some(sections.len() - 1);
            continue;
        }

        let Some(index) = current else { continue };

        match name {
            "div" => collect_sections(element, current, media_base, sections),
            "figure" => {
                let Some(src) = element
                    .select(&IMG)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                else {
                    continue;
                };
                let caption = element
                    .select(&FIGCAPTION)
                    .next()
                    .map(|c| c.text().collect::<String>())
                    .unwrap_or_default();
                sections[index].images.push(ArticleImage {
                    url: format!("{}/{}", media_base, src),
                    caption,
                });
            }
            "audio" => {
                if let Some(src) = element
                    .select(&SOURCE)
                    .next()
                    .and_then(|source| source.value().attr("src"))
                {
                    sections[index].audio.push(format!("{}/{}", media_base, src));
                }
            }
            _ => {
                let text: String = element.text().collect();
                let section = &mut sections[index];
                if !section.text.is_empty() {
                    section.text.push('\n');
                }
                section.text.push_str(&text);
            }
        }
    }
}

fn question_list(questions: &[&str]) -> String {
    format!("- {}", questions.join("\n- "))
}

fn text_prompt(title: &str, summary: &str, questions: &[&str]) -> String {
    format!(
        r#"User's message will be a section from an article in Polish language. Your job is to extract all key points, that might be useful for answering questions, that will be provided below. Moreover, you will be provided with section title and current summary, which is a summary from previous sections of the article. Use it as a context, to better understand the section.
<rules>
  - Use Polish language
  - Determine key information, that might be useful for answering provided questions
  - Pay attention to provided current summary, and consider it's context, when generating summary for provided secion. Always try to find meaningful information to answer questions first.
  - Always output your brief reasoning about the section and how it relates to the questions first
  - NEVER make points about lack of information as part of summary
  - If there is no useful information in whole source, just output empty string as your summary
  - Current summary might be empty
  - Your final answer should be a bullet point list
</rules>

<questions>
{questions}
</questions>

<current_summary>
{summary}
</current_summary>

<title>
{title}
</title>

<final_answer_format>
<final_answer>
{{generated summary}}
</final_answer>
</final_answer_format>
"#,
        questions = question_list(questions),
    )
}

fn image_prompt(caption: &str, summary: &str, questions: &[&str]) -> String {
    format!(
        r#"User's message will be an image. The image is part of some article, that we're creating a summary about. Your job is to analyse the image and create a list of key points (summary) about what it represents. Focus on the information, that might be useful to answer the questions, that will also be provided. Below, you will be provided with a caption and current summary of the article. Use this as a context to better understand the image.
<rules>
  - Use Polish language
  - Determine key information, that might be useful for answering provided questions
  - Pay attention to provided current summary, and consider it's context, when generating summary for provided image. Always try to find meaningful information to answer questions first.
  - Use provided caption, to better understand the image
  - Describe the image with details, focus on what place it could be, what city, what is happening on the image etc.
  - Make sure you output some possible city, that image could be taken in based on what is on the image and based on current summary
  - Always output your brief reasoning about the image and how it relates to the questions first
  - NEVER make points about lack of information as part of summary
  - If there is no useful information in whole source, just output empty string as your summary
  - Your final answer should be a bullet point list
</rules>

<questions>
{questions}
</questions>

<caption>
{caption}
</caption>

<current_summary>
{summary}
</current_summary>

<final_answer_format>
<final_answer>
{{generated summary}}
</final_answer>
</final_answer_format>
"#,
        questions = question_list(questions),
    )
}

fn audio_prompt(summary: &str, questions: &[&str]) -> String {
    format!(
        r#"User's message will be an audio transcription. The audio is part of some article, that we're creating a summary about. Your job is to analyse the transcription and create a list of key points (summary) about what it is about. Focus on the information, that might be useful to answer the questions, that will also be provided. Below, you will be provided with current summary of the article. Use this as a context to better understand the audio.
<rules>
  - Use Polish language
  - Determine key information, that might be useful for answering provided questions
  - Pay attention to provided current summary, and consider it's context, when generating summary for provided audio transcription. Always try to find meaningful information to answer questions first.
  - Always output your brief reasoning about transcription and how it relates to the questions first
  - NEVER make points about lack of information as part of summary
  - If there is no useful information in whole source, just output empty string as your summary
  - Your final answer should be a bullet point list
</rules>

<questions>
{questions}
</questions>

<current_summary>
{summary}
</current_summary>

<final_answer_format>
<final_answer>
{{generated summary}}
</final_answer>
</final_answer_format>
"#,
        questions = question_list(questions),
    )
}

fn answer_prompt(summary: &str) -> String {
    format!(
        r#"Below, you will find summary of some article. Use this summary as a context to answer questions provided by the user. Questions will be provided as a JSON object with key (id) - value (quesion) pairs.
<rules>
  - Use summary to answer the questions
  - Answer the questions in the as concise way as possible, one sentence max, without any additional comments
  - Not all answers have to be directly included in summary. If it is the case, use your knowledge summary, and other answers, to predict the most probable answer to the question.
  - Respond with JSON where
    - key is the id of the question
    - value is the answer to the corresponding question
  - NEVER add any additional comments
  - Respond with JSON and nothing more
</rules>

<summary>
{summary}
</summary>
"#
    )
}

pub struct ArticleSummaryUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
    config: LLMConfig,
    resources_dir: PathBuf,
}

impl ArticleSummaryUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        transcriber: Arc<dyn AudioTranscriber + Send + Sync>,
        config: LLMConfig,
        resources_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            transcriber,
            config,
            resources_dir,
        }
    }

    fn media_base(&self) -> String {
        format!("{}/dane", self.hub.central_url())
    }

    /// Folds every section into the running summary, in document order.
    pub async fn summarize(&self, sections: &[ArticleSection], questions: &[&str]) -> Result<String> {
        let mut summary = String::new();

        for section in sections {
            let completion = self
                .llm_client
                .generate(
                    &self.config,
                    &text_prompt(&section.title, &summary, questions),
                    &section.text,
                )
                .await?;
            if let Some(points) = extract_xml_tag(&completion, "final_answer") {
                summary.push_str(&format!("\n\n{}\n{}", section.title, points));
            }

            for image in &section.images {
                let fetched = self.hub.fetch_bytes(&image.url).await?;
                let content_type = fetched.content_type.as_deref().unwrap_or("image/png");
                let completion = self
                    .llm_client
                    .generate_with_images(
                        &self.config,
                        &image_prompt(&image.caption, &summary, questions),
                        None,
                        &[to_data_url(content_type, &fetched.bytes)],
                    )
                    .await?;
                if let Some(points) = extract_xml_tag(&completion, "final_answer") {
                    summary.push_str(&format!("\n{}", points));
                }
            }

            for url in &section.audio {
                let fetched = self.hub.fetch_bytes(url).await?;
                let file_name = url.rsplit('/').next().unwrap_or("audio.mp3");
                let transcription = self.transcriber.transcribe(file_name, fetched.bytes).await?;
                let completion = self
                    .llm_client
                    .generate(&self.config, &audio_prompt(&summary, questions), &transcription)
                    .await?;
                if let Some(points) = extract_xml_tag(&completion, "final_answer") {
                    summary.push_str(&format!("\n{}", points));
                }
            }

            info!(section = %section.title, chars = summary.len(), "Summary updated");
        }

        Ok(summary)
    }

    /// Raw article and its parsed sections, kept next to the summary cache.
    async fn save_draft(&self, html: &str, sections: &[ArticleSection]) -> Result<()> {
        ensure_dir(&self.resources_dir).await?;
        tokio::fs::write(self.resources_dir.join("arxiv-draft.html"), html).await?;
        write_json(&self.resources_dir.join("arxiv-draft-parsed.json"), sections).await
    }

    pub async fn execute(&self) -> Result<()> {
        let questions =
            parse_questions(&self.hub.fetch_text(&self.hub.data_file_url("arxiv.txt")).await?);
        info!(?questions, "Questions");
        let question_values: Vec<&str> = questions.values().map(|q| q.as_str()).collect();

        let summary_path = self.resources_dir.join("arxiv-summary.txt");
        let summary = match read_text_opt(&summary_path).await? {
            Some(summary) => {
                info!(path = %summary_path.display(), "Using cached summary");
                summary
            }
            None => {
                let html = self
                    .hub
                    .fetch_text(&format!("{}/arxiv-draft.html", self.media_base()))
                    .await?;
                let sections = parse_sections(&html, &self.media_base());
                if sections.is_empty() {
                    warn!("Article has no titled sections");
                }
                self.save_draft(&html, &sections).await?;

                let summary = self.summarize(&sections, &question_values).await?;
                tokio::fs::write(&summary_path, &summary).await?;
                summary
            }
        };

        let completion = self
            .llm_client
            .generate(
                &self.config,
                &answer_prompt(&summary),
                &serde_json::to_string(&questions)?,
            )
            .await?;
        let completion = require_completion(completion, "Completion")?;
        let answers = extract_json_obj(&completion)?
            .ok_or_else(|| AppError::ParseError("No JSON object in answers".to_string()))?;
        info!(answers = %answers, "Answers");

        self.hub.submit("arxiv", answers, SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hub::testing::offline_hub;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;
    use async_trait::async_trait;

    const ARTICLE: &str = r#"<html><body>
        <h1>Tytuł dokumentu</h1>
        <div class="container">
            <p>Wstęp bez nagłówka</p>
            <h2>Metoda</h2>
            <p>Pierwszy akapit.</p>
            <figure><img src="i/rynek.png" /><figcaption>Rynek w Krakowie</figcaption></figure>
            <div>
                <p>Zagnieżdżony akapit.</p>
                <audio controls><source src="i/rafal.mp3" type="audio/mpeg"></audio>
            </div>
            <h2>Wyniki</h2>
            <p>Truskawka.</p>
            <figure><figcaption>Bez obrazu</figcaption></figure>
        </div>
    </body></html>"#;

    struct NoAudio;

    #[async_trait]
    impl AudioTranscriber for NoAudio {
        async fn transcribe(&self, _file_name: &str, _audio: Vec<u8>) -> Result<String> {
            Err(AppError::Internal("unexpected transcription".to_string()))
        }
    }

    #[test]
    fn test_parse_questions() {
        let questions = parse_questions("01=Jakiego owocu użyto?\n\n02=Gdzie zrobiono zdjęcie?\r\n");
        assert_eq!(questions.len(), 2);
        assert_eq!(questions["01"], "Jakiego owocu użyto?");
        assert_eq!(questions["02"], "Gdzie zrobiono zdjęcie?");
    }

    #[test]
    fn test_parse_sections() {
        let sections = parse_sections(ARTICLE, "https://hub.example/dane");

        assert_eq!(sections.len(), 2);
        let method = &sections[0];
        assert_eq!(method.title, "Metoda");
        assert_eq!(method.text, "Pierwszy akapit.\nZagnieżdżony akapit.");
        assert_eq!(
            method.images,
            vec![ArticleImage {
                url: "https://hub.example/dane/i/rynek.png".to_string(),
                caption: "Rynek w Krakowie".to_string(),
            }]
        );
        assert_eq!(method.audio, vec!["https://hub.example/dane/i/rafal.mp3"]);

        assert_eq!(sections[1].title, "Wyniki");
        assert_eq!(sections[1].text, "Truskawka.");
        assert!(sections[1].images.is_empty());
    }

    #[tokio::test]
    async fn test_summary_accumulates_final_answers() {
        let llm = Arc::new(ScriptedClient::new([
            "Reasoning\n<final_answer>- owoc: truskawka</final_answer>",
            "Nothing useful here",
        ]));
        let use_case = ArticleSummaryUseCase::new(
            offline_hub(),
            llm.clone(),
            Arc::new(NoAudio),
            LLMConfig::default(),
            std::env::temp_dir(),
        );
        let sections = vec![
            ArticleSection {
                title: "Wyniki".to_string(),
                text: "Truskawka.".to_string(),
                ..ArticleSection::default()
            },
            ArticleSection {
                title: "Podsumowanie".to_string(),
                text: "Koniec.".to_string(),
                ..ArticleSection::default()
            },
        ];

        let summary = use_case
            .summarize(&sections, &["Jakiego owocu użyto?"])
            .await
            .unwrap();

        assert_eq!(summary, "\n\nWyniki\n- owoc: truskawka");
        let calls = llm.calls();
        assert!(calls[1].system.contains("- owoc: truskawka"));
        assert!(calls[1].system.contains("- Jakiego owocu użyto?"));
    }

    #[tokio::test]
    async fn test_draft_is_saved_into_missing_dir() {
        let dir = std::env::temp_dir()
            .join(format!("arxiv-{}", uuid::Uuid::new_v4()))
            .join("resources");
        let use_case = ArticleSummaryUseCase::new(
            offline_hub(),
            Arc::new(ScriptedClient::new(Vec::<String>::new())),
            Arc::new(NoAudio),
            LLMConfig::default(),
            dir.clone(),
        );
        let sections = parse_sections(ARTICLE, "https://hub.example/dane");

        use_case.save_draft(ARTICLE, &sections).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.join("arxiv-draft.html")).unwrap(), ARTICLE);
        assert!(dir.join("arxiv-draft-parsed.json").exists());
    }
}
