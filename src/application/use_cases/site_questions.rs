//! Question answering over a website: the model reads one page at a time and
//! either answers or names the next page to open.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::use_cases::web_crawler::{
    HttpFetcher, LinkPolicy, SharedPageFetcher, WebCrawler,
};
use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::domain::records::ProcessedPage;
use crate::infrastructure::html::to_markdown;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::completion_record;

pub const SOFTO_URL: &str = "https://softo.ag3nts.org";
pub const DENIED_PATHS: &[&str] = &["/cennik", "/loop"];
/// Page requests allowed per question.
pub const REQUEST_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaOutcome {
    Answered(String),
    /// The model found neither an answer nor a usable next page.
    Exhausted,
    LimitExceeded,
    LoopDetected,
}

fn process_page_prompt(question: &str) -> String {
    format!(
        r#"You will be provided with web page context, which is parsed to markdown format. Your main goal is to answer the question, that is specified below. If current page content provides enough information, answer the question. If it doesn't, decide, which of liked pages should be checked for the answer next and return it's url.
<rules>
  - Analyse the page content and output your thinking and reasoning about the page in context of the question.
  - After your reasoning, return final answer in form of JSON
  - ALWAYS return JSON at the end with either answer to the question, or a link to the next page, that should be analysed and which is the most probable to have the answer inside
  - If you can't answer the question and you can't find any link with potential answer inside, return JSON with just null values
  - The answer should be concise and shouldn't include any additional comments.
</rules>

<final_answer_format>
{{
  "answer": null | "{{answer to the question}}"
  "nextPage": null | "{{link the next page, that should be analysed}}"
}}
</final_answer_format>

<question>
{question}
</question>

<example_outputs>
  - {{ "answer": "This is the answer to the question", "nextPage": null }}
  - {{ "answer": null, "nextPage": "/some-page" }}
  - {{ "answer": null, "nextPage": null }}
</example_outputs>"#
    )
}

pub struct SiteQuestions {
    fetcher: SharedPageFetcher,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    base_url: String,
    pages: HashMap<String, String>,
}

impl SiteQuestions {
    pub fn new(
        fetcher: SharedPageFetcher,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        base_url: &str,
    ) -> Self {
        Self {
            fetcher,
            llm_client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            pages: HashMap::new(),
        }
    }

    /// Walks the site from the base URL until the question is answered or a guard trips.
    pub async fn answer(&mut self, question: &str) -> Result<QaOutcome> {
        let system = process_page_prompt(question);
        let mut visited: Vec<String> = Vec::new();
        let mut requests = 0usize;
        let mut next = Some(self.base_url.clone());

        while let Some(url) = next.take() {
            requests += 1;
            if requests > REQUEST_LIMIT {
                warn!(question, requests, "Request limit exceeded");
                return Ok(QaOutcome::LimitExceeded);
            }
            if visited.contains(&url) {
                warn!(question, url = %url, "Page already visited for this question");
                return Ok(QaOutcome::LoopDetected);
            }

            let markdown = self.page(&url).await?;
            visited.push(url.clone());

            let completion = self
                .llm_client
                .generate(&self.config, &system, &markdown)
                .await?;
            info!(url = %url, completion = %completion, "Processed page");

            let page: ProcessedPage = completion_record(&completion)?;
            if let Some(answer) = page.answer.filter(|a| !a.trim().is_empty()) {
                return Ok(QaOutcome::Answered(answer));
            }
            next = page.next_page.and_then(|next_page| self.next_url(&next_page));
        }

        Ok(QaOutcome::Exhausted)
    }

    fn next_url(&self, next_page: &str) -> Option<String> {
        if next_page.starts_with(&self.base_url) {
            Some(next_page.to_string())
        } else if next_page.starts_with('/') {
            Some(format!("{}{}", self.base_url, next_page))
        } else {
            None
        }
    }

    async fn page(&mut self, url: &str) -> Result<String> {
        if let Some(markdown) = self.pages.get(url) {
            return Ok(markdown.clone());
        }
        let html = self.fetcher.fetch_html(url).await?;
        let markdown = to_markdown(&html);
        self.pages.insert(url.to_string(), markdown.clone());
        Ok(markdown)
    }
}

pub struct SoftoUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    site_dir: std::path::PathBuf,
}

impl SoftoUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        site_dir: std::path::PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            config,
            site_dir,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let questions: BTreeMap<String, String> = self
            .hub
            .fetch_json(&self.hub.data_file_url("softo.json"))
            .await?;
        info!(?questions, "Questions");

        let fetcher: SharedPageFetcher = Arc::new(HttpFetcher::new());

        let crawler = WebCrawler::new(
            fetcher.clone(),
            LinkPolicy::new(SOFTO_URL, DENIED_PATHS),
            self.site_dir.clone(),
        );
        let pages = crawler.crawl_site().await?;
        info!(pages = pages.len(), dir = %crawler.output_dir().display(), "Site saved");

        let mut site = SiteQuestions::new(
            fetcher,
            self.llm_client.clone(),
            self.config.clone(),
            SOFTO_URL,
        );
        let mut answers = BTreeMap::new();
        for (id, question) in &questions {
            match site.answer(question).await? {
                QaOutcome::Answered(answer) => {
                    info!(id = %id, answer = %answer, "Answer found");
                    answers.insert(id.clone(), answer);
                }
                other => {
                    return Err(AppError::NotFound(format!(
                        "No answer for question {} ({:?})",
                        id, other
                    )));
                }
            }
        }

        info!(?answers, "Answers");
        self.hub
            .submit("softo", &answers, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::web_crawler::testing::StaticSite;
    use crate::infrastructure::llm_clients::testing::ScriptedClient;

    const BASE: &str = "https://softo.example";

    fn site() -> Arc<StaticSite> {
        Arc::new(StaticSite::new(&[
            (BASE, "<body><h1>Start</h1><a href=\"/a\">A</a></body>"),
            ("https://softo.example/a", "<body><p>Page A</p></body>"),
            ("https://softo.example/b", "<body><p>Page B</p></body>"),
            ("https://softo.example/c", "<body><p>Page C</p></body>"),
            ("https://softo.example/d", "<body><p>Page D</p></body>"),
            ("https://softo.example/e", "<body><p>Page E</p></body>"),
        ]))
    }

    fn next(page: &str) -> String {
        format!("Thinking...\n{{ \"answer\": null, \"nextPage\": \"{}\" }}", page)
    }

    fn questions(
        site: Arc<StaticSite>,
        replies: Vec<String>,
    ) -> (SiteQuestions, Arc<ScriptedClient>) {
        let llm = Arc::new(ScriptedClient::new(replies));
        let qa = SiteQuestions::new(site, llm.clone(), LLMConfig::default(), BASE);
        (qa, llm)
    }

    #[tokio::test]
    async fn test_answer_after_following_links() {
        let (mut qa, llm) = questions(
            site(),
            vec![
                next("/a"),
                next("https://softo.example/b"),
                r#"{ "answer": "kontakt@softo.example", "nextPage": null }"#.to_string(),
            ],
        );

        let outcome = qa.answer("Podaj adres e-mail").await.unwrap();

        assert_eq!(outcome, QaOutcome::Answered("kontakt@softo.example".to_string()));
        let calls = llm.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].user.as_deref(), Some("Page A"));
        assert!(calls[0].system.contains("Podaj adres e-mail"));
    }

    #[tokio::test]
    async fn test_sixth_request_exceeds_limit() {
        let (mut qa, llm) = questions(
            site(),
            vec![next("/a"), next("/b"), next("/c"), next("/d"), next("/e")],
        );

        let outcome = qa.answer("q").await.unwrap();

        assert_eq!(outcome, QaOutcome::LimitExceeded);
        assert_eq!(llm.calls().len(), REQUEST_LIMIT);
    }

    #[tokio::test]
    async fn test_revisit_is_loop() {
        let (mut qa, llm) = questions(site(), vec![next("/a"), next("/b"), next("/a")]);
        assert_eq!(qa.answer("q").await.unwrap(), QaOutcome::LoopDetected);
        assert_eq!(llm.calls().len(), 3);

        let (mut qa, _) = questions(site(), vec![next("/a"), next(BASE)]);
        assert_eq!(qa.answer("q").await.unwrap(), QaOutcome::LoopDetected);
    }

    #[tokio::test]
    async fn test_unusable_next_page_is_exhausted() {
        let (mut qa, _) = questions(
            site(),
            vec![next("https://elsewhere.example/x")],
        );
        assert_eq!(qa.answer("q").await.unwrap(), QaOutcome::Exhausted);

        let (mut qa, _) = questions(
            site(),
            vec![r#"{ "answer": null, "nextPage": null }"#.to_string()],
        );
        assert_eq!(qa.answer("q").await.unwrap(), QaOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_pages_are_cached_across_questions() {
        let site = site();
        let (mut qa, _) = questions(
            site.clone(),
            vec![
                r#"{ "answer": "one", "nextPage": null }"#.to_string(),
                r#"{ "answer": "two", "nextPage": null }"#.to_string(),
            ],
        );

        qa.answer("first").await.unwrap();
        qa.answer("second").await.unwrap();

        assert_eq!(site.requests(), vec![BASE.to_string()]);
    }
}
