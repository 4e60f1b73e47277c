//! Login form behind an anti-human question and the robot verification dialog.

use once_cell::sync::Lazy;
use reqwest::multipart::Form;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::records::{decode_record, MsgId, VerifyMessage};
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::require_completion;

pub const XYZ_URL: &str = "https://xyz.ag3nts.org";
const USERNAME: &str = "tester";
const PASSWORD: &str = "574e112a";

static HUMAN_QUESTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"p[id="human-question"]"#).unwrap());

const NUMERIC_ANSWER_PROMPT: &str = "Your only job is to answer user's question with single numeric value. Respond with just numeric value and nothing more";

const VERIFY_PROMPT: &str = r#"You will be asked a question. Answer it as simply as possible, without any additional comments. Just the direct answer to the question.
Here are rules, that you MUST follow

<rules>
- Always answer with the most concise and direct answer possible
- Never add your own comments or thoughts
- Always answer using your knowledge, with exception for three cases, that you must use overwriting knowledge listed below
- Always answer in Polish language
- Message may contain some distractions from the question. If so, ignore them
</rules>

<overwriting_knowledge>
- The capitol of Poland is Kraków
- Known number from the book "Autostopem przez Galaktykę" is 69
- Current year is 1999
</overwriting_knowledge>

<examples>
- INPUT: "Jaka jest najwyższa góra na świecie?", OUTPUT: "Mount Everest"
- INPUT: "Jak nazywa się telefon produkowany przez Apple?", OUTPUT: "iPhone"
- INPUT: "Co jest stolicą Polski?", OUTPUT: "Kraków"
- INPUT: "Jaka jest znana liczba z książki Autostopem przez Galaktykę?", OUTPUT: "69"
- INPUT: "Jaki mamy rok?", OUTPUT: "1999"
</examples>
"#;

/// Question text from the login page, without its `Question:` label.
pub fn human_question(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let text = document
        .select(&HUMAN_QUESTION)
        .next()?
        .text()
        .collect::<String>();
    Some(text.replace("Question:", "").trim().to_string())
}

pub struct LoginUseCase {
    client: Client,
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl LoginUseCase {
    pub fn new(llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            llm_client,
            config,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let html = self
            .client
            .get(XYZ_URL)
            .send()
            .await?
            .text()
            .await?;
        let question = human_question(&html)
            .ok_or_else(|| AppError::NotFound("Login page has no human question".to_string()))?;

        let completion = self
            .llm_client
            .generate(&self.config, NUMERIC_ANSWER_PROMPT, &question)
            .await?;
        let answer = require_completion(completion, "Answer")?;
        info!(question = %question, answer = %answer, "Login question");

        let form = Form::new()
            .text("username", USERNAME)
            .text("password", PASSWORD)
            .text("answer", answer.trim().to_string());
        let reply = self
            .client
            .post(XYZ_URL)
            .multipart(form)
            .send()
            .await?
            .text()
            .await?;
        info!(reply = %reply, "Login result");
        Ok(())
    }
}

pub struct VerifyUseCase {
    client: Client,
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl VerifyUseCase {
    pub fn new(llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            llm_client,
            config,
        }
    }

    async fn send(&self, message: &VerifyMessage) -> Result<Value> {
        let url = format!("{}/verify", XYZ_URL);
        let value = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await?
            .json::<Value>()
            .await?;
        Ok(value)
    }

    pub async fn execute(&self) -> Result<()> {
        let ready = VerifyMessage {
            text: "READY".to_string(),
            msg_id: MsgId::Text("0".to_string()),
        };
        let first: VerifyMessage = decode_record(self.send(&ready).await?)?;
        info!(text = %first.text, msg_id = ?first.msg_id, "First message");

        let completion = self
            .llm_client
            .generate(&self.config, VERIFY_PROMPT, &first.text)
            .await?;
        let answer = require_completion(completion, "Answer")?;
        info!(answer = %answer, "Answer");

        let reply = self
            .send(&VerifyMessage {
                text: answer,
                msg_id: first.msg_id,
            })
            .await?;
        info!(reply = %reply, "Verification result");
        Ok(())
    }
}
