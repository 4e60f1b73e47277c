//! Calibration file repair: recompute additions and answer the embedded open questions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{extract_json_array, require_completion};

const OPEN_QUESTIONS_PROMPT: &str = r#"You will be provided with a JSON array. The array items will have this structure: { q: "question", idx: some number }. Your job is to answer the question stored in "q" for each element in array. Place your answer in the object, that you are working on, in field called "a". Leave the "idx" value as is.

<rules>
- You have to answer "q" with the most concise and direct answer possible
- Never add your own comments, or thoughts, when answering the question
- Skip interpunction and all this kind of characters, when answering the question
- Question "q" must be answererd for each array element
- Your answer must be placed in new field "a", placed in the same object as the question "q"
- You must add field "a" to each object
- You must leave field "idx" untouched
- You must answer with JSON array, that matches the input array, but with included "a" fields, and nothing more
</rules>

<example>
- INPUT: '[{ "q": "What is the capitol of Poland?", "idx": 3 }, { "q": "What is the highest mountain in the world?", "idx": 5 }]'
- OUTPUT: '[{ "q": "What is the capitol of Poland?", "a": "Warsaw", "idx": 3 }, { "q": "What is the highest mountain in the world?", "a": "Mount Everest" "idx": 5 }]'
</example>"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationData {
    #[serde(rename = "test-data")]
    pub test_data: Vec<TestItem>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestItem {
    pub question: String,
    pub answer: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<OpenTest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenTest {
    pub q: String,
    #[serde(default)]
    pub a: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenQuestion {
    pub q: String,
    pub idx: usize,
}

#[derive(Debug, Deserialize)]
struct AnsweredQuestion {
    q: String,
    a: String,
    idx: usize,
}

impl CalibrationData {
    /// Fixes every `a + b` answer in place and returns the open questions to ask.
    pub fn fix_answers(&mut self) -> Result<Vec<OpenQuestion>> {
        let mut open = Vec::new();
        for (idx, item) in self.test_data.iter_mut().enumerate() {
            let (a, b) = item
                .question
                .split_once(" + ")
                .ok_or_else(|| AppError::ValidationError("Incorrect addition values".to_string()))?;
            item.answer = parse_operand(a)? + parse_operand(b)?;
            if let Some(test) = &item.test {
                open.push(OpenQuestion {
                    q: test.q.clone(),
                    idx,
                });
            }
        }
        Ok(open)
    }

    /// Puts answered open questions back at their original positions.
    pub fn merge_answers(&mut self, answered: Vec<Value>) -> Result<()> {
        for value in answered {
            let answer: AnsweredQuestion = serde_json::from_value(value)
                .map_err(|e| AppError::ValidationError(format!("Invalid answer: {}", e)))?;
            let item = self.test_data.get_mut(answer.idx).ok_or_else(|| {
                AppError::ValidationError(format!("Answer index {} out of range", answer.idx))
            })?;
            item.test = Some(OpenTest {
                q: answer.q,
                a: answer.a,
            });
        }
        Ok(())
    }
}

fn parse_operand(value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::ValidationError(format!("Incorrect addition value: {}", value)))
}

pub struct CalibrationUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl CalibrationUseCase {
    pub fn new(hub: Arc<HubClient>, llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            hub,
            llm_client,
            config,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let mut data: CalibrationData = self
            .hub
            .fetch_json(&self.hub.data_file_url("json.txt"))
            .await?;

        let open = data.fix_answers()?;
        let completion = self
            .llm_client
            .generate(
                &self.config,
                OPEN_QUESTIONS_PROMPT,
                &serde_json::to_string(&open)?,
            )
            .await?;
        let completion = require_completion(completion, "Completion")?;
        info!(completion = %completion, "Open questions answered");

        let answered = extract_json_array(&completion)?
            .ok_or_else(|| AppError::ParseError("No JSON array in completion".to_string()))?;
        data.merge_answers(answered)?;
        data.rest.insert(
            "apikey".to_string(),
            Value::String(self.hub.api_key().to_string()),
        );

        self.hub
            .submit("JSON", &data, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}
