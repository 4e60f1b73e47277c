use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which grading host receives a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitTarget {
    Poligon,
    #[default]
    Central,
}

#[derive(Debug, Serialize)]
pub struct Submission<'a, T: Serialize> {
    pub apikey: &'a str,
    pub task: &'a str,
    pub answer: T,
}

/// Reply of the report, people and places endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbReply {
    #[serde(default)]
    pub reply: Vec<Map<String, Value>>,
    #[serde(default)]
    pub error: String,
}

impl DbReply {
    /// String value of `column` in the first row.
    pub fn first_str(&self, column: &str) -> Option<&str> {
        self.reply
            .first()
            .and_then(|row| row.get(column))
            .and_then(|value| value.as_str())
    }

    pub fn column(&self, column: &str) -> Vec<Value> {
        self.reply
            .iter()
            .filter_map(|row| row.get(column).cloned())
            .collect()
    }
}
