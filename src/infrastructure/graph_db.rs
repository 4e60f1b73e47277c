//! Neo4j through the HTTP transactional endpoint (`/db/<name>/tx/commit`).
//!
//! Every call commits on its own, so there is no session state to release.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
pub struct StatementResult {
    pub columns: Vec<String>,
    pub data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
pub struct RowData {
    pub row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

impl StatementResult {
    /// Value of `column` in every returned row.
    pub fn column(&self, column: &str) -> Vec<Value> {
        let Some(idx) = self.columns.iter().position(|c| c == column) else {
            return Vec::new();
        };
        self.data
            .iter()
            .filter_map(|row| row.row.get(idx).cloned())
            .collect()
    }
}

pub struct GraphDb {
    client: Client,
    commit_url: String,
    username: String,
    password: String,
}

impl GraphDb {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            client: Client::new(),
            commit_url: format!("{}/db/neo4j/tx/commit", base_url.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub async fn run(&self, statement: &str, parameters: Value) -> Result<StatementResult> {
        debug!(statement, "Running cypher");
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Graph request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::DatabaseError(format!(
                "Graph database error ({}): {}",
                status, text
            )));
        }

        let commit: CommitResponse = response.json().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to parse graph response: {}", e))
        })?;
        into_single_result(commit)
    }
}

fn into_single_result(commit: CommitResponse) -> Result<StatementResult> {
    if let Some(err) = commit.errors.into_iter().next() {
        return Err(AppError::DatabaseError(format!("{}: {}", err.code, err.message)));
    }
    commit
        .results
        .into_iter()
        .next()
        .ok_or_else(|| AppError::DatabaseError("Graph response has no results".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup() {
        let commit: CommitResponse = serde_json::from_value(json!({
            "results": [{
                "columns": ["users"],
                "data": [{ "row": [[{ "id": "28", "username": "Rafał" }]], "meta": [] }]
            }],
            "errors": []
        }))
        .unwrap();
        let result = into_single_result(commit).unwrap();
        assert_eq!(
            result.column("users"),
            vec![json!([{ "id": "28", "username": "Rafał" }])]
        );
        assert!(result.column("missing").is_empty());
    }

    #[test]
    fn test_errors_are_surfaced() {
        let commit: CommitResponse = serde_json::from_value(json!({
            "results": [],
            "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
        }))
        .unwrap();
        let err = into_single_result(commit).unwrap_err();
        assert!(err.to_string().contains("SyntaxError"));
    }
}
