use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::{DbReply, SubmitTarget};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::HubClient;
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::{require_completion, strip_code_fence};

const DB_TASK: &str = "database";
const REQUEST: &str = "Select datacenters, that are active, and which managers are inactive.";

fn sql_prompt(users_definition: &str, datacenters_definition: &str) -> String {
    format!(
        r#"Your job is to create an SQL query to database, that will match the user request. Below, there are an SQL queries, that were used to create tables, that you operate on. Use them to determina table structure, which you will use to generate SQL for the user. Return just the SQL query and nothing more. Do not include any comments, skip markdown code block wrapper.

<users_table_create_query>
{users_definition}
</users_table_create_query>

<datacenters_table_create_query>
{datacenters_definition}
</datacenters_table_create_query>"#
    )
}

/// `Create Table` statement from a `SHOW CREATE TABLE` reply.
pub fn table_definition(reply: &DbReply, table: &str) -> Result<String> {
    reply
        .first_str("Create Table")
        .map(|definition| definition.to_string())
        .ok_or_else(|| AppError::DatabaseError(format!("No definition for table {}", table)))
}

/// Generates SQL against the hub database from the live schema and submits the matching ids.
pub struct DatacentersUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
}

impl DatacentersUseCase {
    pub fn new(hub: Arc<HubClient>, llm_client: SharedLLMClient, config: LLMConfig) -> Self {
        Self {
            hub,
            llm_client,
            config,
        }
    }

    async fn definition(&self, table: &str) -> Result<String> {
        let reply = self
            .hub
            .query_db(DB_TASK, &format!("SHOW CREATE TABLE {}", table))
            .await?;
        table_definition(&reply, table)
    }

    pub async fn execute(&self) -> Result<()> {
        let users = self.definition("users").await?;
        let datacenters = self.definition("datacenters").await?;

        let completion = self
            .llm_client
            .generate(&self.config, &sql_prompt(&users, &datacenters), REQUEST)
            .await?;
        let sql = strip_code_fence(&require_completion(completion, "Completion")?);
        info!(sql = %sql, "Generated query");

        let rows = self.hub.query_db(DB_TASK, &sql).await?;
        let ids: Vec<Value> = rows.column("dc_id");
        info!(rows = rows.reply.len(), ids = ?ids, "Query result");

        self.hub.submit(DB_TASK, ids, SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_definition() {
        let reply: DbReply = serde_json::from_value(json!({
            "reply": [{ "Table": "users", "Create Table": "CREATE TABLE `users` (`id` int)" }],
            "error": "OK"
        }))
        .unwrap();
        assert_eq!(
            table_definition(&reply, "users").unwrap(),
            "CREATE TABLE `users` (`id` int)"
        );

        let empty: DbReply = serde_json::from_value(json!({ "reply": [], "error": "OK" })).unwrap();
        assert!(matches!(
            table_definition(&empty, "users"),
            Err(AppError::DatabaseError(_))
        ));
    }

    #[test]
    fn test_sql_prompt_embeds_both_tables() {
        let prompt = sql_prompt("CREATE TABLE users", "CREATE TABLE datacenters");
        assert!(prompt.contains("<users_table_create_query>\nCREATE TABLE users\n"));
        assert!(prompt.contains("<datacenters_table_create_query>\nCREATE TABLE datacenters\n"));
    }
}
