//! Shortest acquaintance path between two users, via a Neo4j copy of the hub database.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::error::{AppError, Result};
use crate::domain::hub::SubmitTarget;
use crate::infrastructure::graph_db::GraphDb;
use crate::infrastructure::hub::HubClient;

const DB_TASK: &str = "database";
const START_USER: &[&str] = &["Rafał", "Rafa\u{c5}\u{201a}"];
const END_USER: &[&str] = &["Barbara"];

const CLEAR_USERS: &str = "MATCH (u:User)
DETACH DELETE u";

const MERGE_USERS: &str = "UNWIND $users as user
MERGE (u:User {id: user.id})
ON CREATE SET u.username = user.username";

const MERGE_CONNECTIONS: &str = "UNWIND $connections as connection
MATCH (u1:User {id: connection.user1_id})
MATCH (u2:User {id: connection.user2_id})
MERGE (u1)-[r:CONNECTED_TO]->(u2)";

const SHORTEST_PATH: &str = "MATCH path = shortestPath(
  (start:User {id: $startId})-[:CONNECTED_TO*]-(end:User {id: $endId})
)
RETURN [node in nodes(path) | {
  id: node.id,
  username: node.username
}] as users";

/// Id of the first row whose `username` matches one of `aliases`.
///
/// The hub returns some names double-encoded, so callers list every spelling.
pub fn find_user_id(users: &[Map<String, Value>], aliases: &[&str]) -> Result<Value> {
    users
        .iter()
        .find(|user| {
            user.get("username")
                .and_then(Value::as_str)
                .is_some_and(|name| aliases.contains(&name))
        })
        .and_then(|user| user.get("id").cloned())
        .ok_or_else(|| AppError::NotFound(format!("{} not found.", aliases[0])))
}

/// Usernames along the returned path, comma-joined.
pub fn path_usernames(path: &Value) -> Result<String> {
    let nodes = path
        .as_array()
        .ok_or_else(|| AppError::ParseError("Path is not a list of users".to_string()))?;
    let names = nodes
        .iter()
        .map(|node| {
            node.get("username")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::ParseError(format!("Path node without username: {}", node)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(names.join(", "))
}

pub struct ConnectionsUseCase {
    hub: Arc<HubClient>,
    graph: GraphDb,
}

impl ConnectionsUseCase {
    pub fn new(hub: Arc<HubClient>, graph: GraphDb) -> Self {
        Self { hub, graph }
    }

    pub async fn execute(&self) -> Result<()> {
        let connections = self
            .hub
            .query_db(DB_TASK, "select * from connections")
            .await?
            .reply;
        let users = self.hub.query_db(DB_TASK, "select * from users").await?.reply;
        info!(users = users.len(), connections = connections.len(), "Loaded hub tables");

        self.graph.run(CLEAR_USERS, json!({})).await?;
        self.graph
            .run(MERGE_USERS, json!({ "users": users }))
            .await?;
        self.graph
            .run(MERGE_CONNECTIONS, json!({ "connections": connections }))
            .await?;

        let end_id = find_user_id(&users, END_USER)?;
        let start_id = find_user_id(&users, START_USER)?;

        let result = self
            .graph
            .run(SHORTEST_PATH, json!({ "startId": start_id, "endId": end_id }))
            .await?;
        let path = result
            .column("users")
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Shortest path not found.".to_string()))?;
        let answer = path_usernames(&path)?;
        info!(path = %answer, "Relation path");

        self.hub
            .submit("connections", answer, SubmitTarget::Central)
            .await?;
        Ok(())
    }
}
