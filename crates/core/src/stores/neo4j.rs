use crate::error::SearchError;
use crate::models::{EntityKind, RelationshipEdge, RelationshipType};
use crate::text::normalize_entity_name;
use crate::traits::GraphIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub struct Neo4jStore {
    endpoint: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client: Client::new(),
        }
    }

    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    /// Runs all statements in one auto-commit transaction. Neo4j reports
    /// statement errors in the body with a 200 status and rolls the whole
    /// transaction back, so both are checked.
    async fn commit(&self, statements: Vec<Value>) -> Result<Value, SearchError> {
        let response = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "neo4j".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        if let Some(message) = first_error(&body) {
            return Err(SearchError::BackendResponse {
                backend: "neo4j".to_string(),
                details: message,
            });
        }
        Ok(body)
    }
}

fn statement(cypher: String, parameters: Value) -> Value {
    json!({ "statement": cypher, "parameters": parameters })
}

/// Cypher for one relationship type. Types and labels come from the closed
/// enum, never from input, so interpolating them is safe.
fn edge_statement(kind: EntityKind, relationship: RelationshipType) -> String {
    format!(
        "MATCH (n:{label} {{id: $id}})
         UNWIND $targets AS target
         MERGE (t:{target_label} {{key: target.key}})
         ON CREATE SET t.name = target.name
         MERGE (n)-[:{relationship}]->(t)",
        label = kind.graph_label(),
        target_label = relationship.target_label(),
        relationship = relationship.as_str(),
    )
}

#[async_trait]
impl GraphIndex for Neo4jStore {
    async fn write_subject(
        &self,
        kind: EntityKind,
        subject_id: &str,
        edges: &[RelationshipEdge],
    ) -> Result<(), SearchError> {
        let mut statements = vec![statement(
            format!(
                "MERGE (n:{label} {{id: $id}})
                 WITH n
                 OPTIONAL MATCH (n)-[r]->()
                 DELETE r",
                label = kind.graph_label()
            ),
            json!({ "id": subject_id }),
        )];

        let mut grouped: BTreeMap<RelationshipType, Vec<Value>> = BTreeMap::new();
        for edge in edges {
            if edge.relationship.owner_kind() != kind {
                return Err(SearchError::Request(format!(
                    "{} edges cannot leave a {} node",
                    edge.relationship,
                    kind.graph_label()
                )));
            }
            let key = normalize_entity_name(&edge.target);
            if key.is_empty() {
                continue;
            }
            grouped
                .entry(edge.relationship)
                .or_default()
                .push(json!({ "key": key, "name": edge.target.trim() }));
        }

        for (relationship, targets) in grouped {
            statements.push(statement(
                edge_statement(kind, relationship),
                json!({ "id": subject_id, "targets": targets }),
            ));
        }

        let count = statements.len();
        self.commit(statements).await?;
        debug!(kind = kind.as_str(), subject_id, statements = count, "graph subject written");
        Ok(())
    }

    async fn set_embedding(
        &self,
        kind: EntityKind,
        subject_id: &str,
        vector: &[f32],
    ) -> Result<(), SearchError> {
        let body = self
            .commit(vec![statement(
                format!(
                    "MATCH (n:{label} {{id: $id}})
                     SET n.embedding = $embedding
                     RETURN count(n) AS updated",
                    label = kind.graph_label()
                ),
                json!({ "id": subject_id, "embedding": vector }),
            )])
            .await?;

        let updated = extract_rows(&body)
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if updated == 0 {
            return Err(SearchError::Request(format!(
                "{} node {subject_id} does not exist",
                kind.graph_label()
            )));
        }
        Ok(())
    }

    async fn remove_subject(&self, kind: EntityKind, subject_id: &str) -> Result<(), SearchError> {
        self.commit(vec![statement(
            format!(
                "MATCH (n:{label} {{id: $id}}) DETACH DELETE n",
                label = kind.graph_label()
            ),
            json!({ "id": subject_id }),
        )])
        .await?;
        Ok(())
    }

    async fn relationships(
        &self,
        kind: EntityKind,
        subject_id: &str,
    ) -> Result<Vec<RelationshipEdge>, SearchError> {
        let body = self
            .commit(vec![statement(
                format!(
                    "MATCH (n:{label} {{id: $id}})-[r]->(t)
                     RETURN type(r) AS relationship, coalesce(t.name, t.key) AS target",
                    label = kind.graph_label()
                ),
                json!({ "id": subject_id }),
            )])
            .await?;

        parse_relationship_rows(subject_id, &body)
    }
}

/// Validates graph rows at the read boundary. An unknown relationship type is
/// an error, never dropped.
pub fn parse_relationship_rows(
    subject_id: &str,
    body: &Value,
) -> Result<Vec<RelationshipEdge>, SearchError> {
    extract_rows(body)
        .into_iter()
        .map(|row| {
            let relationship = row
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("row has no relationship type"))?
                .parse::<RelationshipType>()?;
            let target = row
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("row has no target name"))?;
            Ok(RelationshipEdge::new(subject_id, relationship, target))
        })
        .collect()
}

fn malformed(details: &str) -> SearchError {
    SearchError::BackendResponse {
        backend: "neo4j".to_string(),
        details: details.to_string(),
    }
}

fn first_error(body: &Value) -> Option<String> {
    let error = body.pointer("/errors/0")?;
    let code = error.pointer("/code").and_then(Value::as_str).unwrap_or("unknown");
    let message = error.pointer("/message").and_then(Value::as_str).unwrap_or_default();
    Some(format!("{code}: {message}"))
}

fn extract_rows(payload: &Value) -> Vec<&Value> {
    payload
        .pointer("/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| result.pointer("/data").and_then(Value::as_array))
                .flatten()
                .filter_map(|entry| entry.pointer("/row").filter(|row| row.is_array()))
                .collect()
        })
        .unwrap_or_default()
}
