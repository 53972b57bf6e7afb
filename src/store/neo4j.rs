//! Neo4j graph store over the HTTP transactional endpoint.
//!
//! Every call is a single auto-commit transaction posted to
//! `{uri}/db/{database}/tx/commit`.

use super::{validate_relation, GraphStoreReader, GraphStoreWriter};
use crate::config::Neo4jOptions;
use crate::error::{Result, TenantGraphError};
use crate::types::id_key;
use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;

// Ids compare case-insensitively; `$keys` holds lowercased identifiers
const EXISTENCE_QUERY: &str = "MATCH (r:Resource) WHERE toLower(r.id) IN $keys RETURN r.id AS id";

/// HTTP client for a Neo4j database.
#[derive(Debug, Clone)]
pub struct Neo4jHttpStore {
    client: Client,
    commit_url: String,
    authorization: Option<String>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: String,
    parameters: Value,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'a str; 1],
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    code: String,
    message: String,
}

impl Neo4jHttpStore {
    /// Create a store client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is missing or invalid, or the HTTP client
    /// cannot be built.
    pub fn new(options: &Neo4jOptions, timeout: Duration) -> Result<Self> {
        let uri = options
            .uri
            .as_deref()
            .ok_or_else(|| crate::err!(ConfigMissing { key: "neo4j.uri".to_string() }))?;
        let base = url::Url::parse(uri).map_err(|e| crate::err!(ConfigValue {
            key: "neo4j.uri".to_string(),
            message: e.to_string(),
        }))?;
        let commit_url = format!(
            "{}/db/{}/tx/commit",
            base.as_str().trim_end_matches('/'),
            options.database
        );

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tenantgraph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TenantGraphError::internal(format!("Failed to create HTTP client: {e}"), file!(), line!()))?;

        let authorization = options.user.as_ref().map(|user| {
            let password = options.password.as_deref().unwrap_or_default();
            format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
        });

        Ok(Self { client, commit_url, authorization })
    }

    async fn commit(&self, statement: String, parameters: Value) -> Result<Vec<Row>> {
        let body = CommitRequest {
            statements: vec![Statement {
                statement,
                parameters,
                result_data_contents: ["row"],
            }],
        };

        let mut request = self.client.post(&self.commit_url).json(&body);
        if let Some(auth) = &self.authorization {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            TenantGraphError::graph_store(format!("Request to {} failed: {e}", self.commit_url), None, file!(), line!())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TenantGraphError::graph_store(
                format!("Neo4j returned status {status}"),
                Some(status.as_u16()),
                file!(),
                line!(),
            ));
        }

        let parsed: CommitResponse = response.json().await.map_err(|e| {
            TenantGraphError::graph_store(format!("Failed to parse Neo4j response: {e}"), None, file!(), line!())
        })?;

        if let Some(error) = parsed.errors.first() {
            return Err(crate::err!(GraphStore {
                message: format!("{}: {}", error.code, error.message),
                status_code: Some(status.as_u16()),
            }));
        }

        Ok(parsed.results.into_iter().flat_map(|r| r.data).collect())
    }
}

#[async_trait]
impl GraphStoreReader for Neo4jHttpStore {
    async fn existing_ids(&self, ids: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        tracing::debug!(ids = ids.len(), "Querying Neo4j for existing resources");

        let keys: BTreeSet<String> = ids.iter().map(|id| id_key(id)).collect();
        let rows = self.commit(EXISTENCE_QUERY.to_string(), json!({ "keys": keys })).await?;
        let found: BTreeSet<String> = rows
            .into_iter()
            .filter_map(|row| row.row.into_iter().next())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        tracing::debug!(requested = ids.len(), found = found.len(), "Neo4j existence check complete");
        Ok(found)
    }
}

#[async_trait]
impl GraphStoreWriter for Neo4jHttpStore {
    async fn write_edge(&self, source_id: &str, relation: &str, target_id: &str) -> Result<()> {
        validate_relation(relation)?;
        let statement = format!(
            "MATCH (a:Resource {{id: $source}}), (b:Resource {{id: $target}}) MERGE (a)-[:{relation}]->(b)"
        );
        self.commit(statement, json!({ "source": source_id, "target": target_id }))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    fn options(uri: &str) -> Neo4jOptions {
        Neo4jOptions {
            uri: Some(uri.to_string()),
            database: "neo4j".to_string(),
            user: Some("neo4j".to_string()),
            password: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_existing_ids_single_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(header("Authorization", "Basic bmVvNGo6c2VjcmV0"))
            .and(body_string_contains("WHERE toLower(r.id) IN $keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "columns": ["id"], "data": [{ "row": ["/subscriptions/0/a"] }] }],
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Neo4jHttpStore::new(&options(&server.uri()), Duration::from_secs(5)).unwrap();
        let ids: BTreeSet<String> = ["/subscriptions/0/a".to_string(), "/subscriptions/0/b".to_string()]
            .into_iter()
            .collect();

        let found = store.existing_ids(&ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains("/subscriptions/0/a"));
    }

    #[tokio::test]
    async fn test_existing_ids_match_any_casing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_partial_json(json!({
                "statements": [{
                    "parameters": { "keys": ["/subscriptions/0/resourcegroups/hub-rg/providers/microsoft.network/virtualnetworks/hub"] }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": ["id"],
                    "data": [{ "row": ["/subscriptions/0/resourcegroups/HUB-RG/providers/Microsoft.Network/virtualNetworks/hub"] }]
                }],
                "errors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Neo4jHttpStore::new(&options(&server.uri()), Duration::from_secs(5)).unwrap();
        let requested = "/subscriptions/0/resourceGroups/hub-rg/providers/Microsoft.Network/virtualNetworks/hub/";
        let ids: BTreeSet<String> = [requested.to_string()].into_iter().collect();

        let found = store.existing_ids(&ids).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|id| id_key(id) == id_key(requested)));
    }

    #[tokio::test]
    async fn test_statement_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{ "code": "Neo.ClientError.Security.Unauthorized", "message": "nope" }]
            })))
            .mount(&server)
            .await;

        let store = Neo4jHttpStore::new(&options(&server.uri()), Duration::from_secs(5)).unwrap();
        let ids: BTreeSet<String> = ["/x".to_string()].into_iter().collect();
        let err = store.existing_ids(&ids).await.unwrap_err();
        assert!(matches!(err, TenantGraphError::GraphStore { .. }));
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = Neo4jHttpStore::new(&options(&server.uri()), Duration::from_secs(5)).unwrap();
        let ids: BTreeSet<String> = ["/x".to_string()].into_iter().collect();
        let err = store.existing_ids(&ids).await.unwrap_err();
        assert!(matches!(err, TenantGraphError::GraphStore { status_code: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_write_edge_merges_relation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("MERGE (a)-[:USES_SUBNET]->(b)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [], "errors": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Neo4jHttpStore::new(&options(&server.uri()), Duration::from_secs(5)).unwrap();
        store.write_edge("/a", "USES_SUBNET", "/b").await.unwrap();
        assert!(store.write_edge("/a", "uses subnet", "/b").await.is_err());
    }

    #[test]
    fn test_missing_uri_is_config_error() {
        let mut opts = options("http://localhost:7474");
        opts.uri = None;
        let err = Neo4jHttpStore::new(&opts, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TenantGraphError::ConfigMissing { .. }));
    }
}
