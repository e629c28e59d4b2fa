//! GraphQL-over-HTTP adapter.
//!
//! Queries and mutations only. There is no websocket transport, so
//! [`GraphqlRemote::subscribe`] fails with [`RemoteError::Unsupported`] and
//! controllers backed by it never receive push notifications; they still
//! refresh through invalidation and explicit refetches.

use crate::config::RemoteConfig;
use crate::entity::{Entity, Identity};
use crate::error::{RemoteError, SyncError};
use crate::remote::documents;
use crate::remote::{PushKind, PushStream, QueryVariables, RemoteService};
use crate::schema::EntitySchema;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

fn map_http_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        RemoteError::Transport(format!("Connection error: {}", error))
    } else {
        RemoteError::Transport(format!("HTTP error: {}", error))
    }
}

/// Drop `__typename` markers the server adds to every object.
fn strip_typename(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("__typename");
            for inner in map.values_mut() {
                strip_typename(inner);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_typename),
        _ => {}
    }
}

fn into_entity(mut value: Value) -> Result<Entity, RemoteError> {
    strip_typename(&mut value);
    Entity::from_value(value)
        .ok_or_else(|| RemoteError::MalformedResponse("expected an object".to_string()))
}

fn into_entities(value: Value) -> Result<Vec<Entity>, RemoteError> {
    match value {
        Value::Array(items) => items.into_iter().map(into_entity).collect(),
        Value::Null => Ok(Vec::new()),
        single => Ok(vec![into_entity(single)?]),
    }
}

/// Remote data service reached through a GraphQL endpoint.
pub struct GraphqlRemote {
    client: Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
}

impl GraphqlRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self, SyncError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| SyncError::Config("remote.endpoint is not set".to_string()))?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            headers: config.headers.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one document and return the `field` member of `data`.
    async fn execute(&self, document: &str, variables: Value, field: &str) -> Result<Value, RemoteError> {
        debug!(endpoint = %self.endpoint, field, "Sending GraphQL request");
        let mut request = self.client.post(&self.endpoint).json(&GraphqlRequest {
            query: document,
            variables,
        });
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError::Transport(format!(
                "Request failed with status {}: {}",
                status, body
            )));
        }

        let body: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            warn!(field, errors = messages.len(), "GraphQL request rejected");
            return Err(RemoteError::Rejected(messages.join("; ")));
        }

        body.data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .ok_or_else(|| RemoteError::MalformedResponse(format!("response has no data.{}", field)))
    }
}

#[async_trait]
impl RemoteService for GraphqlRemote {
    async fn query(
        &self,
        schema: &EntitySchema,
        variables: &QueryVariables,
    ) -> Result<Vec<Entity>, RemoteError> {
        let data = self
            .execute(
                &documents::query_document(schema),
                json!({ "query": variables.to_query_argument() }),
                &documents::query_field(schema),
            )
            .await?;
        into_entities(data)
    }

    async fn create(&self, schema: &EntitySchema, input: Entity) -> Result<Entity, RemoteError> {
        let data = self
            .execute(
                &documents::create_document(schema),
                json!({ "input": input }),
                &documents::create_field(schema),
            )
            .await?;
        // atomic mutations answer with a list
        into_entities(data)?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::MalformedResponse("create returned no entity".to_string()))
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        changes: Entity,
        filter: Vec<Identity>,
    ) -> Result<Vec<Entity>, RemoteError> {
        let data = self
            .execute(
                &documents::update_document(schema),
                json!({
                    "input": changes,
                    "query": documents::identity_filter(schema, &filter),
                }),
                &documents::update_field(schema),
            )
            .await?;
        into_entities(data)
    }

    async fn delete(
        &self,
        schema: &EntitySchema,
        filter: Vec<Identity>,
    ) -> Result<Vec<Identity>, RemoteError> {
        let data = self
            .execute(
                &documents::delete_document(schema),
                json!({ "query": documents::identity_filter(schema, &filter) }),
                &documents::delete_field(schema),
            )
            .await?;
        into_entities(data)?
            .iter()
            .map(|row| {
                row.identity(schema.identity_fields()).ok_or_else(|| {
                    RemoteError::MalformedResponse("deleted row without identity".to_string())
                })
            })
            .collect()
    }

    async fn subscribe(
        &self,
        schema: &EntitySchema,
        kind: PushKind,
        _variables: &QueryVariables,
    ) -> Result<PushStream, RemoteError> {
        Err(RemoteError::Unsupported(format!(
            "subscription {} over plain HTTP",
            documents::subscription_field(schema, kind)
        )))
    }

    fn name(&self) -> &str {
        "graphql"
    }
}
