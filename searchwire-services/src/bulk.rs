//! Bulk operations.
//!
//! Actions are serialized as newline-delimited JSON: one metadata line per
//! action, followed by a source line for everything except deletes.

use crate::{escape, Refresh};
use searchwire_client::{Client, Error, ErrorDetails, Method, PerformRequestOptions, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

const NDJSON: &str = "application/x-ndjson";

/// Index or create a document.
#[derive(Debug, Clone, Default)]
pub struct BulkIndexRequest {
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
    pipeline: Option<String>,
    doc: Value,
}

impl BulkIndexRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target index. Falls back to the service default.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Document id. Generated by the server when unset.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Ingest pipeline.
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// Document body.
    pub fn doc(mut self, doc: Value) -> Self {
        self.doc = doc;
        self
    }

    /// Document body from any serializable value.
    pub fn doc_from<T: Serialize>(mut self, doc: &T) -> Result<Self> {
        self.doc = serde_json::to_value(doc)?;
        Ok(self)
    }

    fn meta(&self) -> serde_json::Map<String, Value> {
        let mut meta = serde_json::Map::new();
        insert_opt(&mut meta, "_index", &self.index);
        insert_opt(&mut meta, "_id", &self.id);
        insert_opt(&mut meta, "routing", &self.routing);
        insert_opt(&mut meta, "pipeline", &self.pipeline);
        meta
    }
}

/// Partially update a document.
#[derive(Debug, Clone, Default)]
pub struct BulkUpdateRequest {
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
    retry_on_conflict: Option<u32>,
    doc: Option<Value>,
    doc_as_upsert: Option<bool>,
    upsert: Option<Value>,
    script: Option<Value>,
}

impl BulkUpdateRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target index. Falls back to the service default.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Document id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Retries on version conflicts.
    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self
    }

    /// Partial document merged into the existing one.
    pub fn doc(mut self, doc: Value) -> Self {
        self.doc = Some(doc);
        self
    }

    /// Index the partial document when the target is missing.
    pub fn doc_as_upsert(mut self, enable: bool) -> Self {
        self.doc_as_upsert = Some(enable);
        self
    }

    /// Document indexed when the target is missing.
    pub fn upsert(mut self, doc: Value) -> Self {
        self.upsert = Some(doc);
        self
    }

    /// Update script, e.g. `{"source": "ctx._source.n += 1"}`.
    pub fn script(mut self, script: Value) -> Self {
        self.script = Some(script);
        self
    }

    fn meta(&self) -> serde_json::Map<String, Value> {
        let mut meta = serde_json::Map::new();
        insert_opt(&mut meta, "_index", &self.index);
        insert_opt(&mut meta, "_id", &self.id);
        insert_opt(&mut meta, "routing", &self.routing);
        if let Some(retries) = self.retry_on_conflict {
            meta.insert("retry_on_conflict".to_string(), json!(retries));
        }
        meta
    }

    fn source(&self) -> Value {
        let mut source = serde_json::Map::new();
        if let Some(doc) = &self.doc {
            source.insert("doc".to_string(), doc.clone());
        }
        if let Some(enable) = self.doc_as_upsert {
            source.insert("doc_as_upsert".to_string(), json!(enable));
        }
        if let Some(upsert) = &self.upsert {
            source.insert("upsert".to_string(), upsert.clone());
        }
        if let Some(script) = &self.script {
            source.insert("script".to_string(), script.clone());
        }
        Value::Object(source)
    }
}

/// Delete a document.
#[derive(Debug, Clone, Default)]
pub struct BulkDeleteRequest {
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
}

impl BulkDeleteRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target index. Falls back to the service default.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Document id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    fn meta(&self) -> serde_json::Map<String, Value> {
        let mut meta = serde_json::Map::new();
        insert_opt(&mut meta, "_index", &self.index);
        insert_opt(&mut meta, "_id", &self.id);
        insert_opt(&mut meta, "routing", &self.routing);
        meta
    }
}

/// One action in a bulk request.
#[derive(Debug, Clone)]
pub enum BulkableRequest {
    /// Index, replacing any existing document.
    Index(BulkIndexRequest),
    /// Index, failing when the document exists.
    Create(BulkIndexRequest),
    /// Partial update.
    Update(BulkUpdateRequest),
    /// Delete.
    Delete(BulkDeleteRequest),
}

impl BulkableRequest {
    /// Action name on the metadata line.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Index(_) => "index",
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }

    /// Serialized lines, without trailing newlines.
    pub fn source(&self) -> Result<Vec<String>> {
        let (meta, body) = match self {
            Self::Index(req) | Self::Create(req) => (req.meta(), Some(req.doc.clone())),
            Self::Update(req) => {
                if req.id.is_none() {
                    return Err(Error::Validation("update action requires an id".into()));
                }
                (req.meta(), Some(req.source()))
            }
            Self::Delete(req) => {
                if req.id.is_none() {
                    return Err(Error::Validation("delete action requires an id".into()));
                }
                (req.meta(), None)
            }
        };

        let mut header = serde_json::Map::new();
        header.insert(self.action().to_string(), Value::Object(meta));

        let mut lines = vec![serde_json::to_string(&Value::Object(header))?];
        if let Some(body) = body {
            lines.push(serde_json::to_string(&body)?);
        }
        Ok(lines)
    }
}

impl From<BulkIndexRequest> for BulkableRequest {
    fn from(req: BulkIndexRequest) -> Self {
        Self::Index(req)
    }
}

impl From<BulkUpdateRequest> for BulkableRequest {
    fn from(req: BulkUpdateRequest) -> Self {
        Self::Update(req)
    }
}

impl From<BulkDeleteRequest> for BulkableRequest {
    fn from(req: BulkDeleteRequest) -> Self {
        Self::Delete(req)
    }
}

/// Result of one bulk action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkResponseItem {
    /// Index name.
    #[serde(rename = "_index")]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version")]
    pub version: Option<i64>,
    /// `created`, `updated`, `deleted`, `noop` or `not_found`.
    pub result: Option<String>,
    /// HTTP status of this action.
    pub status: u16,
    /// Failure details.
    pub error: Option<ErrorDetails>,
}

impl BulkResponseItem {
    /// Whether the action succeeded.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.error.is_none()
    }
}

/// Bulk response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkResponse {
    /// Time taken in milliseconds.
    pub took: u64,
    /// Whether any action failed.
    pub errors: bool,
    /// One map per action, keyed by action name.
    pub items: Vec<HashMap<String, BulkResponseItem>>,
}

impl BulkResponse {
    fn by_outcome(&self, success: bool) -> Vec<&BulkResponseItem> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| item.is_success() == success)
            .collect()
    }

    /// Actions that failed.
    pub fn failed(&self) -> Vec<&BulkResponseItem> {
        self.by_outcome(false)
    }

    /// Actions that succeeded.
    pub fn succeeded(&self) -> Vec<&BulkResponseItem> {
        self.by_outcome(true)
    }

    /// Results for one action name, e.g. `index`.
    pub fn by_action(&self, action: &str) -> Vec<&BulkResponseItem> {
        self.items.iter().filter_map(|item| item.get(action)).collect()
    }
}

/// Sends several actions in one request.
#[derive(Debug, Clone)]
pub struct BulkService {
    client: Client,
    index: Option<String>,
    requests: Vec<BulkableRequest>,
    refresh: Option<Refresh>,
    routing: Option<String>,
    pipeline: Option<String>,
    wait_for_active_shards: Option<String>,
    timeout: Option<String>,
}

impl BulkService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            requests: Vec::new(),
            refresh: None,
            routing: None,
            pipeline: None,
            wait_for_active_shards: None,
            timeout: None,
        }
    }

    /// Default index for actions that name none.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Append an action.
    pub fn add(mut self, request: impl Into<BulkableRequest>) -> Self {
        self.requests.push(request.into());
        self
    }

    /// Append several actions.
    pub fn add_all<I, R>(mut self, requests: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<BulkableRequest>,
    {
        self.requests.extend(requests.into_iter().map(Into::into));
        self
    }

    /// Refresh policy.
    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Default routing.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Default ingest pipeline.
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// Shard copies that must be active before writing.
    pub fn wait_for_active_shards(mut self, shards: impl Into<String>) -> Self {
        self.wait_for_active_shards = Some(shards.into());
        self
    }

    /// Server-side timeout, e.g. `1m`.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Number of queued actions.
    pub fn number_of_actions(&self) -> usize {
        self.requests.len()
    }

    /// Size of the serialized body, counting newlines.
    pub fn estimated_size_in_bytes(&self) -> Result<usize> {
        let mut size = 0;
        for request in &self.requests {
            for line in request.source()? {
                size += line.len() + 1;
            }
        }
        Ok(size)
    }

    /// Serialized body. Every line ends with a newline.
    pub fn body_as_string(&self) -> Result<String> {
        let mut body = String::new();
        for request in &self.requests {
            for line in request.source()? {
                body.push_str(&line);
                body.push('\n');
            }
        }
        Ok(body)
    }

    fn build(self) -> Result<PerformRequestOptions> {
        if self.requests.is_empty() {
            return Err(Error::Validation("no bulk actions to commit".into()));
        }
        let body = self.body_as_string()?;

        let path = match &self.index {
            Some(index) => format!("/{}/_bulk", escape(index)),
            None => "/_bulk".to_string(),
        };

        let mut opts = PerformRequestOptions::new(Method::POST, path)
            .content_type(NDJSON)
            .body(body);
        if let Some(refresh) = self.refresh {
            opts = opts.param("refresh", refresh.as_str());
        }
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(pipeline) = self.pipeline {
            opts = opts.param("pipeline", pipeline);
        }
        if let Some(shards) = self.wait_for_active_shards {
            opts = opts.param("wait_for_active_shards", shards);
        }
        if let Some(timeout) = self.timeout {
            opts = opts.param("timeout", timeout);
        }
        Ok(opts)
    }

    /// Send the actions.
    ///
    /// A response with failed items is still `Ok`; inspect
    /// [`BulkResponse::failed`].
    pub async fn execute(self) -> Result<BulkResponse> {
        let client = self.client.clone();
        let actions = self.requests.len();
        let opts = self.build()?;
        debug!(actions, "Committing bulk request");

        let response: BulkResponse = client.perform(opts).await?;
        if response.errors {
            warn!(
                failed = response.failed().len(),
                actions, "Bulk request had failures"
            );
        }
        Ok(response)
    }
}

fn insert_opt(map: &mut serde_json::Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
}
