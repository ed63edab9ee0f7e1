//! Single-document services.

use crate::{escape, require, Refresh};
use searchwire_client::{Client, Method, PerformRequestOptions, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// How an index request treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Create or replace.
    Index,
    /// Fail with 409 if the id exists.
    Create,
}

impl OpType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
        }
    }
}

/// Shard summary of a write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardsInfo {
    /// Shards the operation was sent to.
    pub total: u32,
    /// Shards that succeeded.
    pub successful: u32,
    /// Shards that failed.
    pub failed: u32,
}

/// Result of indexing or deleting a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResponse {
    /// Index name.
    #[serde(rename = "_index")]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// `created`, `updated`, `deleted`, `not_found` or `noop`.
    #[serde(default)]
    pub result: String,
    /// Sequence number.
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<i64>,
    /// Primary term.
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<i64>,
    /// Shard summary.
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardsInfo>,
}

/// Adds or replaces a document.
#[derive(Debug, Clone)]
pub struct IndexService {
    client: Client,
    index: Option<String>,
    id: Option<String>,
    body: Option<Value>,
    op_type: Option<OpType>,
    routing: Option<String>,
    refresh: Option<Refresh>,
    pipeline: Option<String>,
}

impl IndexService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            id: None,
            body: None,
            op_type: None,
            routing: None,
            refresh: None,
            pipeline: None,
        }
    }

    /// Target index.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Document id. Without it the server generates one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Document source as JSON.
    pub fn body_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Document source from any serializable value.
    pub fn body<T: Serialize>(self, doc: &T) -> Result<Self> {
        Ok(self.body_json(serde_json::to_value(doc)?))
    }

    /// Create-only or create-or-replace.
    pub fn op_type(mut self, op_type: OpType) -> Self {
        self.op_type = Some(op_type);
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Refresh policy.
    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Ingest pipeline.
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("index", self.index.is_some()), ("body", self.body.is_some())])?;
        let index = escape(self.index.as_deref().unwrap_or_default());

        let mut opts = match &self.id {
            Some(id) => {
                PerformRequestOptions::new(Method::PUT, format!("/{index}/_doc/{}", escape(id)))
            }
            None => PerformRequestOptions::new(Method::POST, format!("/{index}/_doc")),
        };
        if let Some(op_type) = self.op_type {
            opts = opts.param("op_type", op_type.as_str());
        }
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(refresh) = self.refresh {
            opts = opts.param("refresh", refresh.as_str());
        }
        if let Some(pipeline) = self.pipeline {
            opts = opts.param("pipeline", pipeline);
        }
        if let Some(body) = self.body {
            opts = opts.body(body);
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<IndexResponse> {
        let client = self.client.clone();
        let opts = self.build()?;
        debug!(path = %opts.path, "Indexing document");
        client.perform(opts).await
    }
}

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    /// Index name.
    #[serde(rename = "_index")]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Sequence number.
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<i64>,
    /// Primary term.
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<i64>,
    /// Routing value.
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
    /// Whether the document exists.
    #[serde(default)]
    pub found: bool,
    /// Raw document source.
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

impl GetResult {
    /// Deserialize the source into `T`.
    pub fn source_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.source {
            Some(source) => Ok(Some(T::deserialize(source)?)),
            None => Ok(None),
        }
    }
}

/// Fetches a document by id. A missing document is a 404 error.
#[derive(Debug, Clone)]
pub struct GetService {
    client: Client,
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
    preference: Option<String>,
    realtime: Option<bool>,
    source_includes: Vec<String>,
    source_excludes: Vec<String>,
}

impl GetService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            id: None,
            routing: None,
            preference: None,
            realtime: None,
            source_includes: Vec::new(),
            source_excludes: Vec::new(),
        }
    }

    /// Index name.
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

    /// Node or shard preference.
    pub fn preference(mut self, preference: impl Into<String>) -> Self {
        self.preference = Some(preference.into());
        self
    }

    /// Realtime or refreshed view.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Return only these source fields.
    pub fn source_includes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_includes.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Leave these source fields out.
    pub fn source_excludes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_excludes.extend(fields.into_iter().map(Into::into));
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("index", self.index.is_some()), ("id", self.id.is_some())])?;
        let path = document_path(self.index.as_deref(), self.id.as_deref());

        let mut opts = PerformRequestOptions::new(Method::GET, path);
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(preference) = self.preference {
            opts = opts.param("preference", preference);
        }
        if let Some(realtime) = self.realtime {
            opts = opts.param("realtime", realtime);
        }
        if !self.source_includes.is_empty() {
            opts = opts.param("_source_includes", self.source_includes.join(","));
        }
        if !self.source_excludes.is_empty() {
            opts = opts.param("_source_excludes", self.source_excludes.join(","));
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<GetResult> {
        let client = self.client.clone();
        client.perform(self.build()?).await
    }
}

/// Checks whether a document exists.
#[derive(Debug, Clone)]
pub struct ExistsService {
    client: Client,
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
}

impl ExistsService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            id: None,
            routing: None,
        }
    }

    /// Index name.
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

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("index", self.index.is_some()), ("id", self.id.is_some())])?;
        let path = document_path(self.index.as_deref(), self.id.as_deref());

        let mut opts = PerformRequestOptions::new(Method::HEAD, path).ignore_error(404);
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        Ok(opts)
    }

    /// `true` on 200, `false` on 404.
    pub async fn execute(self) -> Result<bool> {
        let client = self.client.clone();
        let response = client.perform_request(self.build()?).await?;
        Ok(response.status().as_u16() == 200)
    }
}

/// Deletes a document by id.
#[derive(Debug, Clone)]
pub struct DeleteService {
    client: Client,
    index: Option<String>,
    id: Option<String>,
    routing: Option<String>,
    refresh: Option<Refresh>,
    ignore_not_found: bool,
}

impl DeleteService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            id: None,
            routing: None,
            refresh: None,
            ignore_not_found: false,
        }
    }

    /// Index name.
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

    /// Refresh policy.
    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Report a missing document as `result: "not_found"` instead of an error.
    pub fn ignore_not_found(mut self, ignore: bool) -> Self {
        self.ignore_not_found = ignore;
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("index", self.index.is_some()), ("id", self.id.is_some())])?;
        let path = document_path(self.index.as_deref(), self.id.as_deref());

        let mut opts = PerformRequestOptions::new(Method::DELETE, path);
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(refresh) = self.refresh {
            opts = opts.param("refresh", refresh.as_str());
        }
        if self.ignore_not_found {
            opts = opts.ignore_error(404);
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<IndexResponse> {
        let client = self.client.clone();
        client.perform(self.build()?).await
    }
}

fn document_path(index: Option<&str>, id: Option<&str>) -> String {
    format!(
        "/{}/_doc/{}",
        escape(index.unwrap_or_default()),
        escape(id.unwrap_or_default())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_client;
    use searchwire_client::Error;
    use serde_json::json;

    #[test]
    fn test_index_with_id() {
        let opts = IndexService::new(test_client())
            .index("tweets")
            .id("1/2")
            .body_json(json!({"user": "olivere"}))
            .op_type(OpType::Create)
            .refresh(Refresh::WaitFor)
            .build()
            .unwrap();

        assert_eq!(opts.method, Method::PUT);
        assert_eq!(opts.path, "/tweets/_doc/1%2F2");
        assert_eq!(
            opts.params,
            vec![
                ("op_type".to_string(), "create".to_string()),
                ("refresh".to_string(), "wait_for".to_string()),
            ]
        );
        assert!(opts.body.is_some());
    }

    #[test]
    fn test_index_without_id_posts() {
        let opts = IndexService::new(test_client())
            .index("tweets")
            .body_json(json!({}))
            .build()
            .unwrap();
        assert_eq!(opts.method, Method::POST);
        assert_eq!(opts.path, "/tweets/_doc");
    }

    #[test]
    fn test_index_requires_index_and_body() {
        let err = IndexService::new(test_client()).build().unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("index, body")));
    }

    #[test]
    fn test_get_params() {
        let opts = GetService::new(test_client())
            .index("tweets")
            .id("1")
            .realtime(false)
            .source_includes(["user", "message"])
            .build()
            .unwrap();

        assert_eq!(opts.method, Method::GET);
        assert_eq!(opts.path, "/tweets/_doc/1");
        assert!(opts.params.contains(&("realtime".to_string(), "false".to_string())));
        assert!(opts.params.contains(&("_source_includes".to_string(), "user,message".to_string())));
        assert!(opts.ignore_errors.is_empty());
    }

    #[test]
    fn test_exists_ignores_not_found() {
        let opts = ExistsService::new(test_client())
            .index("tweets")
            .id("1")
            .build()
            .unwrap();
        assert_eq!(opts.method, Method::HEAD);
        assert_eq!(opts.ignore_errors, vec![404]);
    }

    #[test]
    fn test_delete_requires_id() {
        let err = DeleteService::new(test_client())
            .index("tweets")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.ends_with("id")));
    }

    #[test]
    fn test_source_as() {
        #[derive(Deserialize)]
        struct Tweet {
            user: String,
        }

        let result: GetResult = serde_json::from_value(json!({
            "_index": "tweets", "_id": "1", "_version": 3, "found": true,
            "_source": {"user": "olivere"}
        }))
        .unwrap();

        let tweet: Tweet = result.source_as().unwrap().unwrap();
        assert_eq!(tweet.user, "olivere");
        assert_eq!(result.version, Some(3));
    }
}
