//! Update by query.

use crate::{collect_names, join_escaped, require, Refresh};
use searchwire_client::{Client, Method, PerformRequestOptions, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// What to do on version conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Stop at the first conflict.
    #[default]
    Abort,
    /// Count conflicts and keep going.
    Proceed,
}

impl ConflictPolicy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Proceed => "proceed",
        }
    }
}

/// Result of an update by query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateByQueryResponse {
    /// Time taken in milliseconds.
    pub took: u64,
    /// Whether a batch timed out.
    pub timed_out: bool,
    /// Documents processed.
    pub total: u64,
    /// Documents updated.
    pub updated: u64,
    /// Documents deleted by the script.
    pub deleted: u64,
    /// Scroll batches pulled.
    pub batches: u64,
    /// Version conflicts hit.
    pub version_conflicts: u64,
    /// Documents the script left untouched.
    pub noops: u64,
    /// Bulk or search failures.
    pub failures: Vec<Value>,
    /// Task id when not waiting for completion.
    pub task: Option<String>,
}

/// Updates every document matching a query.
#[derive(Debug, Clone)]
pub struct UpdateByQueryService {
    client: Client,
    indices: Vec<String>,
    query: Option<Value>,
    script: Option<Value>,
    conflicts: ConflictPolicy,
    refresh: Option<bool>,
    wait_for_completion: Option<bool>,
    max_docs: Option<u64>,
    routing: Option<String>,
}

impl UpdateByQueryService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            query: None,
            script: None,
            conflicts: ConflictPolicy::Abort,
            refresh: None,
            wait_for_completion: None,
            max_docs: None,
            routing: None,
        }
    }

    /// Indices to update.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    /// Query selecting the documents. All documents when unset.
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Script applied to each document.
    pub fn script(mut self, script: Value) -> Self {
        self.script = Some(script);
        self
    }

    /// Conflict policy.
    ///
    /// With [`ConflictPolicy::Proceed`] a 409 response is returned as a
    /// normal result so the conflict counts can be read.
    pub fn conflicts(mut self, policy: ConflictPolicy) -> Self {
        self.conflicts = policy;
        self
    }

    /// Refresh the touched shards afterwards. Only `true` and `false` apply.
    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = Some(refresh == Refresh::True);
        self
    }

    /// Block until done, or return a task id.
    pub fn wait_for_completion(mut self, wait: bool) -> Self {
        self.wait_for_completion = Some(wait);
        self
    }

    /// Maximum number of documents to process.
    pub fn max_docs(mut self, max: u64) -> Self {
        self.max_docs = Some(max);
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    fn body(&self) -> Option<Value> {
        let mut body = serde_json::Map::new();
        if let Some(query) = &self.query {
            body.insert("query".to_string(), query.clone());
        }
        if let Some(script) = &self.script {
            body.insert("script".to_string(), script.clone());
        }
        (!body.is_empty()).then_some(Value::Object(body))
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("indices", !self.indices.is_empty())])?;
        let body = self.body();

        let mut opts = PerformRequestOptions::new(
            Method::POST,
            format!("/{}/_update_by_query", join_escaped(&self.indices)),
        );
        if self.conflicts == ConflictPolicy::Proceed {
            opts = opts
                .param("conflicts", self.conflicts.as_str())
                .ignore_error(409);
        }
        if let Some(refresh) = self.refresh {
            opts = opts.param("refresh", refresh);
        }
        if let Some(wait) = self.wait_for_completion {
            opts = opts.param("wait_for_completion", wait);
        }
        if let Some(max) = self.max_docs {
            opts = opts.param("max_docs", max);
        }
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(body) = body {
            opts = opts.body(body);
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<UpdateByQueryResponse> {
        let client = self.client.clone();
        let opts = self.build()?;
        debug!(path = %opts.path, "Updating by query");

        let response: UpdateByQueryResponse = client.perform(opts).await?;
        if response.version_conflicts > 0 {
            warn!(
                conflicts = response.version_conflicts,
                updated = response.updated,
                "Update by query hit version conflicts"
            );
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_client;
    use searchwire_client::Error;
    use serde_json::json;

    #[test]
    fn test_build_request() {
        let opts = UpdateByQueryService::new(test_client())
            .indices(["tweets"])
            .query(json!({"term": {"user": "olivere"}}))
            .script(json!({"source": "ctx._source.retweets++"}))
            .refresh(Refresh::True)
            .build()
            .unwrap();

        assert_eq!(opts.method, Method::POST);
        assert_eq!(opts.path, "/tweets/_update_by_query");
        assert_eq!(opts.params, vec![("refresh".to_string(), "true".to_string())]);
        assert!(opts.ignore_errors.is_empty());
        assert!(opts.body.is_some());
    }

    #[test]
    fn test_proceed_ignores_conflicts() {
        let opts = UpdateByQueryService::new(test_client())
            .indices(["tweets"])
            .conflicts(ConflictPolicy::Proceed)
            .build()
            .unwrap();

        assert_eq!(opts.params, vec![("conflicts".to_string(), "proceed".to_string())]);
        assert_eq!(opts.ignore_errors, vec![409]);
        assert!(opts.body.is_none());
    }

    #[test]
    fn test_requires_indices() {
        let err = UpdateByQueryService::new(test_client()).build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_decode_response() {
        let response: UpdateByQueryResponse = serde_json::from_value(json!({
            "took": 12,
            "timed_out": false,
            "total": 3,
            "updated": 2,
            "deleted": 0,
            "batches": 1,
            "version_conflicts": 1,
            "noops": 0,
            "retries": {"bulk": 0, "search": 0},
            "failures": []
        }))
        .unwrap();

        assert_eq!(response.updated, 2);
        assert_eq!(response.version_conflicts, 1);
        assert!(response.task.is_none());
    }
}
