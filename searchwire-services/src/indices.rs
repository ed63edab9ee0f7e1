//! Index management services.

use crate::document::ShardsInfo;
use crate::{collect_names, escape, join_escaped, require};
use searchwire_client::{Client, Method, PerformRequestOptions, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// Settings and mappings for a new index.
#[derive(Debug, Clone, Default)]
pub struct IndexSettings {
    /// Number of shards.
    pub number_of_shards: Option<u32>,
    /// Number of replicas.
    pub number_of_replicas: Option<u32>,
    /// Refresh interval.
    pub refresh_interval: Option<String>,
    /// Analysis settings.
    pub analysis: Option<Value>,
    /// Raw mappings.
    pub mappings: Option<Value>,
}

impl IndexSettings {
    /// Create new index settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of shards.
    pub fn shards(mut self, shards: u32) -> Self {
        self.number_of_shards = Some(shards);
        self
    }

    /// Set number of replicas.
    pub fn replicas(mut self, replicas: u32) -> Self {
        self.number_of_replicas = Some(replicas);
        self
    }

    /// Set refresh interval, e.g. `1s` or `-1`.
    pub fn refresh_interval(mut self, interval: impl Into<String>) -> Self {
        self.refresh_interval = Some(interval.into());
        self
    }

    /// Set analysis settings.
    pub fn analysis(mut self, analysis: Value) -> Self {
        self.analysis = Some(analysis);
        self
    }

    /// Set mappings.
    pub fn mappings(mut self, mappings: Value) -> Self {
        self.mappings = Some(mappings);
        self
    }

    /// Request body.
    pub fn to_json(&self) -> Value {
        let mut body = serde_json::Map::new();
        let mut settings = serde_json::Map::new();

        if let Some(shards) = self.number_of_shards {
            settings.insert("number_of_shards".to_string(), json!(shards));
        }
        if let Some(replicas) = self.number_of_replicas {
            settings.insert("number_of_replicas".to_string(), json!(replicas));
        }
        if let Some(interval) = &self.refresh_interval {
            settings.insert("refresh_interval".to_string(), json!(interval));
        }
        if let Some(analysis) = &self.analysis {
            settings.insert("analysis".to_string(), analysis.clone());
        }

        if !settings.is_empty() {
            body.insert("settings".to_string(), Value::Object(settings));
        }
        if let Some(mappings) = &self.mappings {
            body.insert("mappings".to_string(), mappings.clone());
        }

        Value::Object(body)
    }
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcknowledgedResponse {
    /// Whether the master accepted the change.
    pub acknowledged: bool,
}

/// Result of creating an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicesCreateResponse {
    /// Whether the master accepted the change.
    pub acknowledged: bool,
    /// Whether the required shard copies started in time.
    pub shards_acknowledged: bool,
    /// Index name.
    pub index: String,
}

/// Creates an index.
#[derive(Debug, Clone)]
pub struct IndicesCreateService {
    client: Client,
    index: Option<String>,
    body: Option<Value>,
    wait_for_active_shards: Option<String>,
    timeout: Option<String>,
}

impl IndicesCreateService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            body: None,
            wait_for_active_shards: None,
            timeout: None,
        }
    }

    /// Index name.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Body from typed settings.
    pub fn settings(mut self, settings: &IndexSettings) -> Self {
        self.body = Some(settings.to_json());
        self
    }

    /// Raw JSON body.
    pub fn body_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Shard copies that must be active before returning.
    pub fn wait_for_active_shards(mut self, shards: impl Into<String>) -> Self {
        self.wait_for_active_shards = Some(shards.into());
        self
    }

    /// Server-side timeout, e.g. `30s`.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("index", self.index.is_some())])?;
        let path = format!("/{}", escape(self.index.as_deref().unwrap_or_default()));

        let mut opts = PerformRequestOptions::new(Method::PUT, path);
        if let Some(shards) = self.wait_for_active_shards {
            opts = opts.param("wait_for_active_shards", shards);
        }
        if let Some(timeout) = self.timeout {
            opts = opts.param("timeout", timeout);
        }
        if let Some(body) = self.body {
            opts = opts.body(body);
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<IndicesCreateResponse> {
        let client = self.client.clone();
        let opts = self.build()?;
        info!(path = %opts.path, "Creating index");
        client.perform(opts).await
    }
}

/// Deletes indices.
#[derive(Debug, Clone)]
pub struct IndicesDeleteService {
    client: Client,
    indices: Vec<String>,
    ignore_unavailable: Option<bool>,
}

impl IndicesDeleteService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            ignore_unavailable: None,
        }
    }

    /// Indices to delete.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    /// Skip missing indices instead of failing.
    pub fn ignore_unavailable(mut self, ignore: bool) -> Self {
        self.ignore_unavailable = Some(ignore);
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("indices", !self.indices.is_empty())])?;
        let mut opts =
            PerformRequestOptions::new(Method::DELETE, format!("/{}", join_escaped(&self.indices)));
        if let Some(ignore) = self.ignore_unavailable {
            opts = opts.param("ignore_unavailable", ignore);
        }
        Ok(opts)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<AcknowledgedResponse> {
        let client = self.client.clone();
        let opts = self.build()?;
        info!(path = %opts.path, "Deleting indices");
        client.perform(opts).await
    }
}

/// Checks whether all given indices exist.
#[derive(Debug, Clone)]
pub struct IndicesExistsService {
    client: Client,
    indices: Vec<String>,
}

impl IndicesExistsService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
        }
    }

    /// Indices to check.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    fn build(self) -> Result<PerformRequestOptions> {
        require(&[("indices", !self.indices.is_empty())])?;
        Ok(
            PerformRequestOptions::new(Method::HEAD, format!("/{}", join_escaped(&self.indices)))
                .ignore_error(404),
        )
    }

    /// `true` on 200, `false` on 404.
    pub async fn execute(self) -> Result<bool> {
        let client = self.client.clone();
        let response = client.perform_request(self.build()?).await?;
        Ok(response.status().as_u16() == 200)
    }
}

/// Result of a refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Shard summary.
    #[serde(rename = "_shards", default)]
    pub shards: ShardsInfo,
}

/// Makes recent writes visible to search.
#[derive(Debug, Clone)]
pub struct IndicesRefreshService {
    client: Client,
    indices: Vec<String>,
}

impl IndicesRefreshService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
        }
    }

    /// Indices to refresh. All indices when none are given.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    fn build(self) -> PerformRequestOptions {
        let path = if self.indices.is_empty() {
            "/_refresh".to_string()
        } else {
            format!("/{}/_refresh", join_escaped(&self.indices))
        };
        PerformRequestOptions::new(Method::POST, path)
    }

    /// Send the request.
    pub async fn execute(self) -> Result<RefreshResponse> {
        let client = self.client.clone();
        client.perform(self.build()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_client;
    use searchwire_client::Error;

    #[test]
    fn test_settings_json() {
        let settings = IndexSettings::new()
            .shards(1)
            .replicas(0)
            .mappings(json!({"properties": {"user": {"type": "keyword"}}}));

        assert_eq!(
            settings.to_json(),
            json!({
                "settings": {"number_of_shards": 1, "number_of_replicas": 0},
                "mappings": {"properties": {"user": {"type": "keyword"}}}
            })
        );
        assert_eq!(IndexSettings::new().to_json(), json!({}));
    }

    #[test]
    fn test_create_request() {
        let opts = IndicesCreateService::new(test_client())
            .index("tweets")
            .settings(&IndexSettings::new().shards(2))
            .wait_for_active_shards("1")
            .build()
            .unwrap();

        assert_eq!(opts.method, Method::PUT);
        assert_eq!(opts.path, "/tweets");
        assert_eq!(opts.params, vec![("wait_for_active_shards".to_string(), "1".to_string())]);
        assert!(opts.body.is_some());
    }

    #[test]
    fn test_delete_requires_indices() {
        let err = IndicesDeleteService::new(test_client()).build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let opts = IndicesDeleteService::new(test_client())
            .indices(["a", "b"])
            .build()
            .unwrap();
        assert_eq!(opts.path, "/a,b");
    }

    #[test]
    fn test_exists_ignores_not_found() {
        let opts = IndicesExistsService::new(test_client())
            .indices(["tweets"])
            .build()
            .unwrap();
        assert_eq!(opts.method, Method::HEAD);
        assert_eq!(opts.ignore_errors, vec![404]);
    }

    #[test]
    fn test_refresh_paths() {
        assert_eq!(IndicesRefreshService::new(test_client()).build().path, "/_refresh");
        assert_eq!(
            IndicesRefreshService::new(test_client())
                .indices(["a", "b"])
                .build()
                .path,
            "/a,b/_refresh"
        );
    }
}
