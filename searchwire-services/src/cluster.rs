//! Cluster health and ping.

use crate::{collect_names, join_escaped};
use searchwire_client::{Client, Method, PerformRequestOptions, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster health colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// All shards allocated.
    #[default]
    Green,
    /// Primaries allocated, some replicas not.
    Yellow,
    /// Some primaries unallocated.
    Red,
}

impl ClusterStatus {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster health response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterHealthResponse {
    /// Cluster name.
    pub cluster_name: String,
    /// Health colour.
    pub status: ClusterStatus,
    /// Whether the wait condition timed out.
    pub timed_out: bool,
    /// Nodes in the cluster.
    pub number_of_nodes: u32,
    /// Data nodes in the cluster.
    pub number_of_data_nodes: u32,
    /// Active primary shards.
    pub active_primary_shards: u32,
    /// Active shards.
    pub active_shards: u32,
    /// Relocating shards.
    pub relocating_shards: u32,
    /// Initializing shards.
    pub initializing_shards: u32,
    /// Unassigned shards.
    pub unassigned_shards: u32,
    /// Pending cluster tasks.
    pub number_of_pending_tasks: u32,
    /// Percentage of active shards.
    pub active_shards_percent_as_number: f64,
}

/// Reads cluster health, optionally waiting for a status.
#[derive(Debug, Clone)]
pub struct ClusterHealthService {
    client: Client,
    indices: Vec<String>,
    wait_for_status: Option<ClusterStatus>,
    level: Option<String>,
    timeout: Option<String>,
    local: Option<bool>,
}

impl ClusterHealthService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            wait_for_status: None,
            level: None,
            timeout: None,
            local: None,
        }
    }

    /// Limit to these indices.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    /// Wait until the cluster reaches this status or better.
    pub fn wait_for_status(mut self, status: ClusterStatus) -> Self {
        self.wait_for_status = Some(status);
        self
    }

    /// Wait for green.
    pub fn wait_for_green(self) -> Self {
        self.wait_for_status(ClusterStatus::Green)
    }

    /// Wait for yellow.
    pub fn wait_for_yellow(self) -> Self {
        self.wait_for_status(ClusterStatus::Yellow)
    }

    /// Detail level: `cluster`, `indices` or `shards`.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// How long to wait, e.g. `30s`.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Read from the local node instead of the master.
    pub fn local(mut self, local: bool) -> Self {
        self.local = Some(local);
        self
    }

    fn build(self) -> PerformRequestOptions {
        let path = if self.indices.is_empty() {
            "/_cluster/health".to_string()
        } else {
            format!("/_cluster/health/{}", join_escaped(&self.indices))
        };

        let mut opts = PerformRequestOptions::new(Method::GET, path);
        if let Some(status) = self.wait_for_status {
            opts = opts.param("wait_for_status", status);
        }
        if let Some(level) = self.level {
            opts = opts.param("level", level);
        }
        if let Some(timeout) = self.timeout {
            opts = opts.param("timeout", timeout);
        }
        if let Some(local) = self.local {
            opts = opts.param("local", local);
        }
        opts
    }

    /// Send the request.
    pub async fn execute(self) -> Result<ClusterHealthResponse> {
        let client = self.client.clone();
        client.perform(self.build()).await
    }
}

/// Version block of the root endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingVersion {
    /// Server version, e.g. `8.11.0`.
    pub number: String,
    /// Build flavor.
    pub build_flavor: Option<String>,
    /// Distribution, set by OpenSearch.
    pub distribution: Option<String>,
    /// Lucene version.
    pub lucene_version: Option<String>,
}

/// Root endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingResult {
    /// Node name.
    pub name: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Cluster UUID.
    pub cluster_uuid: String,
    /// Version details.
    pub version: PingVersion,
    /// Tagline.
    pub tagline: String,
}

/// Fetches basic node information from `/`.
#[derive(Debug, Clone)]
pub struct PingService {
    client: Client,
}

impl PingService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build(self) -> PerformRequestOptions {
        PerformRequestOptions::new(Method::GET, "/")
    }

    /// Send the request.
    pub async fn execute(self) -> Result<PingResult> {
        let client = self.client.clone();
        client.perform(self.build()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_client;
    use serde_json::json;

    #[test]
    fn test_health_request() {
        let opts = ClusterHealthService::new(test_client())
            .indices(["a", "b"])
            .wait_for_yellow()
            .timeout("10s")
            .build();

        assert_eq!(opts.method, Method::GET);
        assert_eq!(opts.path, "/_cluster/health/a,b");
        assert_eq!(
            opts.params,
            vec![
                ("wait_for_status".to_string(), "yellow".to_string()),
                ("timeout".to_string(), "10s".to_string()),
            ]
        );
    }

    #[test]
    fn test_health_whole_cluster() {
        let opts = ClusterHealthService::new(test_client()).build();
        assert_eq!(opts.path, "/_cluster/health");
        assert!(opts.params.is_empty());
    }

    #[test]
    fn test_status_order() {
        assert!(ClusterStatus::Green < ClusterStatus::Red);
        let status: ClusterStatus = serde_json::from_value(json!("yellow")).unwrap();
        assert_eq!(status, ClusterStatus::Yellow);
        assert_eq!(status.to_string(), "yellow");
    }

    #[test]
    fn test_ping_decode() {
        let ping: PingResult = serde_json::from_value(json!({
            "name": "node-1",
            "cluster_name": "elasticsearch",
            "cluster_uuid": "abc",
            "version": {"number": "8.11.0", "build_flavor": "default", "lucene_version": "9.8.0"},
            "tagline": "You Know, for Search"
        }))
        .unwrap();

        assert_eq!(ping.version.number, "8.11.0");
        assert_eq!(ping.tagline, "You Know, for Search");
        assert_eq!(PingService::new(test_client()).build().path, "/");
    }
}
