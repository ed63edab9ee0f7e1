//! Service builders for the searchwire client.
//!
//! Each builder maps its fields onto a single
//! [`PerformRequestOptions`](searchwire_client::PerformRequestOptions) and
//! hands it to [`Client::perform_request`]. Builders are created through
//! [`ClientExt`].
//!
//! # Example
//!
//! ```rust,no_run
//! use searchwire_client::{Client, ClientConfig};
//! use searchwire_services::{ClientExt, Refresh};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::default()).await?;
//!
//!     client
//!         .index()
//!         .index("tweets")
//!         .id("1")
//!         .body_json(json!({"user": "olivere", "message": "Welcome"}))
//!         .refresh(Refresh::WaitFor)
//!         .execute()
//!         .await?;
//!
//!     let result = client
//!         .search(["tweets"])
//!         .query(json!({"term": {"user": "olivere"}}))
//!         .size(10)
//!         .execute()
//!         .await?;
//!     println!("{} hits", result.total_hits());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod bulk;
mod cluster;
mod document;
mod indices;
mod search;
mod update_by_query;

pub use bulk::{
    BulkDeleteRequest, BulkIndexRequest, BulkResponse, BulkResponseItem, BulkService,
    BulkUpdateRequest, BulkableRequest,
};
pub use cluster::{
    ClusterHealthResponse, ClusterHealthService, ClusterStatus, PingResult, PingService,
    PingVersion,
};
pub use document::{
    DeleteService, ExistsService, GetResult, GetService, IndexResponse, IndexService, OpType,
    ShardsInfo,
};
pub use indices::{
    AcknowledgedResponse, IndexSettings, IndicesCreateResponse, IndicesCreateService,
    IndicesDeleteService, IndicesExistsService, IndicesRefreshService, RefreshResponse,
};
pub use search::{
    CountService, SearchHit, SearchHits, SearchResult, SearchService, SortOrder, TotalHits,
};
pub use update_by_query::{ConflictPolicy, UpdateByQueryResponse, UpdateByQueryService};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use searchwire_client::{Client, Error, Result};

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// When changes become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refresh the affected shards immediately.
    True,
    /// Do not refresh.
    False,
    /// Wait for the next scheduled refresh.
    WaitFor,
}

impl Refresh {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::WaitFor => "wait_for",
        }
    }
}

/// Entry points for every service builder.
pub trait ClientExt {
    /// Index a document.
    fn index(&self) -> IndexService;
    /// Fetch a document by id.
    fn get(&self) -> GetService;
    /// Check whether a document exists.
    fn exists(&self) -> ExistsService;
    /// Delete a document.
    fn delete(&self) -> DeleteService;
    /// Create an index.
    fn create_index(&self, name: impl Into<String>) -> IndicesCreateService;
    /// Delete indices.
    fn delete_index<I, S>(&self, names: I) -> IndicesDeleteService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Check whether indices exist.
    fn index_exists<I, S>(&self, names: I) -> IndicesExistsService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Refresh indices; all indices when empty.
    fn refresh<I, S>(&self, names: I) -> IndicesRefreshService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Search indices; all indices when empty.
    fn search<I, S>(&self, indices: I) -> SearchService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Count documents; all indices when empty.
    fn count<I, S>(&self, indices: I) -> CountService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Send several write actions in one request.
    fn bulk(&self) -> BulkService;
    /// Update every document matching a query.
    fn update_by_query<I, S>(&self, indices: I) -> UpdateByQueryService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>;
    /// Cluster health.
    fn cluster_health(&self) -> ClusterHealthService;
    /// Basic node information.
    fn ping(&self) -> PingService;
}

impl ClientExt for Client {
    fn index(&self) -> IndexService {
        IndexService::new(self.clone())
    }

    fn get(&self) -> GetService {
        GetService::new(self.clone())
    }

    fn exists(&self) -> ExistsService {
        ExistsService::new(self.clone())
    }

    fn delete(&self) -> DeleteService {
        DeleteService::new(self.clone())
    }

    fn create_index(&self, name: impl Into<String>) -> IndicesCreateService {
        IndicesCreateService::new(self.clone()).index(name)
    }

    fn delete_index<I, S>(&self, names: I) -> IndicesDeleteService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndicesDeleteService::new(self.clone()).indices(names)
    }

    fn index_exists<I, S>(&self, names: I) -> IndicesExistsService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndicesExistsService::new(self.clone()).indices(names)
    }

    fn refresh<I, S>(&self, names: I) -> IndicesRefreshService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndicesRefreshService::new(self.clone()).indices(names)
    }

    fn search<I, S>(&self, indices: I) -> SearchService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SearchService::new(self.clone()).indices(indices)
    }

    fn count<I, S>(&self, indices: I) -> CountService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CountService::new(self.clone()).indices(indices)
    }

    fn bulk(&self) -> BulkService {
        BulkService::new(self.clone())
    }

    fn update_by_query<I, S>(&self, indices: I) -> UpdateByQueryService
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UpdateByQueryService::new(self.clone()).indices(indices)
    }

    fn cluster_health(&self) -> ClusterHealthService {
        ClusterHealthService::new(self.clone())
    }

    fn ping(&self) -> PingService {
        PingService::new(self.clone())
    }
}

/// Escape one path segment.
pub(crate) fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Escape and comma-join index names.
pub(crate) fn join_escaped(names: &[String]) -> String {
    names
        .iter()
        .map(|name| escape(name))
        .collect::<Vec<_>>()
        .join(",")
}

/// Fail with a validation error naming the missing fields.
pub(crate) fn require(missing: &[(&str, bool)]) -> Result<()> {
    let names: Vec<&str> = missing
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    if names.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "missing required fields: {}",
            names.join(", ")
        )))
    }
}

pub(crate) fn collect_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

#[cfg(test)]
pub(crate) fn test_client() -> Client {
    let config = searchwire_client::ClientConfig::builder()
        .url("http://127.0.0.1:9200")
        .healthcheck(false)
        .build()
        .unwrap();
    Client::new_simple(config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("tweets"), "tweets");
        assert_eq!(escape("a/b c"), "a%2Fb%20c");
        assert_eq!(escape("id?x#y"), "id%3Fx%23y");
        assert_eq!(escape("logs-*"), "logs-*");
        assert_eq!(escape("héllo"), "h%C3%A9llo");
    }

    #[test]
    fn test_join_escaped() {
        let names = vec!["a".to_string(), "b/c".to_string()];
        assert_eq!(join_escaped(&names), "a,b%2Fc");
    }

    #[test]
    fn test_require() {
        assert!(require(&[("index", true), ("id", true)]).is_ok());
        let err = require(&[("index", false), ("id", false)]).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: missing required fields: index, id");
    }

    #[test]
    fn test_refresh_values() {
        assert_eq!(Refresh::True.as_str(), "true");
        assert_eq!(Refresh::WaitFor.as_str(), "wait_for");
    }
}
