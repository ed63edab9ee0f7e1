//! Search and count.

use crate::document::ShardsInfo;
use crate::{collect_names, join_escaped};
use searchwire_client::{Client, Method, PerformRequestOptions, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Total hit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TotalHits {
    /// Number of hits.
    pub value: u64,
    /// `eq` when exact, `gte` when a lower bound.
    pub relation: &'static str,
}

impl<'de> Deserialize<'de> for TotalHits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // 6.x sends a bare number, 7.x and later an object.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Object { value: u64, relation: String },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) => TotalHits {
                value,
                relation: "eq",
            },
            Raw::Object { value, relation } => TotalHits {
                value,
                relation: if relation == "gte" { "gte" } else { "eq" },
            },
        })
    }
}

/// A single hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index name.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Relevance score.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    /// Routing value.
    #[serde(rename = "_routing", default)]
    pub routing: Option<String>,
    /// Raw document source.
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
    /// Sort values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    /// Highlighted fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
}

impl SearchHit {
    /// Deserialize the source into `T`.
    pub fn source_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.source {
            Some(source) => Ok(Some(T::deserialize(source)?)),
            None => Ok(None),
        }
    }
}

/// Hits section of a search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHits {
    /// Total hit count, absent when tracking is disabled.
    pub total: Option<TotalHits>,
    /// Highest score.
    pub max_score: Option<f64>,
    /// Returned hits.
    pub hits: Vec<SearchHit>,
}

/// Search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    /// Time taken in milliseconds.
    pub took: u64,
    /// Whether the search timed out.
    pub timed_out: bool,
    /// Shard summary.
    #[serde(rename = "_shards")]
    pub shards: Option<ShardsInfo>,
    /// Hits.
    pub hits: SearchHits,
    /// Raw aggregation results.
    pub aggregations: Option<Value>,
    /// Scroll id, when scrolling.
    #[serde(rename = "_scroll_id")]
    pub scroll_id: Option<String>,
}

impl SearchResult {
    /// Total hit count, or 0 when not tracked.
    pub fn total_hits(&self) -> u64 {
        self.hits.total.map_or(0, |t| t.value)
    }

    /// Deserialize every hit source into `T`, skipping hits without one.
    pub fn sources<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut docs = Vec::with_capacity(self.hits.hits.len());
        for hit in &self.hits.hits {
            if let Some(doc) = hit.source_as()? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Runs a search with a raw JSON query.
#[derive(Debug, Clone)]
pub struct SearchService {
    client: Client,
    indices: Vec<String>,
    query: Option<Value>,
    from: Option<u64>,
    size: Option<u64>,
    sort: Vec<Value>,
    source_includes: Vec<String>,
    source_excludes: Vec<String>,
    aggregations: serde_json::Map<String, Value>,
    track_total_hits: Option<bool>,
    routing: Option<String>,
    preference: Option<String>,
    timeout: Option<String>,
}

impl SearchService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            query: None,
            from: None,
            size: None,
            sort: Vec::new(),
            source_includes: Vec::new(),
            source_excludes: Vec::new(),
            aggregations: serde_json::Map::new(),
            track_total_hits: None,
            routing: None,
            preference: None,
            timeout: None,
        }
    }

    /// Indices to search. All indices when none are given.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    /// Query clause, e.g. `{"match_all": {}}`.
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Pagination offset.
    pub fn from(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    /// Page size.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sort on a field.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let mut clause = serde_json::Map::new();
        clause.insert(field.into(), json!({ "order": order.as_str() }));
        self.sort.push(Value::Object(clause));
        self
    }

    /// Return only these source fields.
    pub fn source_includes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_includes.extend(collect_names(fields));
        self
    }

    /// Leave these source fields out.
    pub fn source_excludes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_excludes.extend(collect_names(fields));
        self
    }

    /// Add a raw aggregation.
    pub fn aggregation(mut self, name: impl Into<String>, aggregation: Value) -> Self {
        self.aggregations.insert(name.into(), aggregation);
        self
    }

    /// Count every hit exactly.
    pub fn track_total_hits(mut self, track: bool) -> Self {
        self.track_total_hits = Some(track);
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

    /// Server-side timeout, e.g. `5s`.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Request body.
    pub fn body(&self) -> Value {
        let mut body = serde_json::Map::new();

        if let Some(query) = &self.query {
            body.insert("query".to_string(), query.clone());
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if !self.sort.is_empty() {
            body.insert("sort".to_string(), Value::Array(self.sort.clone()));
        }

        let mut source = serde_json::Map::new();
        if !self.source_includes.is_empty() {
            source.insert("includes".to_string(), json!(self.source_includes));
        }
        if !self.source_excludes.is_empty() {
            source.insert("excludes".to_string(), json!(self.source_excludes));
        }
        if !source.is_empty() {
            body.insert("_source".to_string(), Value::Object(source));
        }

        if !self.aggregations.is_empty() {
            body.insert("aggregations".to_string(), Value::Object(self.aggregations.clone()));
        }
        if let Some(track) = self.track_total_hits {
            body.insert("track_total_hits".to_string(), json!(track));
        }
        if let Some(timeout) = &self.timeout {
            body.insert("timeout".to_string(), json!(timeout));
        }

        Value::Object(body)
    }

    fn build(self) -> PerformRequestOptions {
        let body = self.body();
        let mut opts = PerformRequestOptions::new(Method::POST, index_path(&self.indices, "_search"))
            .body(body);
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        if let Some(preference) = self.preference {
            opts = opts.param("preference", preference);
        }
        opts
    }

    /// Send the request.
    pub async fn execute(self) -> Result<SearchResult> {
        let client = self.client.clone();
        let opts = self.build();
        debug!(path = %opts.path, "Searching");
        client.perform(opts).await
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

/// Counts documents matching a query.
#[derive(Debug, Clone)]
pub struct CountService {
    client: Client,
    indices: Vec<String>,
    query: Option<Value>,
    routing: Option<String>,
}

impl CountService {
    /// Create the service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            indices: Vec::new(),
            query: None,
            routing: None,
        }
    }

    /// Indices to count in. All indices when none are given.
    pub fn indices<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indices.extend(collect_names(names));
        self
    }

    /// Query clause. Counts everything when unset.
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Routing value.
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    fn build(self) -> PerformRequestOptions {
        let mut opts = PerformRequestOptions::new(Method::POST, index_path(&self.indices, "_count"));
        if let Some(query) = self.query {
            opts = opts.body(json!({ "query": query }));
        }
        if let Some(routing) = self.routing {
            opts = opts.param("routing", routing);
        }
        opts
    }

    /// Number of matching documents.
    pub async fn execute(self) -> Result<u64> {
        let client = self.client.clone();
        let response: CountResponse = client.perform(self.build()).await?;
        Ok(response.count)
    }
}

fn index_path(indices: &[String], endpoint: &str) -> String {
    if indices.is_empty() {
        format!("/{endpoint}")
    } else {
        format!("/{}/{endpoint}", join_escaped(indices))
    }
}
