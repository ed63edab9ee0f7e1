//! # searchwire client
//!
//! Request-dispatch core for Elasticsearch and OpenSearch: a pool of nodes
//! with round-robin selection and dead-node skipping, a periodic health
//! checker, request body encoding with optional gzip, structured error
//! classification, and pluggable response decoding.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use searchwire_client::{Client, ClientConfig, PerformRequestOptions, Method};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .url("http://localhost:9200")
//!         .build()?;
//!     let client = Client::new(config).await?;
//!
//!     let health: serde_json::Value = client
//!         .perform(PerformRequestOptions::new(Method::GET, "/_cluster/health"))
//!         .await?;
//!
//!     println!("Cluster status: {}", health["status"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```rust,no_run
//! use searchwire_client::{is_not_found, Client, PerformRequestOptions, Method};
//!
//! # async fn example(client: &Client) -> searchwire_client::Result<()> {
//! let opts = PerformRequestOptions::new(Method::GET, "/tweets/_doc/1");
//! match client.perform_request(opts).await {
//!     Ok(response) => println!("{}", response.text()?),
//!     Err(e) if is_not_found(&e) => println!("no such document"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod decoder;
mod error;
mod health;
mod logger;
mod node;
mod pool;
mod request;
mod response;

pub use client::{Client, PerformRequestOptions};
pub use config::{BasicAuth, ClientConfig, ClientConfigBuilder};
pub use decoder::{
    decode_into, BigNumberDecoder, CountingDecoder, DecodeSlot, DecodeTarget, Decoder,
    DefaultDecoder,
};
pub use error::{
    check_response, is_conflict, is_connection_error, is_forbidden, is_not_found,
    is_status_code, is_timeout, is_unauthorized, ElasticError, Error, ErrorDetails, Result,
};
pub use health::{HealthChecker, Prober};
pub use logger::{Logger, Loggers, TracingLogger};
pub use node::Node;
pub use pool::{NodePool, ProbeReport, DEFAULT_URL};
pub use request::{Body, BodyStream, Request};
pub use response::Response;

// Re-export common types
pub use bytes::Bytes;
pub use http::{header, HeaderMap, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use searchwire_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{Client, PerformRequestOptions};
    pub use crate::config::{BasicAuth, ClientConfig, ClientConfigBuilder};
    pub use crate::decoder::{Decoder, DefaultDecoder};
    pub use crate::error::{is_not_found, ElasticError, Error, Result};
    pub use crate::request::Body;
    pub use crate::response::Response;
    pub use http::{Method, StatusCode};
}
