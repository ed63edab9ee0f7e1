//! Integration tests for common Searchwire workflows.
//!
//! These tests go through the facade crate the way an application would.

use searchwire::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tweet {
    user: String,
    message: String,
    retweets: u32,
}

async fn cluster() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_connection_string_config() {
    let config = ClientConfig::from_connection_string(
        "http://127.0.0.1:9200?url=http://127.0.0.1:9201&gzip=true&healthcheck=false",
    )
    .unwrap();

    assert_eq!(config.urls, vec!["http://127.0.0.1:9200", "http://127.0.0.1:9201"]);
    assert!(config.gzip);
    assert!(!config.healthcheck);
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = ClientConfig::builder()
        .url("http://127.0.0.1:9200")
        .url("http://127.0.0.1:9200")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let err = ClientConfig::builder().url("ftp://127.0.0.1").build().unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_) | Error::Config(_)));
}

// =============================================================================
// Document Workflow
// =============================================================================

#[tokio::test]
async fn test_index_then_get_then_search() {
    let server = cluster().await;
    let tweet = Tweet {
        user: "olivere".into(),
        message: "Take Five".into(),
        retweets: 0,
    };

    Mock::given(method("PUT"))
        .and(path("/twitter/_doc/1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_index": "twitter", "_id": "1", "_version": 1, "result": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/twitter/_doc/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_index": "twitter", "_id": "1", "_version": 1, "found": true,
            "_source": {"user": "olivere", "message": "Take Five", "retweets": 0}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/twitter/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": {"value": 1, "relation": "eq"},
                "hits": [{"_index": "twitter", "_id": "1", "_score": 1.0,
                    "_source": {"user": "olivere", "message": "Take Five", "retweets": 0}}]
            }
        })))
        .mount(&server)
        .await;

    let config = ClientConfig::builder().url(server.uri()).build().unwrap();
    let client = assert_ok!(Client::new(config).await);

    let indexed = assert_ok!(
        client
            .index()
            .index("twitter")
            .id("1")
            .body(&tweet)
            .unwrap()
            .refresh(Refresh::True)
            .execute()
            .await
    );
    assert_eq!(indexed.result, "created");

    let fetched = assert_ok!(client.get().index("twitter").id("1").execute().await);
    assert_eq!(fetched.source_as::<Tweet>().unwrap(), Some(tweet.clone()));

    let found = assert_ok!(
        client
            .search(["twitter"])
            .query(json!({"term": {"user": "olivere"}}))
            .execute()
            .await
    );
    assert_eq!(found.total_hits(), 1);
    assert_eq!(found.sources::<Tweet>().unwrap(), vec![tweet]);

    client.stop();
}

// =============================================================================
// Raw Requests
// =============================================================================

#[tokio::test]
async fn test_raw_request_and_error_classification() {
    let server = cluster().await;
    Mock::given(method("GET"))
        .and(path("/missing/_mapping"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "type": "index_not_found_exception",
                "reason": "no such index [missing]",
                "index": "missing"
            },
            "status": 404
        })))
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .url(server.uri())
        .healthcheck(false)
        .build()
        .unwrap();
    let client = Client::new_simple(config).unwrap();

    let err = assert_err!(
        client
            .perform_request(PerformRequestOptions::new(Method::GET, "/missing/_mapping"))
            .await
    );
    assert!(is_not_found(&err));
    assert!(!is_timeout(&err));

    let response = assert_ok!(
        client
            .perform_request(
                PerformRequestOptions::new(Method::GET, "/missing/_mapping").ignore_error(404)
            )
            .await
    );
    assert_eq!(response.status().as_u16(), 404);
}

// =============================================================================
// Health Checks
// =============================================================================

#[tokio::test]
async fn test_health_check_now_reports_nodes() {
    let server = cluster().await;
    let config = ClientConfig::builder()
        .url(server.uri())
        .url("http://127.0.0.1:19299")
        .healthcheck(false)
        .build()
        .unwrap();
    let client = Client::new_simple(config).unwrap();

    let report = client.health_check_now(Duration::from_millis(500)).await;
    assert_eq!(report.alive, 1);
    assert_eq!(client.pool().alive_count(), 1);
    assert_eq!(client.pool().next_url().unwrap(), server.uri());
}
