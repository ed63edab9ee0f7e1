//! Dispatch client.

use crate::config::{BasicAuth, ClientConfig};
use crate::decoder::{decode_into, Decoder};
use crate::error::check_response;
use crate::health::{HealthChecker, Prober};
use crate::logger::Loggers;
use crate::pool::NodePool;
use crate::request::{Body, Request};
use crate::response::Response;
use crate::{Error, Result};
use bytes::BytesMut;
use http::Method;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delay between probe rounds while waiting for a first live node.
const STARTUP_PROBE_DELAY: Duration = Duration::from_secs(1);

/// Parameters of a single request.
#[derive(Debug)]
pub struct PerformRequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Path appended to the node base URL, e.g. `/twitter/_doc/1`.
    pub path: String,
    /// Query parameters, percent-encoded on the wire.
    pub params: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Body>,
    /// Content-Type override, e.g. `application/x-ndjson`.
    pub content_type: Option<String>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Statuses treated as success.
    pub ignore_errors: Vec<u16>,
    /// Upper bound on the response body size.
    pub max_response_size: Option<u64>,
    /// Deadline for the whole exchange.
    pub timeout: Option<Duration>,
    /// Cancels the in-flight request.
    pub cancel: Option<CancellationToken>,
}

impl PerformRequestOptions {
    /// Options for `method` on `path` with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            content_type: None,
            headers: Vec::new(),
            ignore_errors: Vec::new(),
            max_response_size: None,
            timeout: None,
            cancel: None,
        }
    }

    /// Add a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the Content-Type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Treat `status` as success.
    pub fn ignore_error(mut self, status: u16) -> Self {
        self.ignore_errors.push(status);
        self
    }

    /// Limit the response body size.
    pub fn max_response_size(mut self, limit: u64) -> Self {
        self.max_response_size = Some(limit);
        self
    }

    /// Bound the exchange by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort when `token` is cancelled.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Settings read on every request, replaced rarely.
#[derive(Clone)]
struct Settings {
    basic_auth: Option<BasicAuth>,
    gzip: bool,
    send_get_body_as: Method,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    decoder: Arc<dyn Decoder>,
    loggers: Loggers,
}

struct ClientInner {
    pool: Arc<NodePool>,
    http: reqwest::Client,
    settings: RwLock<Settings>,
    health: Mutex<Option<HealthChecker>>,
}

/// Elasticsearch client.
///
/// Cheap to clone; clones share the node pool, the transport and the
/// health-check task.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client.
    ///
    /// With health checks enabled, waits until at least one node answers a
    /// probe (up to `healthcheck_timeout_startup`) and starts the periodic
    /// health checker. Fails with [`Error::NoClientAvailable`] when no node
    /// answers in time.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let client = Self::build(&config)?;

        if config.healthcheck {
            let prober = Prober::new(
                client.inner.http.clone(),
                config.healthcheck_timeout,
                config.basic_auth.clone(),
            );
            wait_for_live_node(
                &client.inner.pool,
                &prober,
                config.healthcheck_timeout_startup,
            )
            .await?;

            let checker = HealthChecker::spawn(
                &client.inner.pool,
                prober,
                config.healthcheck_interval,
                config.loggers.clone(),
            );
            *client.inner.health.lock() = Some(checker);
        }

        Ok(client)
    }

    /// Create a client without the startup check or health checker.
    ///
    /// Does not need a running runtime.
    pub fn new_simple(config: ClientConfig) -> Result<Self> {
        Self::build(&config)
    }

    fn build(config: &ClientConfig) -> Result<Self> {
        let http = match &config.http_client {
            Some(http) => http.clone(),
            None => reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .user_agent(&config.user_agent)
                .gzip(true)
                .build()
                .map_err(|e| Error::Build(e.to_string()))?,
        };

        let pool = Arc::new(NodePool::new(&config.urls)?);
        debug!(nodes = pool.len(), "Client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                pool,
                http,
                settings: RwLock::new(Settings {
                    basic_auth: config.basic_auth.clone(),
                    gzip: config.gzip,
                    send_get_body_as: config.send_get_body_as.clone(),
                    default_headers: config.default_headers.clone(),
                    timeout: config.timeout,
                    decoder: config.decoder.clone(),
                    loggers: config.loggers.clone(),
                }),
                health: Mutex::new(None),
            }),
        })
    }

    /// The node pool.
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.inner.pool
    }

    /// The configured decoder.
    pub fn decoder(&self) -> Arc<dyn Decoder> {
        self.inner.settings.read().decoder.clone()
    }

    /// Replace the decoder.
    pub fn set_decoder(&self, decoder: Arc<dyn Decoder>) {
        self.inner.settings.write().decoder = decoder;
    }

    /// Enable or disable gzip compression of request bodies.
    pub fn set_gzip(&self, enable: bool) {
        self.inner.settings.write().gzip = enable;
    }

    /// Replace the Basic credentials. Does not affect the health checker.
    pub fn set_basic_auth(&self, auth: Option<BasicAuth>) {
        self.inner.settings.write().basic_auth = auth;
    }

    /// Replace the method used for GET requests with a body.
    pub fn set_send_get_body_as(&self, method: Method) {
        self.inner.settings.write().send_get_body_as = method;
    }

    /// Replace the log sinks used by requests.
    pub fn set_loggers(&self, loggers: Loggers) {
        self.inner.settings.write().loggers = loggers;
    }

    /// Probe every node now, outside the periodic schedule.
    pub async fn health_check_now(&self, timeout: Duration) -> crate::pool::ProbeReport {
        let auth = self.inner.settings.read().basic_auth.clone();
        let prober = Prober::new(self.inner.http.clone(), timeout, auth);
        self.inner.pool.probe_all(&prober).await
    }

    /// Whether the health checker is running.
    pub fn is_running(&self) -> bool {
        self.inner
            .health
            .lock()
            .as_ref()
            .is_some_and(HealthChecker::is_running)
    }

    /// Stop the health checker. Requests keep working.
    pub fn stop(&self) {
        if let Some(checker) = self.inner.health.lock().take() {
            checker.stop();
        }
    }

    /// Execute one request against the next live node.
    ///
    /// Statuses outside `200..=299` that are not in `ignore_errors` come back
    /// as [`Error::Elastic`]. A transport failure is returned as is: the call
    /// is not retried on another node.
    pub async fn perform_request(&self, opts: PerformRequestOptions) -> Result<Response> {
        let settings = self.inner.settings.read().clone();
        let PerformRequestOptions {
            mut method,
            path,
            params,
            body,
            content_type,
            headers,
            ignore_errors,
            max_response_size,
            timeout,
            cancel,
        } = opts;

        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        if method == Method::GET && body.is_some() && settings.send_get_body_as != Method::GET {
            method = settings.send_get_body_as.clone();
        }

        let node = self.inner.pool.next_node()?;
        let url = build_url(node.url(), &path, &params)?;

        let mut request = Request::new(method.clone(), url.as_str())?;
        for (name, value) in &settings.default_headers {
            request.set_header(name, value)?;
        }
        if let Some(content_type) = &content_type {
            request.set_content_type(content_type)?;
        }
        for (name, value) in &headers {
            request.set_header(name, value)?;
        }
        if let Some(auth) = &settings.basic_auth {
            request.set_basic_auth(&auth.username, &auth.password);
        }
        if let Some(body) = body {
            request.set_body(body, settings.gzip)?;
        }
        settings.loggers.trace(|| request.dump());

        let start = Instant::now();
        let exchange = self.execute(request.into_transport(settings.timeout), max_response_size);
        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(limit)),
                },
                None => exchange.await,
            }
        };
        let response = match &cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                response = bounded => response?,
            },
            None => bounded.await?,
        };
        let elapsed = start.elapsed();

        check_response(response.status(), response.bytes(), &ignore_errors)?;

        settings.loggers.trace(|| response.dump());
        settings.loggers.info(|| {
            format!(
                "{} {} [status:{}, request:{:.3}s]",
                method,
                url,
                response.status().as_u16(),
                elapsed.as_secs_f64()
            )
        });
        debug!(
            method = %method,
            url = %url,
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        Ok(response)
    }

    /// Execute a request and decode the body into `T`.
    pub async fn perform<T: DeserializeOwned>(&self, opts: PerformRequestOptions) -> Result<T> {
        let response = self.perform_request(opts).await?;
        self.decode(&response)
    }

    /// Decode a response body through the configured decoder.
    pub fn decode<T: DeserializeOwned>(&self, response: &Response) -> Result<T> {
        let decoder = self.decoder();
        decode_into(decoder.as_ref(), response.bytes())
    }

    async fn execute(&self, request: reqwest::Request, limit: Option<u64>) -> Result<Response> {
        let url = request.url().clone();
        let mut response = self.inner.http.execute(request).await?;

        if let Some(limit) = limit
            && response.content_length().is_some_and(|len| len > limit)
        {
            return Err(Error::ResponseTooLarge { limit });
        }

        let status = response.status();
        let headers = response.headers().clone();
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if let Some(limit) = limit
                && (body.len() + chunk.len()) as u64 > limit
            {
                return Err(Error::ResponseTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Response::new(status, headers, body.freeze(), url))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.inner.pool)
            .field("health_check_running", &self.is_running())
            .finish()
    }
}

/// Join base URL, path and query.
fn build_url(base: &str, path: &str, params: &[(String, String)]) -> Result<url::Url> {
    let joined = if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    let mut url =
        url::Url::parse(&joined).map_err(|e| Error::InvalidUrl(format!("{joined}: {e}")))?;

    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

async fn wait_for_live_node(pool: &NodePool, prober: &Prober, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let report = pool.probe_all(prober).await;
        if report.alive > 0 {
            debug!(alive = report.alive, dead = report.dead, "Startup health check passed");
            return Ok(());
        }
        if tokio::time::Instant::now() + STARTUP_PROBE_DELAY > deadline {
            break;
        }
        tokio::time::sleep(STARTUP_PROBE_DELAY).await;
    }

    tracing::warn!(nodes = pool.len(), "No node answered the startup health check");
    Err(Error::NoClientAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str]) -> ClientConfig {
        ClientConfig::builder()
            .urls(urls.iter().copied())
            .healthcheck(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_url() {
        let url = build_url(
            "http://localhost:9200",
            "/twitter/_search",
            &[("q".into(), "user:kimchy & more".into()), ("size".into(), "10".into())],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/twitter/_search?q=user%3Akimchy+%26+more&size=10"
        );

        let url = build_url("http://localhost:9200/es", "_cluster/health", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/es/_cluster/health");
    }

    #[test]
    fn test_new_simple() {
        let client = Client::new_simple(config(&["http://a:9200", "http://b:9200"])).unwrap();
        assert_eq!(client.pool().len(), 2);
        assert!(!client.is_running());
    }

    #[test]
    fn test_settings_can_be_replaced() {
        let client = Client::new_simple(config(&["http://a:9200"])).unwrap();
        client.set_gzip(true);
        client.set_send_get_body_as(Method::POST);
        client.set_basic_auth(Some(BasicAuth::new("u", "p")));

        let settings = client.inner.settings.read();
        assert!(settings.gzip);
        assert_eq!(settings.send_get_body_as, Method::POST);
        assert!(settings.basic_auth.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Client::new_simple(config(&["http://127.0.0.1:19200"])).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .perform_request(PerformRequestOptions::new(Method::GET, "/").cancel(token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_no_live_node() {
        let client = Client::new_simple(config(&["http://127.0.0.1:19200"])).unwrap();
        client.pool().nodes()[0].mark_dead();

        let err = client
            .perform_request(PerformRequestOptions::new(Method::GET, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoClientAvailable));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let client = Client::new_simple(config(&["http://127.0.0.1:19200"])).unwrap();

        let err = client
            .perform_request(PerformRequestOptions::new(Method::GET, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(crate::is_connection_error(&err));
        assert!(client.pool().nodes()[0].is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_check_gives_up() {
        let pool = NodePool::new(["http://127.0.0.1:19200"]).unwrap();
        let prober = Prober::new(reqwest::Client::new(), Duration::from_millis(50), None);

        let err = wait_for_live_node(&pool, &prober, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoClientAvailable));
    }
}
