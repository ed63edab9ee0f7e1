//! Response wrapper.

use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: url::Url,
}

impl Response {
    /// Assemble a response from already-read parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: url::Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// URL the request was sent to.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Raw body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Validation(format!("response body is not UTF-8: {e}")))
    }

    /// Parse the body with `serde_json`, bypassing the client's decoder.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Deprecation warnings from `Warning` headers.
    pub fn warnings(&self) -> Vec<String> {
        self.headers
            .get_all(http::header::WARNING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect()
    }

    /// Human-readable dump for the trace sink.
    pub fn dump(&self) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            out.push_str(&format!(
                "{name}: {}\r\n",
                value.to_str().unwrap_or("<binary>")
            ));
        }
        out.push_str("\r\n");
        out.push_str(&String::from_utf8_lossy(&self.body));
        out
    }
}
