//! Outgoing requests and body encoding.

use crate::{Error, Result};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::Stream;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;

/// Streaming body of unknown length.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Request payload.
pub enum Body {
    /// UTF-8 text, sent as is.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// A JSON value, serialized before sending.
    Json(serde_json::Value),
    /// A stream of chunks. Sent without Content-Length and never compressed.
    Stream(BodyStream),
}

impl Body {
    /// Serialize any value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Bytes(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Wrap a stream of chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Encoded bytes, or the stream handed back untouched.
    fn into_bytes(self) -> Result<std::result::Result<Bytes, BodyStream>> {
        Ok(match self {
            Self::Text(text) => Ok(Bytes::from(text)),
            Self::Bytes(bytes) => Ok(bytes),
            Self::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
            Self::Stream(stream) => Err(stream),
        })
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

enum Payload {
    Full(Bytes),
    Stream(BodyStream),
}

/// A request ready to hand to the transport.
pub struct Request {
    method: Method,
    url: url::Url,
    headers: HeaderMap,
    payload: Option<Payload>,
}

impl Request {
    /// Create a request. Content-Type defaults to `application/json`.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            method,
            url,
            headers,
            payload: None,
        })
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full URL including the query string.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::try_from(name)
            .map_err(|e| Error::Validation(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| Error::Validation(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Override the Content-Type.
    pub fn set_content_type(&mut self, content_type: &str) -> Result<()> {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Set Basic authentication.
    pub fn set_basic_auth(&mut self, username: &str, password: &str) {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        if let Ok(mut value) = HeaderValue::try_from(format!("Basic {encoded}")) {
            value.set_sensitive(true);
            self.headers.insert(header::AUTHORIZATION, value);
        }
    }

    /// Attach a body, optionally gzip-compressed.
    ///
    /// Content-Length is set for every body of known length, including the
    /// empty one. Streams are sent uncompressed and without Content-Length.
    pub fn set_body(&mut self, body: Body, compress: bool) -> Result<()> {
        match body.into_bytes()? {
            Ok(bytes) => {
                let bytes = if compress {
                    self.headers
                        .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                    gzip(&bytes)?
                } else {
                    self.headers.remove(header::CONTENT_ENCODING);
                    bytes
                };
                self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                self.payload = Some(Payload::Full(bytes));
            }
            Err(stream) => {
                self.headers.remove(header::CONTENT_LENGTH);
                self.headers.remove(header::CONTENT_ENCODING);
                self.payload = Some(Payload::Stream(stream));
            }
        }
        Ok(())
    }

    /// Whether a body has been attached.
    pub fn has_body(&self) -> bool {
        self.payload.is_some()
    }

    /// Declared Content-Length, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// The encoded body, unless it is a stream.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            Some(Payload::Full(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Human-readable dump with credentials redacted.
    pub fn dump(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.url);
        for (name, value) in &self.headers {
            let value = if name == header::AUTHORIZATION {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        match &self.payload {
            Some(Payload::Full(bytes)) if self.headers.contains_key(header::CONTENT_ENCODING) => {
                out.push_str(&format!("<{} compressed bytes>", bytes.len()));
            }
            Some(Payload::Full(bytes)) => out.push_str(&String::from_utf8_lossy(bytes)),
            Some(Payload::Stream(_)) => out.push_str("<stream>"),
            None => {}
        }
        out
    }

    /// Convert into a transport request.
    pub fn into_transport(self, timeout: Option<Duration>) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method, self.url);
        *request.headers_mut() = self.headers;
        *request.timeout_mut() = timeout;
        *request.body_mut() = match self.payload {
            Some(Payload::Full(bytes)) => Some(reqwest::Body::from(bytes)),
            Some(Payload::Stream(stream)) => Some(reqwest::Body::wrap_stream(stream)),
            None => None,
        };
        request
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("content_length", &self.content_length())
            .finish()
    }
}

fn gzip(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn request() -> Request {
        Request::new(Method::POST, "http://localhost:9200/idx/_search").unwrap()
    }

    #[test]
    fn test_defaults_to_json() {
        let req = request();
        assert_eq!(req.headers()[header::CONTENT_TYPE], "application/json");
        assert!(!req.has_body());
        assert_eq!(req.content_length(), None);
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Request::new(Method::GET, "not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_content_length_uncompressed() {
        let body = r#"{"query":{"match_all":{}}}"#;
        let mut req = request();
        req.set_body(body.into(), false).unwrap();

        assert_eq!(req.content_length(), Some(body.len() as u64));
        assert!(req.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_content_length_compressed() {
        let body = "a".repeat(4096);
        let mut req = request();
        req.set_body(body.clone().into(), true).unwrap();

        let compressed = req.body_bytes().unwrap().clone();
        assert_eq!(req.content_length(), Some(compressed.len() as u64));
        assert_ne!(compressed.len(), body.len());
        assert_eq!(req.headers()[header::CONTENT_ENCODING], "gzip");

        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_empty_body_sets_zero_length() {
        let mut req = request();
        req.set_body(Body::Text(String::new()), false).unwrap();
        assert!(req.has_body());
        assert_eq!(req.content_length(), Some(0));
    }

    #[test]
    fn test_json_body() {
        let mut req = request();
        req.set_body(Body::Json(serde_json::json!({"a": 1})), false)
            .unwrap();
        assert_eq!(req.body_bytes().unwrap().as_ref(), br#"{"a":1}"#);

        #[derive(Serialize)]
        struct Doc {
            title: &'static str,
        }
        req.set_body(Body::json(&Doc { title: "x" }).unwrap(), false)
            .unwrap();
        assert_eq!(req.content_length(), Some(br#"{"title":"x"}"#.len() as u64));
    }

    #[test]
    fn test_stream_has_no_length() {
        let mut req = request();
        req.set_body("seed".into(), false).unwrap();

        let chunks = futures::stream::iter(vec![Ok(Bytes::from_static(b"{}\n"))]);
        req.set_body(Body::stream(chunks), true).unwrap();

        assert!(req.has_body());
        assert!(req.body_bytes().is_none());
        assert_eq!(req.content_length(), None);
        assert!(req.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_basic_auth_is_redacted_in_dump() {
        let mut req = request();
        req.set_basic_auth("elastic", "secret");
        req.set_body("{}".into(), false).unwrap();

        assert_eq!(
            req.headers()[header::AUTHORIZATION],
            "Basic ZWxhc3RpYzpzZWNyZXQ="
        );
        let dump = req.dump();
        assert!(dump.starts_with("POST http://localhost:9200/idx/_search HTTP/1.1"));
        assert!(dump.contains("authorization: <redacted>"));
        assert!(!dump.contains("ZWxhc3RpYzpzZWNyZXQ="));
        assert!(dump.ends_with("{}"));
    }

    #[test]
    fn test_set_content_type() {
        let mut req = request();
        req.set_content_type("application/x-ndjson").unwrap();
        assert_eq!(req.headers()[header::CONTENT_TYPE], "application/x-ndjson");
        assert!(req.set_header("bad header", "x").is_err());
    }

    #[test]
    fn test_into_transport() {
        let mut req = request();
        req.set_body("{}".into(), false).unwrap();
        let transport = req.into_transport(Some(Duration::from_secs(3)));

        assert_eq!(transport.method(), Method::POST);
        assert_eq!(transport.timeout(), Some(&Duration::from_secs(3)));
        assert_eq!(transport.body().and_then(|b| b.as_bytes()), Some(&b"{}"[..]));
    }
}
