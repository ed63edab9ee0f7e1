//! Pluggable response body decoding.
//!
//! A [`Decoder`] receives the raw body and a type-erased [`DecodeTarget`].
//! Keeping the trait object safe lets a client hold any decoder behind an
//! `Arc<dyn Decoder>`; [`decode_into`] recovers the typed value.
//!
//! To reject unknown fields, put `#[serde(deny_unknown_fields)]` on the
//! destination type; every decoder here honours it.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Strategy turning raw bytes into a destination value.
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Populate `target` from `data`.
    fn decode(&self, data: &[u8], target: &mut dyn DecodeTarget) -> serde_json::Result<()>;
}

/// A destination a [`Decoder`] can fill from JSON bytes.
pub trait DecodeTarget {
    /// Deserialize `data` into the destination.
    fn decode_json(&mut self, data: &[u8]) -> serde_json::Result<()>;
}

/// Typed [`DecodeTarget`].
#[derive(Debug)]
pub struct DecodeSlot<T>(Option<T>);

impl<T> DecodeSlot<T> {
    /// An empty slot.
    pub fn new() -> Self {
        Self(None)
    }

    /// Take the decoded value, if any.
    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }
}

impl<T> Default for DecodeSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> DecodeTarget for DecodeSlot<T> {
    fn decode_json(&mut self, data: &[u8]) -> serde_json::Result<()> {
        self.0 = Some(serde_json::from_slice(data)?);
        Ok(())
    }
}

/// Decode `data` into `T` through `decoder`.
pub fn decode_into<T: DeserializeOwned>(decoder: &dyn Decoder, data: &[u8]) -> Result<T> {
    let mut slot = DecodeSlot::<T>::new();
    decoder.decode(data, &mut slot)?;
    slot.take().ok_or_else(|| {
        Error::Decode(serde::de::Error::custom(
            "decoder finished without populating the destination",
        ))
    })
}

/// Plain `serde_json` decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecoder;

impl Decoder for DefaultDecoder {
    fn decode(&self, data: &[u8], target: &mut dyn DecodeTarget) -> serde_json::Result<()> {
        target.decode_json(data)
    }
}

/// Wraps another decoder and counts invocations.
#[derive(Debug)]
pub struct CountingDecoder {
    inner: Arc<dyn Decoder>,
    calls: AtomicUsize,
}

impl CountingDecoder {
    /// Count calls to [`DefaultDecoder`].
    pub fn new() -> Self {
        Self::wrap(Arc::new(DefaultDecoder))
    }

    /// Count calls to `inner`.
    pub fn wrap(inner: Arc<dyn Decoder>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CountingDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CountingDecoder {
    fn decode(&self, data: &[u8], target: &mut dyn DecodeTarget) -> serde_json::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(data, target)
    }
}

/// Keeps integers that overflow 64 bits exact.
///
/// Such literals are rewritten as JSON strings before decoding, so they land
/// in `String` fields (or `serde_json::Value::String`) instead of being
/// rounded through `f64`. Integers that fit `i64`/`u64` are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigNumberDecoder;

impl Decoder for BigNumberDecoder {
    fn decode(&self, data: &[u8], target: &mut dyn DecodeTarget) -> serde_json::Result<()> {
        match quote_big_integers(data) {
            Some(rewritten) => target.decode_json(&rewritten),
            None => target.decode_json(data),
        }
    }
}

/// Returns `None` when nothing needed quoting.
fn quote_big_integers(data: &[u8]) -> Option<Vec<u8>> {
    let mut out: Option<Vec<u8>> = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < data.len() {
        let b = data[i];

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            if let Some(out) = out.as_mut() {
                out.push(b);
            }
            i += 1;
            continue;
        }

        if b == b'"' {
            in_string = true;
        } else if b == b'-' || b.is_ascii_digit() {
            let start = i;
            while i < data.len() && matches!(data[i], b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9') {
                i += 1;
            }
            let token = &data[start..i];
            if overflows_64_bits(token) {
                let buf = out.get_or_insert_with(|| data[..start].to_vec());
                buf.push(b'"');
                buf.extend_from_slice(token);
                buf.push(b'"');
            } else if let Some(out) = out.as_mut() {
                out.extend_from_slice(token);
            }
            continue;
        }

        if let Some(out) = out.as_mut() {
            out.push(b);
        }
        i += 1;
    }

    out
}

fn overflows_64_bits(token: &[u8]) -> bool {
    if token.iter().any(|b| matches!(b, b'.' | b'e' | b'E' | b'+')) {
        return false;
    }
    let Ok(text) = std::str::from_utf8(token) else {
        return false;
    };
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() {
        return false;
    }
    text.parse::<i64>().is_err() && text.parse::<u64>().is_err()
}
