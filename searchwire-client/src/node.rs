//! A single backend node and its liveness state.

use crate::health::Prober;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// One Elasticsearch endpoint.
///
/// The liveness flag is eventually consistent: a request may race a
/// concurrent probe and hit a node that was just marked dead.
pub struct Node {
    url: String,
    alive: AtomicBool,
    failures: AtomicU32,
    last_checked: Mutex<Option<Instant>>,
    dead_since: Mutex<Option<Instant>>,
}

impl Node {
    /// Create a node for a base URL. Nodes start out alive.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let raw = url.as_ref().trim();
        let parsed = url::Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "{raw}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: raw.trim_end_matches('/').to_string(),
            alive: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            last_checked: Mutex::new(None),
            dead_since: Mutex::new(None),
        })
    }

    /// Base URL without trailing slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current liveness flag.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Consecutive failed probes.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// When the node was last probed.
    pub fn last_checked(&self) -> Option<Instant> {
        *self.last_checked.lock()
    }

    /// When the node was last marked dead, if it is dead.
    pub fn dead_since(&self) -> Option<Instant> {
        *self.dead_since.lock()
    }

    /// Mark the node alive and reset its failure count.
    pub fn mark_alive(&self) {
        self.failures.store(0, Ordering::Relaxed);
        *self.dead_since.lock() = None;
        self.alive.store(true, Ordering::Release);
    }

    /// Mark the node dead.
    pub fn mark_dead(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        {
            let mut dead_since = self.dead_since.lock();
            if dead_since.is_none() {
                *dead_since = Some(Instant::now());
            }
        }
        self.alive.store(false, Ordering::Release);
    }

    /// Probe the node and update its liveness flag. Returns the new state.
    ///
    /// Probe failures are logged, never returned.
    pub async fn probe(&self, prober: &Prober) -> bool {
        let outcome = prober.check(&self.url).await;
        *self.last_checked.lock() = Some(Instant::now());

        match outcome {
            Ok(status) if status == http::StatusCode::OK => {
                debug!(url = %self.url, "Node responded to probe");
                self.mark_alive();
                true
            }
            Ok(status) => {
                warn!(url = %self.url, status = %status, "Node probe returned unexpected status");
                self.mark_dead();
                false
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Node probe failed");
                self.mark_dead();
                false
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("url", &self.url)
            .field("alive", &self.is_alive())
            .field("failures", &self.failures())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
