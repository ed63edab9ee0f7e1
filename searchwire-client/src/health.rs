//! Liveness probing and the periodic health-check task.
//!
//! A pool owns at most one health-check task. The task holds a weak
//! reference to the pool, so it ends on its own once the pool is dropped;
//! [`HealthChecker::stop`] and dropping the handle end it earlier.

use crate::config::BasicAuth;
use crate::logger::Loggers;
use crate::pool::NodePool;
use crate::Result;
use http::StatusCode;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Issues lightweight HEAD requests against node base URLs.
#[derive(Debug, Clone)]
pub struct Prober {
    http: reqwest::Client,
    timeout: Duration,
    auth: Option<BasicAuth>,
}

impl Prober {
    /// Create a prober. `timeout` bounds every probe regardless of caller deadlines.
    pub fn new(http: reqwest::Client, timeout: Duration, auth: Option<BasicAuth>) -> Self {
        Self {
            http,
            timeout,
            auth,
        }
    }

    /// Probe timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a HEAD request to `url` and return the status.
    pub async fn check(&self, url: &str) -> Result<StatusCode> {
        let mut request = self.http.head(url).timeout(self.timeout);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request.send().await?;
        Ok(response.status())
    }
}

/// Handle to a running health-check task.
#[derive(Debug)]
pub struct HealthChecker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthChecker {
    /// Spawn the periodic task for `pool`. The first round runs one
    /// `interval` after spawning.
    pub fn spawn(
        pool: &Arc<NodePool>,
        prober: Prober,
        interval: Duration,
        loggers: Loggers,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::downgrade(pool),
            prober,
            interval,
            loggers,
            token.clone(),
        ));
        Self { token, handle }
    }

    /// Stop the task. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(
    pool: Weak<NodePool>,
    prober: Prober,
    interval: Duration,
    loggers: Loggers,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        let report = tokio::select! {
            _ = token.cancelled() => break,
            report = pool.probe_all(&prober) => report,
        };

        for url in &report.died {
            loggers.error(|| format!("elastic: {url} is dead"));
        }
        for url in &report.revived {
            loggers.info(|| format!("elastic: {url} is alive again"));
        }
        debug!(alive = report.alive, dead = report.dead, "Health check round finished");
    }

    debug!("Health checker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_ends_task() {
        let pool = Arc::new(NodePool::new(["http://127.0.0.1:19200"]).unwrap());
        let prober = Prober::new(reqwest::Client::new(), Duration::from_millis(100), None);
        let checker = HealthChecker::spawn(&pool, prober, Duration::from_secs(60), Loggers::default());

        assert!(checker.is_running());
        checker.stop();
        assert!(!checker.is_running());
    }

    #[tokio::test]
    async fn test_task_ends_when_pool_dropped() {
        let pool = Arc::new(NodePool::new(["http://127.0.0.1:19200"]).unwrap());
        let prober = Prober::new(reqwest::Client::new(), Duration::from_millis(50), None);
        let checker = HealthChecker::spawn(&pool, prober, Duration::from_millis(20), Loggers::default());

        drop(pool);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(checker.handle.is_finished());
    }

    #[tokio::test]
    async fn test_periodic_probe_marks_unreachable_dead() {
        let pool = Arc::new(NodePool::new(["http://127.0.0.1:19200"]).unwrap());
        let prober = Prober::new(reqwest::Client::new(), Duration::from_millis(200), None);
        let _checker = HealthChecker::spawn(&pool, prober, Duration::from_millis(20), Loggers::default());

        let mut dead = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if pool.alive_count() == 0 {
                dead = true;
                break;
            }
        }
        assert!(dead);
    }
}
