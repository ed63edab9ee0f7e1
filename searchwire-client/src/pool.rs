//! Round-robin node pool with dead-node skipping.

use crate::health::Prober;
use crate::node::Node;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// URL used when no node is configured.
pub const DEFAULT_URL: &str = "http://127.0.0.1:9200";

/// Ordered set of nodes plus the shared selection cursor.
#[derive(Debug)]
pub struct NodePool {
    nodes: RwLock<Vec<Arc<Node>>>,
    /// Index of the last selected node.
    cursor: Mutex<Option<usize>>,
}

/// Outcome of probing every node in the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Nodes alive after the probe.
    pub alive: usize,
    /// Nodes dead after the probe.
    pub dead: usize,
    /// Nodes that went from alive to dead.
    pub died: Vec<String>,
    /// Nodes that went from dead to alive.
    pub revived: Vec<String>,
}

impl NodePool {
    /// Build a pool from base URLs. An empty list yields [`DEFAULT_URL`].
    ///
    /// Nodes start out alive, so selection does not skip unreachable nodes
    /// until they have been probed. Call [`NodePool::probe_all`] before
    /// selecting when the pool is used without a [`Client`](crate::Client).
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = Self {
            nodes: RwLock::new(Vec::new()),
            cursor: Mutex::new(None),
        };

        for url in urls {
            pool.add(Node::new(url)?)?;
        }
        if pool.is_empty() {
            pool.add(Node::new(DEFAULT_URL)?)?;
        }

        Ok(pool)
    }

    /// Append a node. Rejects a URL already in the pool.
    pub fn add(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|n| n.url() == node.url()) {
            return Err(Error::Config(format!("URL specified twice: {}", node.url())));
        }
        debug!(url = %node.url(), "Adding node to pool");
        nodes.push(Arc::new(node));
        Ok(())
    }

    /// Base URL of the next live node.
    ///
    /// Scans round-robin from the position after the last selection and
    /// gives up after one full rotation.
    pub fn next_url(&self) -> Result<String> {
        self.next_node().map(|node| node.url().to_string())
    }

    /// Next live node, see [`NodePool::next_url`].
    pub fn next_node(&self) -> Result<Arc<Node>> {
        let mut cursor = self.cursor.lock();
        let nodes = self.nodes.read();
        let count = nodes.len();
        if count == 0 {
            return Err(Error::NoClientAvailable);
        }

        let start = cursor.map_or(0, |last| (last + 1) % count);
        for offset in 0..count {
            let index = (start + offset) % count;
            let node = &nodes[index];
            if node.is_alive() {
                *cursor = Some(index);
                return Ok(node.clone());
            }
        }

        warn!(nodes = count, "All nodes are marked dead");
        Err(Error::NoClientAvailable)
    }

    /// Snapshot of the nodes.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    /// Base URLs in pool order.
    pub fn urls(&self) -> Vec<String> {
        self.nodes.read().iter().map(|n| n.url().to_string()).collect()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the pool has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Number of nodes currently marked alive.
    pub fn alive_count(&self) -> usize {
        self.nodes.read().iter().filter(|n| n.is_alive()).count()
    }

    /// Probe every node concurrently.
    pub async fn probe_all(&self, prober: &Prober) -> ProbeReport {
        let nodes = self.nodes();
        let checks = nodes.iter().map(|node| async move {
            let was_alive = node.is_alive();
            let alive = node.probe(prober).await;
            (node, was_alive, alive)
        });
        let results = futures::future::join_all(checks).await;

        let mut report = ProbeReport::default();
        for (node, was_alive, alive) in results {
            if alive {
                report.alive += 1;
                if !was_alive {
                    info!(url = %node.url(), "Node is alive again");
                    report.revived.push(node.url().to_string());
                }
            } else {
                report.dead += 1;
                if was_alive {
                    warn!(url = %node.url(), "Node is dead");
                    report.died.push(node.url().to_string());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str]) -> NodePool {
        NodePool::new(urls.iter().copied()).unwrap()
    }

    fn mark_dead(pool: &NodePool, url: &str) {
        pool.nodes()
            .iter()
            .find(|n| n.url() == url)
            .unwrap()
            .mark_dead();
    }

    #[test]
    fn test_default_url() {
        let pool = NodePool::new(Vec::<String>::new()).unwrap();
        assert_eq!(pool.urls(), vec![DEFAULT_URL.to_string()]);
    }

    #[test]
    fn test_duplicate_url_rejected() {
        let err = NodePool::new(["http://a:9200", "http://a:9200/"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_round_robin() {
        let pool = pool(&["http://a:9200", "http://b:9200", "http://c:9200"]);

        assert_eq!(pool.next_url().unwrap(), "http://a:9200");
        assert_eq!(pool.next_url().unwrap(), "http://b:9200");
        assert_eq!(pool.next_url().unwrap(), "http://c:9200");
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");
    }

    #[test]
    fn test_round_robin_skips_dead_nodes() {
        let pool = pool(&[
            "http://a:9200",
            "http://b:9200",
            "http://c:9200",
            "http://d:9200",
        ]);
        mark_dead(&pool, "http://b:9200");
        mark_dead(&pool, "http://d:9200");

        let picked: Vec<String> = (0..6).map(|_| pool.next_url().unwrap()).collect();
        assert_eq!(
            picked,
            vec![
                "http://a:9200",
                "http://c:9200",
                "http://a:9200",
                "http://c:9200",
                "http://a:9200",
                "http://c:9200",
            ]
        );
    }

    #[test]
    fn test_all_dead_reports_no_client() {
        let pool = pool(&["http://a:9200", "http://b:9200"]);
        mark_dead(&pool, "http://a:9200");
        mark_dead(&pool, "http://b:9200");

        for _ in 0..3 {
            assert!(matches!(pool.next_url(), Err(Error::NoClientAvailable)));
        }
        assert_eq!(pool.alive_count(), 0);
    }

    #[test]
    fn test_revived_node_rejoins_rotation() {
        let pool = pool(&["http://a:9200", "http://b:9200"]);
        mark_dead(&pool, "http://b:9200");
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");

        pool.nodes()[1].mark_alive();
        assert_eq!(pool.next_url().unwrap(), "http://b:9200");
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");
    }

    #[test]
    fn test_add_grows_rotation() {
        let pool = pool(&["http://a:9200"]);
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");

        pool.add(Node::new("http://b:9200").unwrap()).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next_url().unwrap(), "http://b:9200");
        assert_eq!(pool.next_url().unwrap(), "http://a:9200");
    }

    #[test]
    fn test_concurrent_selection_is_balanced() {
        let pool = Arc::new(pool(&["http://a:9200", "http://b:9200"]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| pool.next_url().unwrap() == "http://a:9200")
                        .count()
                })
            })
            .collect();

        let hits_on_a: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(hits_on_a, 100);
    }
}
